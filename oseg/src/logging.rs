//! Structured logging initialization.
//!
//! The RUST_LOG environment variable takes precedence over configuration
//! file settings.

use crate::config::{LogFormat, LoggingConfig};
use tracing::Subscriber;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Initialize the logging subsystem.
///
/// # Example
///
/// ```ignore
/// use oseg::{LoggingConfig, logging};
///
/// logging::init(&LoggingConfig::default());
/// tracing::info!("segmentation starting");
/// ```
pub fn init(config: &LoggingConfig) {
    tracing_subscriber::registry()
        .with(filter(config))
        .with(output(config))
        .init();
}

fn filter(config: &LoggingConfig) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(config.level.as_str())
    }
}

/// The formatting layer for the configured format.
fn output<S>(config: &LoggingConfig) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let layer = fmt::layer::<S>()
        .with_target(config.target)
        .with_thread_names(config.thread_names);

    match (config.format, config.timestamps) {
        (LogFormat::Pretty, true) => layer.with_ansi(true).boxed(),
        (LogFormat::Pretty, false) => layer.with_ansi(true).without_time().boxed(),
        (LogFormat::Json, true) => layer.json().boxed(),
        (LogFormat::Json, false) => layer.json().without_time().boxed(),
        (LogFormat::Compact, true) => layer.compact().boxed(),
        (LogFormat::Compact, false) => layer.compact().without_time().boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[test]
    fn test_every_format_builds() {
        for format in [LogFormat::Pretty, LogFormat::Json, LogFormat::Compact] {
            for timestamps in [true, false] {
                let config = LoggingConfig {
                    format,
                    timestamps,
                    ..Default::default()
                };
                let subscriber = Registry::default().with(output(&config));
                tracing::subscriber::with_default(subscriber, || {
                    tracing::info!(?format, timestamps, "formatted");
                });
            }
        }
    }
}
