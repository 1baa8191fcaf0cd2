//! Object segmentation configuration.

use std::path::Path;
use std::time::Duration;

use craq_client::{ClientConfig, ClientError};
use location_cache::TieBreak;
use serde::Deserialize;

/// Top level configuration file.
///
/// ```toml
/// [backend]
/// endpoints = ["10.0.0.1:10498", "10.0.0.2:10498"]
/// connections = 40
///
/// [cache]
/// policy = "popularity"
/// max_size = 5000
///
/// [segmentation]
/// server_id = 3
///
/// [logging]
/// level = "debug"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// CRAQ connection pool.
    #[serde(default)]
    pub backend: ClientConfig,

    /// Location cache in front of the store.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Orchestrator settings.
    #[serde(default)]
    pub segmentation: SegmentationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the components would refuse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.backend.validate()?;
        self.cache.validate()?;
        self.segmentation.validate()?;
        Ok(())
    }
}

/// Cache eviction policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Oldest records evicted in groups, with a record lifetime (default).
    #[default]
    Lru,
    /// Least popular of a random sample evicted.
    Popularity,
    /// Records ranked by radius over distance to the local region.
    Distance,
}

/// Which of several equally unpopular samples is evicted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TieBreakPolicy {
    First,
    #[default]
    Last,
}

impl From<TieBreakPolicy> for TieBreak {
    fn from(policy: TieBreakPolicy) -> Self {
        match policy {
            TieBreakPolicy::First => TieBreak::FirstSampled,
            TieBreakPolicy::Last => TieBreak::LastSampled,
        }
    }
}

/// Location cache configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Eviction policy: "lru", "popularity", or "distance".
    #[serde(default)]
    pub policy: CachePolicy,

    /// Maximum number of cached locations.
    #[serde(default = "CacheConfig::default_max_size")]
    pub max_size: usize,

    /// LRU: records evicted at once when over capacity.
    #[serde(default = "CacheConfig::default_clean_group_size")]
    pub clean_group_size: usize,

    /// LRU: age in milliseconds after which a record is a miss.
    #[serde(default = "CacheConfig::default_entry_lifetime_ms")]
    pub entry_lifetime_ms: u64,

    /// Popularity: weight of the newest interval in the request average.
    #[serde(default = "CacheConfig::default_ewma_weight")]
    pub ewma_weight: f64,

    /// Popularity: records drawn per eviction.
    #[serde(default = "CacheConfig::default_sample_size")]
    pub sample_size: usize,

    /// Popularity: which tied sample is evicted, "first" or "last".
    #[serde(default)]
    pub tie_break: TieBreakPolicy,

    /// Popularity: sampling seed. Unset uses a fixed seed.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Distance: servers farther away than this are never cached.
    #[serde(default = "CacheConfig::default_interest_radius")]
    pub interest_radius: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: CachePolicy::default(),
            max_size: Self::default_max_size(),
            clean_group_size: Self::default_clean_group_size(),
            entry_lifetime_ms: Self::default_entry_lifetime_ms(),
            ewma_weight: Self::default_ewma_weight(),
            sample_size: Self::default_sample_size(),
            tie_break: TieBreakPolicy::default(),
            seed: None,
            interest_radius: Self::default_interest_radius(),
        }
    }
}

impl CacheConfig {
    fn default_max_size() -> usize {
        5000
    }

    fn default_clean_group_size() -> usize {
        100
    }

    fn default_entry_lifetime_ms() -> u64 {
        8000
    }

    fn default_ewma_weight() -> f64 {
        0.3
    }

    fn default_sample_size() -> usize {
        3
    }

    fn default_interest_radius() -> f64 {
        f64::INFINITY
    }

    pub fn entry_lifetime(&self) -> Duration {
        Duration::from_millis(self.entry_lifetime_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_size == 0 {
            return Err(ConfigError::Invalid(
                "cache.max_size must be greater than zero".into(),
            ));
        }
        match self.policy {
            CachePolicy::Lru => {
                if self.clean_group_size == 0 {
                    return Err(ConfigError::Invalid(
                        "cache.clean_group_size must be greater than zero".into(),
                    ));
                }
                if self.entry_lifetime_ms == 0 {
                    return Err(ConfigError::Invalid(
                        "cache.entry_lifetime_ms must be greater than zero".into(),
                    ));
                }
            }
            CachePolicy::Popularity => {
                if !(self.ewma_weight > 0.0 && self.ewma_weight <= 1.0) {
                    return Err(ConfigError::Invalid(format!(
                        "cache.ewma_weight must be within (0, 1], got {}",
                        self.ewma_weight
                    )));
                }
                if self.sample_size == 0 {
                    return Err(ConfigError::Invalid(
                        "cache.sample_size must be greater than zero".into(),
                    ));
                }
            }
            CachePolicy::Distance => {
                if self.interest_radius.is_nan() || self.interest_radius < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "cache.interest_radius must be non-negative, got {}",
                        self.interest_radius
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentationConfig {
    /// Id of the server this process runs. Must not be zero.
    #[serde(default = "SegmentationConfig::default_server_id")]
    pub server_id: u32,

    /// Graphic ASCII character prefixed to every store key.
    #[serde(default = "SegmentationConfig::default_key_prefix")]
    pub key_prefix: char,

    /// Time in milliseconds before an id answered NOT_FOUND is asked for
    /// again (default: 500).
    #[serde(default = "SegmentationConfig::default_not_found_sit_out_ms")]
    pub not_found_sit_out_ms: u64,

    /// Age in milliseconds after which an unacknowledged migration is
    /// reported (default: 5000).
    #[serde(default = "SegmentationConfig::default_migration_stall_ms")]
    pub migration_stall_ms: u64,

    /// NOT_FOUND answers after which a lookup is given up. Unset retries
    /// forever.
    #[serde(default)]
    pub max_not_found_retries: Option<u32>,

    /// One in this many lookups carries a sampled trace (default: 51).
    #[serde(default = "SegmentationConfig::default_trace_sample_every")]
    pub trace_sample_every: u64,

    /// Interval of the orchestrator's maintenance tick in milliseconds
    /// (default: 50).
    #[serde(default = "SegmentationConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            server_id: Self::default_server_id(),
            key_prefix: Self::default_key_prefix(),
            not_found_sit_out_ms: Self::default_not_found_sit_out_ms(),
            migration_stall_ms: Self::default_migration_stall_ms(),
            max_not_found_retries: None,
            trace_sample_every: Self::default_trace_sample_every(),
            tick_interval_ms: Self::default_tick_interval_ms(),
        }
    }
}

impl SegmentationConfig {
    fn default_server_id() -> u32 {
        1
    }

    fn default_key_prefix() -> char {
        'o'
    }

    fn default_not_found_sit_out_ms() -> u64 {
        500
    }

    fn default_migration_stall_ms() -> u64 {
        5000
    }

    fn default_trace_sample_every() -> u64 {
        51
    }

    fn default_tick_interval_ms() -> u64 {
        50
    }

    pub fn not_found_sit_out(&self) -> Duration {
        Duration::from_millis(self.not_found_sit_out_ms)
    }

    pub fn migration_stall(&self) -> Duration {
        Duration::from_millis(self.migration_stall_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// The key prefix as a byte.
    pub fn prefix_byte(&self) -> u8 {
        self.key_prefix as u8
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_id == protocol_craq::NULL_SERVER_ID {
            return Err(ConfigError::Invalid(
                "segmentation.server_id must not be zero".into(),
            ));
        }
        if !self.key_prefix.is_ascii_graphic() {
            return Err(ConfigError::Invalid(format!(
                "segmentation.key_prefix must be a graphic ASCII character, got {:?}",
                self.key_prefix
            )));
        }
        if self.max_not_found_retries == Some(0) {
            return Err(ConfigError::Invalid(
                "segmentation.max_not_found_retries must be greater than zero when set".into(),
            ));
        }
        if self.trace_sample_every == 0 {
            return Err(ConfigError::Invalid(
                "segmentation.trace_sample_every must be greater than zero".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "segmentation.tick_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive. `RUST_LOG` takes precedence.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    /// Log format: "pretty", "json", or "compact".
    #[serde(default)]
    pub format: LogFormat,

    /// Include timestamps.
    #[serde(default = "LoggingConfig::default_true")]
    pub timestamps: bool,

    /// Include the event target.
    #[serde(default = "LoggingConfig::default_true")]
    pub target: bool,

    /// Include thread names.
    #[serde(default)]
    pub thread_names: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: LogFormat::default(),
            timestamps: true,
            target: true,
            thread_names: false,
        }
    }
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }

    fn default_true() -> bool {
        true
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("backend: {0}")]
    Backend(#[from] ClientError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
