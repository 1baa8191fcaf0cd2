use std::time::Duration;

use serde::Deserialize;

use crate::error::ClientError;

/// Configuration for the CRAQ connection pool.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Store node addresses ("host:port").
    #[serde(default = "ClientConfig::default_endpoints")]
    pub endpoints: Vec<String>,

    /// Number of pooled connections (default: 40).
    #[serde(default = "ClientConfig::default_connections")]
    pub connections: usize,

    /// Time a request may wait for its response, in milliseconds
    /// (default: 1000).
    #[serde(default = "ClientConfig::default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Connect timeout in milliseconds (default: 1000).
    #[serde(default = "ClientConfig::default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Interval of the pool's timeout and reconnect sweep, in milliseconds
    /// (default: 10).
    #[serde(default = "ClientConfig::default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Attempts before a failing operation is handed back to the caller.
    /// Unset retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Enable TCP_NODELAY (default: true).
    #[serde(default = "ClientConfig::default_tcp_nodelay")]
    pub tcp_nodelay: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: Self::default_endpoints(),
            connections: Self::default_connections(),
            request_timeout_ms: Self::default_request_timeout_ms(),
            connect_timeout_ms: Self::default_connect_timeout_ms(),
            tick_interval_ms: Self::default_tick_interval_ms(),
            max_attempts: None,
            tcp_nodelay: Self::default_tcp_nodelay(),
        }
    }
}

impl ClientConfig {
    fn default_endpoints() -> Vec<String> {
        vec!["127.0.0.1:10498".to_string()]
    }

    fn default_connections() -> usize {
        40
    }

    fn default_request_timeout_ms() -> u64 {
        1000
    }

    fn default_connect_timeout_ms() -> u64 {
        1000
    }

    fn default_tick_interval_ms() -> u64 {
        10
    }

    fn default_tcp_nodelay() -> bool {
        true
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.endpoints.is_empty() {
            return Err(ClientError::NoEndpoints);
        }
        if self.connections == 0 {
            return Err(ClientError::InvalidConfig(
                "connections must be greater than zero".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.tick_interval_ms == 0 {
            return Err(ClientError::InvalidConfig(
                "tick_interval_ms must be greater than zero".into(),
            ));
        }
        if self.max_attempts == Some(0) {
            return Err(ClientError::InvalidConfig(
                "max_attempts must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }
}

/// Endpoint serving connection `slot` of `connections`.
///
/// With at least as many endpoints as connections each connection gets its
/// own endpoint. Otherwise connections are spread evenly in contiguous
/// runs.
pub fn endpoint_for(slot: usize, connections: usize, endpoints: usize) -> usize {
    if endpoints >= connections {
        slot
    } else {
        slot * endpoints / connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.connections, 40);
        assert_eq!(config.max_attempts, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig = toml::from_str(
            r#"
            endpoints = ["10.0.0.1:10498", "10.0.0.2:10498"]
            connections = 8
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.connections, 8);
        assert_eq!(config.max_attempts, Some(3));
        assert_eq!(config.request_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_validate() {
        let mut config = ClientConfig {
            endpoints: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ClientError::NoEndpoints)));
        config.endpoints = ClientConfig::default_endpoints();
        config.connections = 0;
        assert!(config.validate().is_err());
        config.connections = 1;
        config.max_attempts = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_mapping() {
        // one endpoint per connection when there are enough
        assert_eq!(
            (0..3).map(|s| endpoint_for(s, 3, 5)).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        // contiguous runs otherwise
        assert_eq!(
            (0..6).map(|s| endpoint_for(s, 6, 2)).collect::<Vec<_>>(),
            vec![0, 0, 0, 1, 1, 1]
        );
        assert_eq!(
            (0..40).map(|s| endpoint_for(s, 40, 1)).max(),
            Some(0)
        );
        // every endpoint in range
        for slot in 0..7 {
            assert!(endpoint_for(slot, 7, 3) < 3);
        }
    }
}
