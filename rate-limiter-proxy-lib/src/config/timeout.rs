use std::time::Duration;

use serde::Deserialize;

/// Timeout configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TimeoutConfig {
    /// Bound on a single limits configuration fetch, in milliseconds
    /// Default: 1500
    #[serde(default = "default_config_fetch_timeout")]
    pub config_fetch_ms: u64,
    /// Graceful shutdown timeout in seconds
    /// Default: 30
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_secs: u64,
    /// Keep-alive for connections to the protected service
    #[serde(default)]
    pub keep_alive: KeepAliveConfig,
}

impl TimeoutConfig {
    pub fn config_fetch(&self) -> Duration {
        Duration::from_millis(self.config_fetch_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            config_fetch_ms: default_config_fetch_timeout(),
            shutdown_secs: default_shutdown_timeout(),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

/// TCP keep-alive for upstream connections
#[derive(Debug, Deserialize, Clone)]
pub struct KeepAliveConfig {
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Idle time before TCP keep-alive starts, in seconds
    /// Also used as the idle timeout of pooled upstream connections
    /// Default: 60
    #[serde(default = "default_keep_alive_timeout")]
    pub timeout_secs: u64,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self { enabled: true, timeout_secs: default_keep_alive_timeout() }
    }
}

fn default_config_fetch_timeout() -> u64 {
    1500
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

fn default_keep_alive_timeout() -> u64 {
    60
}
