use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use super::forwarded::ForwardedHeaderConfig;
use super::telemetry::{LoggingConfig, TelemetryConfig};
use super::timeout::TimeoutConfig;
use crate::limits::{ClientIpSource, EvaluatorOptions};

/// Process settings
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Address and port to listen on
    /// Default: "0.0.0.0:8001"
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,
    /// Name of the protected service, logged at startup
    /// Default: "defaultService"
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Host of the protected service
    /// Default: "localhost"
    #[serde(default = "default_forward_host")]
    pub forward_host: String,
    /// Port of the protected service
    /// Default: 8000
    #[serde(default = "default_forward_port")]
    pub forward_port: u16,
    /// Where the limits configuration is fetched from
    /// A path is resolved against the protected service; a URL
    /// (http, https or file) is used as is
    /// Default: "/rate-limiter/"
    #[serde(default = "default_config_endpoint")]
    pub config_endpoint: String,
    /// Limits configuration refresh interval in milliseconds
    /// 0 disables refresh; values below 5000 disable it with a warning
    /// Default: 60000
    #[serde(default = "default_config_refresh_interval_ms")]
    pub config_refresh_interval_ms: u64,
    /// Header carrying the matched bucket name on forwarded requests
    /// Default: "X-RateLimiter-Bucket"
    #[serde(default = "default_bucket_header_name")]
    pub bucket_header_name: String,
    /// Address the `client_ip` condition compares against: "resolved" or "peer"
    /// Default: "resolved"
    #[serde(default)]
    pub client_ip_condition: ClientIpSource,
    /// Extra forwarded headers to read the client address from
    #[serde(default)]
    pub forwarded_headers: Vec<ForwardedHeaderConfig>,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Timeout configuration
    #[serde(default)]
    pub timeout: TimeoutConfig,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            service_name: default_service_name(),
            forward_host: default_forward_host(),
            forward_port: default_forward_port(),
            config_endpoint: default_config_endpoint(),
            config_refresh_interval_ms: default_config_refresh_interval_ms(),
            bucket_header_name: default_bucket_header_name(),
            client_ip_condition: ClientIpSource::default(),
            forwarded_headers: Vec::new(),
            logging: LoggingConfig::default(),
            timeout: TimeoutConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Settings {
    /// Base URL of the protected service.
    pub fn forward_url(&self) -> String {
        format!("http://{}:{}", self.forward_host, self.forward_port)
    }

    pub fn config_endpoint_is_relative(&self) -> bool {
        !self.config_endpoint.contains("://")
    }

    /// The configured endpoint as a path, when it is served by the protected service.
    pub fn config_endpoint_path(&self) -> Option<String> {
        if !self.config_endpoint_is_relative() {
            return None;
        }
        if self.config_endpoint.starts_with('/') {
            Some(self.config_endpoint.clone())
        } else {
            Some(format!("/{}", self.config_endpoint))
        }
    }

    /// Absolute URL of the limits configuration endpoint.
    pub fn full_config_endpoint(&self) -> String {
        match self.config_endpoint_path() {
            Some(path) => format!("{}{}", self.forward_url(), path),
            None => self.config_endpoint.clone(),
        }
    }

    pub fn config_refresh_interval(&self) -> Duration {
        Duration::from_millis(self.config_refresh_interval_ms)
    }

    pub fn evaluator_options(&self) -> EvaluatorOptions {
        EvaluatorOptions {
            config_endpoint: Some(self.full_config_endpoint()),
            config_endpoint_path: self.config_endpoint_path(),
            client_ip_source: self.client_ip_condition,
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8001))
}

fn default_service_name() -> String {
    "defaultService".to_string()
}

fn default_forward_host() -> String {
    "localhost".to_string()
}

fn default_forward_port() -> u16 {
    8000
}

fn default_config_endpoint() -> String {
    "/rate-limiter/".to_string()
}

fn default_config_refresh_interval_ms() -> u64 {
    60000
}

fn default_bucket_header_name() -> String {
    "X-RateLimiter-Bucket".to_string()
}
