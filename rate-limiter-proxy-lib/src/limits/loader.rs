use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::error::ProxyError;
use crate::limits::config::{LimitsConfiguration, RawLimitsConfig};
use crate::telemetry::metrics::values;
use crate::telemetry::Metrics;

/// Default bound on a single configuration fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(1500);

/// The limits configuration could not be retrieved from its source.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported configuration endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid configuration endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("request to {endpoint} failed: {source}")]
    Http {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{endpoint} answered with status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("request to {endpoint} timed out after {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid limits configuration JSON from {endpoint}: {source}")]
    Json {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Somewhere a raw limits configuration can be fetched from.
#[async_trait]
pub trait LimitsSource: Send + Sync {
    /// Human readable location, used in logs.
    fn endpoint(&self) -> &str;

    async fn fetch(&self) -> Result<RawLimitsConfig, LoaderError>;
}

/// Fetches the configuration with an HTTP GET. Anything but `200 OK` is a failure.
pub struct HttpLimitsSource {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpLimitsSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LoaderError> {
        let url = url.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| LoaderError::Http { endpoint: url.clone(), source })?;
        Ok(Self { url, client, timeout })
    }

    fn request_error(&self, source: reqwest::Error) -> LoaderError {
        if source.is_timeout() {
            LoaderError::Timeout { endpoint: self.url.clone(), timeout: self.timeout }
        } else {
            LoaderError::Http { endpoint: self.url.clone(), source }
        }
    }
}

#[async_trait]
impl LimitsSource for HttpLimitsSource {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn fetch(&self) -> Result<RawLimitsConfig, LoaderError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(LoaderError::Status { endpoint: self.url.clone(), status: status.as_u16() });
        }

        let body = response.bytes().await.map_err(|e| self.request_error(e))?;
        serde_json::from_slice(&body)
            .map_err(|source| LoaderError::Json { endpoint: self.url.clone(), source })
    }
}

/// Reads the configuration from a local JSON file.
pub struct FileLimitsSource {
    path: PathBuf,
    endpoint: String,
}

impl FileLimitsSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let endpoint = format!("file://{}", path.display());
        Self { path, endpoint }
    }
}

#[async_trait]
impl LimitsSource for FileLimitsSource {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn fetch(&self) -> Result<RawLimitsConfig, LoaderError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|source| LoaderError::Io { path: self.path.clone(), source })?;
        serde_json::from_slice(&data)
            .map_err(|source| LoaderError::Json { endpoint: self.endpoint.clone(), source })
    }
}

/// Picks a source for `endpoint` by its scheme: `http`, `https` or `file`.
pub fn limits_source_for(
    endpoint: &str,
    timeout: Duration,
) -> Result<Arc<dyn LimitsSource>, LoaderError> {
    let (scheme, rest) = endpoint.split_once("://").ok_or_else(|| LoaderError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason: "missing scheme".to_string(),
    })?;

    match scheme.to_ascii_lowercase().as_str() {
        "http" | "https" => Ok(Arc::new(HttpLimitsSource::new(endpoint, timeout)?)),
        "file" if rest.is_empty() => Err(LoaderError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: "empty file path".to_string(),
        }),
        "file" => Ok(Arc::new(FileLimitsSource::new(rest))),
        other => Err(LoaderError::UnsupportedScheme(other.to_string())),
    }
}

/// Fetches and validates limits configurations.
///
/// Failures are logged and reported as `None`, leaving the caller's
/// current configuration in force.
#[derive(Clone)]
pub struct LimitsConfigLoader {
    source: Arc<dyn LimitsSource>,
    metrics: Option<Arc<Metrics>>,
}

impl LimitsConfigLoader {
    pub fn new(source: Arc<dyn LimitsSource>) -> Self {
        Self { source, metrics: None }
    }

    pub fn from_endpoint(endpoint: &str, timeout: Duration) -> Result<Self, LoaderError> {
        Ok(Self::new(limits_source_for(endpoint, timeout)?))
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn endpoint(&self) -> &str {
        self.source.endpoint()
    }

    pub async fn try_load(&self) -> Result<LimitsConfiguration, ProxyError> {
        let raw = self.source.fetch().await?;
        Ok(LimitsConfiguration::build(&raw)?)
    }

    pub async fn load(&self) -> Option<LimitsConfiguration> {
        let endpoint = self.endpoint();
        let (config, result) = match self.try_load().await {
            Ok(config) => {
                info!(
                    endpoint,
                    version = config.version(),
                    max_requests = config.max_requests(),
                    buckets = config.buckets().len(),
                    "limits configuration loaded"
                );
                (Some(config), values::RELOAD_LOADED)
            }
            Err(e @ (ProxyError::Limits(_) | ProxyError::Loader(LoaderError::Json { .. }))) => {
                error!(endpoint, error = %e, "invalid limits configuration, keeping the current one");
                (None, values::RELOAD_INVALID)
            }
            Err(e) => {
                warn!(endpoint, error = %e, "could not load limits configuration, keeping the current one");
                (None, values::RELOAD_FETCH_FAILED)
            }
        };
        if let Some(m) = &self.metrics {
            m.record_config_reload(result);
        }
        config
    }
}
