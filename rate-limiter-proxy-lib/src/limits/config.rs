use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::limits::bucket::Bucket;
use crate::limits::condition::ConditionError;

/// Structurally invalid limits configuration.
#[derive(Debug, Error)]
pub enum LimitsConfigError {
    #[error("bucket {bucket}: {source}")]
    Condition {
        bucket: String,
        #[source]
        source: ConditionError,
    },

    #[error("no default bucket (a bucket without conditions) is configured")]
    NoDefaultBucket,

    #[error("more than one default bucket is configured: {first} and {second}")]
    MultipleDefaultBuckets { first: String, second: String },

    #[error("bucket name {0} is used more than once")]
    DuplicateBucketName(String),

    #[error("buffer_ratio must be in [0, 1), got {0}")]
    InvalidBufferRatio(f64),

    #[error("invalid limits configuration JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Limits configuration document as served by the configuration endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawLimitsConfig {
    #[serde(default)]
    pub version: i64,
    /// Hard limit on in-flight requests. 0 means unlimited.
    #[serde(default)]
    pub max_requests: u64,
    /// Fraction of `max_requests` held back from bucket-fair sharing.
    #[serde(default)]
    pub buffer_ratio: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck_url: Option<String>,
    #[serde(default)]
    pub buckets: Vec<RawBucket>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawBucket {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditions: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<RawBucketLimits>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawBucketLimits {
    #[serde(default)]
    pub capacity_unit: u64,
    #[serde(default)]
    pub max_requests_per_ip: u64,
}

impl RawLimitsConfig {
    pub fn from_json_str(s: &str) -> Result<Self, LimitsConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, LimitsConfigError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Configuration in force before anything has been loaded: unlimited, one default bucket.
    pub fn builtin_default() -> Self {
        Self {
            version: 1,
            max_requests: 0,
            buffer_ratio: 0.0,
            healthcheck_url: None,
            buckets: vec![RawBucket { name: "default".to_string(), conditions: None, limits: None }],
        }
    }
}

/// Validated limits configuration with derived ceilings.
///
/// Buckets keep their configured order, except the default bucket which
/// is always last.
#[derive(Debug, Clone)]
pub struct LimitsConfiguration {
    version: i64,
    max_requests: u64,
    buffer_ratio: f64,
    max_requests_without_buffer: u64,
    healthcheck_url: Option<String>,
    buckets: Vec<Arc<Bucket>>,
}

impl LimitsConfiguration {
    pub fn build(raw: &RawLimitsConfig) -> Result<Self, LimitsConfigError> {
        if !(0.0..1.0).contains(&raw.buffer_ratio) {
            return Err(LimitsConfigError::InvalidBufferRatio(raw.buffer_ratio));
        }

        let mut seen = HashSet::new();
        let mut buckets = Vec::with_capacity(raw.buckets.len());
        let mut default_bucket: Option<Bucket> = None;

        for entry in &raw.buckets {
            if !seen.insert(entry.name.as_str()) {
                return Err(LimitsConfigError::DuplicateBucketName(entry.name.clone()));
            }
            let bucket = Bucket::from_raw(entry).map_err(|source| {
                LimitsConfigError::Condition { bucket: entry.name.clone(), source }
            })?;

            if bucket.is_default() {
                if let Some(first) = &default_bucket {
                    return Err(LimitsConfigError::MultipleDefaultBuckets {
                        first: first.name().to_string(),
                        second: bucket.name().to_string(),
                    });
                }
                default_bucket = Some(bucket);
            } else {
                buckets.push(bucket);
            }
        }

        buckets.push(default_bucket.ok_or(LimitsConfigError::NoDefaultBucket)?);

        let max_requests_without_buffer =
            (raw.max_requests as f64 * (1.0 - raw.buffer_ratio)).floor() as u64;
        let capacity_sum = buckets
            .iter()
            .fold(0u64, |acc, b| acc.saturating_add(b.capacity_unit()));

        let buckets = buckets
            .into_iter()
            .map(|b| {
                let ceiling =
                    proportional_share(max_requests_without_buffer, b.capacity_unit(), capacity_sum);
                Arc::new(b.with_max_requests(ceiling))
            })
            .collect();

        Ok(Self {
            version: raw.version,
            max_requests: raw.max_requests,
            buffer_ratio: raw.buffer_ratio,
            max_requests_without_buffer,
            healthcheck_url: raw.healthcheck_url.clone(),
            buckets,
        })
    }

    pub fn builtin_default() -> Self {
        let raw = RawLimitsConfig::builtin_default();
        let default = Arc::new(Bucket::new("default", Vec::new()));
        Self {
            version: raw.version,
            max_requests: raw.max_requests,
            buffer_ratio: raw.buffer_ratio,
            max_requests_without_buffer: 0,
            healthcheck_url: None,
            buckets: vec![default],
        }
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn buffer_ratio(&self) -> f64 {
        self.buffer_ratio
    }

    /// Soft limit: `floor(max_requests * (1 - buffer_ratio))`.
    pub fn max_requests_without_buffer(&self) -> u64 {
        self.max_requests_without_buffer
    }

    pub fn healthcheck_url(&self) -> Option<&str> {
        self.healthcheck_url.as_deref()
    }

    pub fn buckets(&self) -> &[Arc<Bucket>] {
        &self.buckets
    }

    pub fn bucket(&self, name: &str) -> Option<&Arc<Bucket>> {
        self.buckets.iter().find(|b| b.name() == name)
    }

    pub fn default_bucket(&self) -> Option<&Arc<Bucket>> {
        self.buckets.last()
    }
}

impl Default for LimitsConfiguration {
    fn default() -> Self {
        Self::builtin_default()
    }
}

/// `ceil(pool * units / total)`, or 0 when `total` is 0.
pub(crate) fn proportional_share(pool: u64, units: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    let numerator = u128::from(pool) * u128::from(units);
    let total = u128::from(total);
    u64::try_from(numerator.div_ceil(total)).unwrap_or(u64::MAX)
}
