use crate::limits::condition::{Condition, ConditionError};
use crate::limits::config::RawBucket;
use crate::limits::request::RequestView;

/// A named traffic class.
///
/// A bucket matches a request when every condition holds. A bucket without
/// conditions is the default bucket and matches everything.
#[derive(Debug, Clone)]
pub struct Bucket {
    name: String,
    conditions: Vec<Condition>,
    capacity_unit: u64,
    max_requests_per_ip: u64,
    max_requests: u64,
}

impl Bucket {
    pub fn new(name: impl Into<String>, conditions: Vec<Condition>) -> Self {
        Self {
            name: name.into(),
            conditions,
            capacity_unit: 0,
            max_requests_per_ip: 0,
            max_requests: 0,
        }
    }

    /// Builds a bucket from its configuration entry. Missing limits default to 0.
    pub fn from_raw(raw: &RawBucket) -> Result<Self, ConditionError> {
        let conditions = raw
            .conditions
            .iter()
            .flatten()
            .map(Condition::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        let limits = raw.limits.clone().unwrap_or_default();
        Ok(Self::new(raw.name.clone(), conditions)
            .with_capacity_unit(limits.capacity_unit)
            .with_max_requests_per_ip(limits.max_requests_per_ip))
    }

    pub fn with_capacity_unit(mut self, capacity_unit: u64) -> Self {
        self.capacity_unit = capacity_unit;
        self
    }

    pub fn with_max_requests_per_ip(mut self, max_requests_per_ip: u64) -> Self {
        self.max_requests_per_ip = max_requests_per_ip;
        self
    }

    pub(crate) fn with_max_requests(mut self, max_requests: u64) -> Self {
        self.max_requests = max_requests;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn is_default(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Share of the soft limit this bucket is entitled to, relative to the other buckets.
    pub fn capacity_unit(&self) -> u64 {
        self.capacity_unit
    }

    /// Per-client in-flight cap; 0 disables it.
    pub fn max_requests_per_ip(&self) -> u64 {
        self.max_requests_per_ip
    }

    /// Ceiling derived from the capacity unit when the configuration is built.
    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    pub fn matches(&self, request: &RequestView<'_>) -> bool {
        self.conditions.iter().all(|c| c.evaluate(request))
    }
}
