use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use http::{Request, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::ip::ClientIpResolver;
use crate::limits::bucket::Bucket;
use crate::limits::config::{
    proportional_share, LimitsConfigError, LimitsConfiguration, RawLimitsConfig,
};
use crate::limits::counter::{CounterStore, CounterView};
use crate::limits::loader::LimitsConfigLoader;
use crate::limits::request::RequestView;

pub const HEALTHCHECK_HEADER: &str = "x-rate-limiter";
pub const HEALTHCHECK_VALUE: &str = "healthcheck";

pub const CONFIG_ENDPOINT_REQUESTED: &str = "config_endpoint_requested";
pub const GLOBAL_LIMIT_REACHED: &str = "global.request_limit_reached";

/// Refresh intervals below this disable automatic refresh.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Internal evaluation failure. Never surfaces to callers: the request is let through.
#[derive(Debug, Error)]
pub enum EvaluationError {
    #[error("no bucket matches the request")]
    NoMatchingBucket,

    #[error("client IP could not be resolved")]
    UnresolvedClientIp,
}

/// Value the `client_ip` condition subject is compared against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientIpSource {
    /// Address produced by the client IP resolver.
    #[default]
    Resolved,
    /// Socket peer address, ignoring forwarded headers.
    Peer,
}

#[derive(Debug, Clone, Default)]
pub struct EvaluatorOptions {
    /// Absolute URL of the limits configuration endpoint.
    pub config_endpoint: Option<String>,
    /// Path and query of the configuration endpoint when the protected backend serves it.
    pub config_endpoint_path: Option<String>,
    pub client_ip_source: ClientIpSource,
}

/// Accounting context of a forwarded request.
#[derive(Debug, Clone)]
pub struct Admission {
    pub bucket: Arc<Bucket>,
    pub ip: String,
}

impl Admission {
    pub fn bucket_name(&self) -> &str {
        self.bucket.name()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub reason: String,
    pub status: StatusCode,
}

impl Rejection {
    pub fn new(reason: impl Into<String>, status: StatusCode) -> Self {
        Self { reason: reason.into(), status }
    }

    pub fn too_many_requests(reason: impl Into<String>) -> Self {
        Self::new(reason, StatusCode::TOO_MANY_REQUESTS)
    }
}

#[derive(Debug)]
pub enum Decision {
    /// Healthcheck of the rate limiter itself; answered locally.
    Healthcheck,
    /// Send upstream. The request is already counted as in flight and stays
    /// counted until the guard completes or drops. `None` means the request
    /// is not counted.
    Forward(Option<InFlight>),
    Reject(Rejection),
}

/// Admission-control decision engine.
///
/// Holds the active limits configuration, swapped atomically on reload, and
/// the in-flight counters, which survive configuration swaps.
pub struct LimitsEvaluator {
    options: EvaluatorOptions,
    resolver: Arc<dyn ClientIpResolver>,
    config: ArcSwap<LimitsConfiguration>,
    counters: Arc<CounterStore>,
}

impl LimitsEvaluator {
    pub fn new(options: EvaluatorOptions, resolver: Arc<dyn ClientIpResolver>) -> Self {
        Self {
            options,
            resolver,
            config: ArcSwap::from_pointee(LimitsConfiguration::builtin_default()),
            counters: Arc::new(CounterStore::new()),
        }
    }

    pub fn options(&self) -> &EvaluatorOptions {
        &self.options
    }

    pub fn configuration(&self) -> Arc<LimitsConfiguration> {
        self.config.load_full()
    }

    pub fn counters(&self) -> &Arc<CounterStore> {
        &self.counters
    }

    /// Builds and installs a new configuration. Counters are left untouched.
    pub fn update_config(&self, raw: &RawLimitsConfig) -> Result<(), LimitsConfigError> {
        self.replace_configuration(LimitsConfiguration::build(raw)?);
        Ok(())
    }

    pub fn replace_configuration(&self, config: LimitsConfiguration) {
        self.config.store(Arc::new(config));
    }

    /// Loads through `loader`; on failure the current configuration stays in force.
    pub async fn load_config(&self, loader: &LimitsConfigLoader) -> bool {
        match loader.load().await {
            Some(config) => {
                self.replace_configuration(config);
                true
            }
            None => false,
        }
    }

    /// Periodically reloads the configuration until `cancel` fires.
    ///
    /// Returns `None` when refresh is disabled: a zero interval, or one below
    /// [`MIN_REFRESH_INTERVAL`].
    pub fn spawn_refresh(
        self: &Arc<Self>,
        loader: LimitsConfigLoader,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Option<JoinHandle<()>> {
        if interval.is_zero() {
            debug!("automatic limits configuration refresh disabled");
            return None;
        }
        if interval < MIN_REFRESH_INTERVAL {
            warn!(
                ?interval,
                "config refresh interval should be at least 5s, automatic config update turned off"
            );
            return None;
        }

        let evaluator = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("limits configuration refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        evaluator.load_config(&loader).await;
                    }
                }
            }
        }))
    }

    pub fn evaluate<B>(&self, req: &Request<B>, peer: Option<IpAddr>) -> Decision {
        let view = RequestView::from_request(req);
        if view.header(HEALTHCHECK_HEADER).as_deref() == Some(HEALTHCHECK_VALUE) {
            return Decision::Healthcheck;
        }

        let config = self.config.load();
        if config.healthcheck_url() == Some(view.path_and_query()) {
            return Decision::Forward(None);
        }

        if self.is_config_endpoint(&view) {
            return Decision::Reject(Rejection::new(CONFIG_ENDPOINT_REQUESTED, StatusCode::NOT_FOUND));
        }

        match self.classify(&config, view, peer) {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, path = view.path(), "evaluating limits failed, letting the request through");
                Decision::Forward(None)
            }
        }
    }

    /// Increments the counters for an admitted request.
    pub fn record_forwarded(&self, admission: &Admission) {
        self.counters.increment(Some(admission.bucket_name()), &admission.ip);
    }

    /// Decrements the counters once the request has been served or has failed.
    pub fn record_completion(&self, admission: &Admission) {
        self.counters.decrement(Some(admission.bucket_name()), &admission.ip);
    }

    /// Counts `admission` as in flight until the returned guard completes or drops.
    ///
    /// No limit is checked; [`LimitsEvaluator::evaluate`] already returns
    /// admitted requests counted.
    pub fn begin(&self, admission: Admission) -> InFlight {
        self.record_forwarded(&admission);
        InFlight { counters: Arc::clone(&self.counters), admission: Some(admission) }
    }

    /// Counts the admission while the counters are still locked by the caller.
    fn admit(&self, counters: &mut CounterView<'_>, bucket: &Arc<Bucket>, ip: String) -> Decision {
        counters.increment(bucket.name(), &ip);
        let admission = Admission { bucket: Arc::clone(bucket), ip };
        Decision::Forward(Some(InFlight {
            counters: Arc::clone(&self.counters),
            admission: Some(admission),
        }))
    }

    fn is_config_endpoint(&self, view: &RequestView<'_>) -> bool {
        if let Some(path) = &self.options.config_endpoint_path {
            if view.path_and_query() == path {
                return true;
            }
        }
        match &self.options.config_endpoint {
            Some(endpoint) if view.uri.scheme().is_some() => view.uri.to_string() == *endpoint,
            _ => false,
        }
    }

    fn classify(
        &self,
        config: &LimitsConfiguration,
        view: RequestView<'_>,
        peer: Option<IpAddr>,
    ) -> Result<Decision, EvaluationError> {
        let ip = self.resolver.resolve(view.headers, peer);
        let peer_ip = peer.map(|p| p.to_string());
        let subject_ip = match self.options.client_ip_source {
            ClientIpSource::Resolved => ip.as_deref(),
            ClientIpSource::Peer => peer_ip.as_deref(),
        };
        let view = view.with_client_ip(subject_ip);
        let bucket = config.buckets().iter().find(|b| b.matches(&view));

        self.counters.update(|counters| {
            let global = counters.global();
            if config.max_requests() > 0 && global >= config.max_requests() {
                info!(global, max_requests = config.max_requests(), "rejected by global limit");
                return Ok(Decision::Reject(Rejection::too_many_requests(GLOBAL_LIMIT_REACHED)));
            }

            let bucket = bucket.ok_or(EvaluationError::NoMatchingBucket)?;
            let ip = ip.ok_or(EvaluationError::UnresolvedClientIp)?;

            let per_ip = bucket.max_requests_per_ip();
            if per_ip > 0 && counters.bucket_ip(bucket.name(), &ip) >= per_ip {
                info!(bucket = bucket.name(), ip = %ip, "rejected by IP limit");
                return Ok(Decision::Reject(Rejection::too_many_requests(format!(
                    "{}.ip_limit_reached",
                    bucket.name()
                ))));
            }

            let soft_limit = config.max_requests_without_buffer();
            if soft_limit == 0 || global < soft_limit {
                return Ok(self.admit(counters, bucket, ip));
            }

            let in_flight = counters.bucket(bucket.name());
            let share = available_share(config, counters, bucket);
            if in_flight >= share {
                info!(bucket = bucket.name(), ip = %ip, in_flight, share, "rejected by bucket limit");
                return Ok(Decision::Reject(Rejection::too_many_requests(format!(
                    "{}.request_limit_reached",
                    bucket.name()
                ))));
            }

            Ok(self.admit(counters, bucket, ip))
        })
    }
}

/// Capacity `bucket` may use right now.
///
/// Buckets at or over their ceiling compete for whatever the buckets under
/// their ceiling leave of the soft limit, in proportion to their capacity units.
fn available_share(config: &LimitsConfiguration, counters: &CounterView<'_>, bucket: &Bucket) -> u64 {
    let mut competing_units = 0u64;
    let mut settled_load = 0u64;
    for b in config.buckets() {
        let count = counters.bucket(b.name());
        if count >= b.max_requests() {
            competing_units = competing_units.saturating_add(b.capacity_unit());
        } else {
            settled_load = settled_load.saturating_add(count);
        }
    }
    let remaining = config.max_requests_without_buffer().saturating_sub(settled_load);
    proportional_share(remaining, bucket.capacity_unit(), competing_units)
}

/// Keeps an admitted request counted until it completes.
///
/// Dropping the guard without calling [`InFlight::complete`] also releases it,
/// so the counters are decremented exactly once.
#[derive(Debug)]
pub struct InFlight {
    counters: Arc<CounterStore>,
    admission: Option<Admission>,
}

impl InFlight {
    pub fn admission(&self) -> Option<&Admission> {
        self.admission.as_ref()
    }

    pub fn complete(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(a) = self.admission.take() {
            self.counters.decrement(Some(a.bucket_name()), &a.ip);
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.release();
    }
}
