use opentelemetry::global;
use opentelemetry::metrics::{Counter, Gauge, Meter, MeterProvider};
use opentelemetry::KeyValue;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::Registry;
use std::sync::Arc;

use http::StatusCode;

use crate::limits::{Admission, Rejection};
use crate::proxy::{EventHook, HttpError};

pub mod labels {
    pub const BUCKET: &str = "bucket";
    pub const REASON: &str = "reason";
    pub const STATUS_CODE: &str = "status_code";
    pub const ERROR_TYPE: &str = "error_type";
    pub const RESULT: &str = "result";
    pub const VERSION: &str = "version";
    pub const RUST_VERSION: &str = "rust_version";
}

pub mod values {
    /// Bucket label for requests forwarded without being counted
    pub const UNCOUNTED: &str = "none";
    pub const RELOAD_LOADED: &str = "loaded";
    pub const RELOAD_INVALID: &str = "invalid";
    pub const RELOAD_FETCH_FAILED: &str = "fetch_failed";
}

#[derive(Clone)]
pub struct Metrics {
    pub requests_forwarded_total: Counter<u64>,
    pub requests_rejected_total: Counter<u64>,
    pub requests_served_total: Counter<u64>,
    pub requests_failed_total: Counter<u64>,

    pub config_reloads_total: Counter<u64>,

    // Build info
    pub build_info: Gauge<u64>,

    // Keeps the exporter pipeline alive for as long as the instruments are
    _provider: SdkMeterProvider,
}

impl Metrics {
    fn new(meter: Meter, provider: SdkMeterProvider) -> Self {
        Self {
            requests_forwarded_total: meter
                .u64_counter("rate_limiter_requests_forwarded_total")
                .with_description("Total number of requests forwarded to the protected service")
                .build(),
            requests_rejected_total: meter
                .u64_counter("rate_limiter_requests_rejected_total")
                .with_description("Total number of requests rejected by the rate limiter")
                .build(),
            requests_served_total: meter
                .u64_counter("rate_limiter_requests_served_total")
                .with_description("Total number of forwarded requests answered by the protected service")
                .build(),
            requests_failed_total: meter
                .u64_counter("rate_limiter_requests_failed_total")
                .with_description("Total number of forwarded requests that failed upstream")
                .build(),

            config_reloads_total: meter
                .u64_counter("rate_limiter_config_reloads_total")
                .with_description("Limits configuration load attempts by result")
                .build(),

            build_info: meter
                .u64_gauge("rate_limiter_build_info")
                .with_description("Build information (version, rust version)")
                .build(),

            _provider: provider,
        }
    }

    /// Set build info metric with version labels
    pub fn set_build_info(&self) {
        let version = env!("CARGO_PKG_VERSION");
        let rust_version = env!("CARGO_PKG_RUST_VERSION");

        self.build_info.record(
            1,
            &[
                KeyValue::new(labels::VERSION, version),
                KeyValue::new(labels::RUST_VERSION, rust_version),
            ],
        );
    }

    pub fn record_config_reload(&self, result: &'static str) {
        self.config_reloads_total
            .add(1, &[KeyValue::new(labels::RESULT, result)]);
    }
}

fn bucket_label(admission: Option<&Admission>) -> KeyValue {
    let bucket = admission.map_or(values::UNCOUNTED, |a| a.bucket_name());
    KeyValue::new(labels::BUCKET, bucket.to_string())
}

impl EventHook for Metrics {
    fn forwarded(&self, admission: Option<&Admission>) {
        self.requests_forwarded_total.add(1, &[bucket_label(admission)]);
    }

    fn rejected(&self, rejection: &Rejection) {
        self.requests_rejected_total.add(
            1,
            &[
                KeyValue::new(labels::REASON, rejection.reason.clone()),
                KeyValue::new(labels::STATUS_CODE, rejection.status.as_u16().to_string()),
            ],
        );
    }

    fn served(&self, admission: Option<&Admission>, status: StatusCode) {
        self.requests_served_total.add(
            1,
            &[
                bucket_label(admission),
                KeyValue::new(labels::STATUS_CODE, status.as_u16().to_string()),
            ],
        );
    }

    fn failed(&self, admission: Option<&Admission>, error: &HttpError) {
        self.requests_failed_total.add(
            1,
            &[bucket_label(admission), KeyValue::new(labels::ERROR_TYPE, error.error_type())],
        );
    }
}

pub fn init_metrics() -> Result<(Arc<Metrics>, Registry), Box<dyn std::error::Error + Send + Sync>>
{
    let registry = Registry::default();

    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;

    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    global::set_meter_provider(meter_provider.clone());

    let meter = meter_provider.meter("rate-limiter-proxy");
    let metrics = Arc::new(Metrics::new(meter, meter_provider));

    metrics.set_build_info();

    Ok((metrics, registry))
}
