use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rate_limiter_proxy_lib::limits::{
    EvaluatorOptions, LimitsConfigLoader, LimitsEvaluator, LimitsSource, LoaderError,
    RawBucket, RawLimitsConfig,
};
use rate_limiter_proxy_lib::ForwardedIpResolver;
use tokio_util::sync::CancellationToken;

/// Serves a fresh version on every fetch, or fails once `fail` is set
#[derive(Default)]
struct CountingSource {
    fetches: AtomicUsize,
    version: AtomicI64,
    fail: std::sync::atomic::AtomicBool,
}

#[async_trait]
impl LimitsSource for CountingSource {
    fn endpoint(&self) -> &str {
        "memory://limits"
    }

    async fn fetch(&self) -> Result<RawLimitsConfig, LoaderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LoaderError::Status { endpoint: self.endpoint().to_string(), status: 503 });
        }
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(RawLimitsConfig {
            version,
            max_requests: 10,
            buffer_ratio: 0.0,
            healthcheck_url: None,
            buckets: vec![RawBucket { name: "default".to_string(), conditions: None, limits: None }],
        })
    }
}

fn evaluator() -> Arc<LimitsEvaluator> {
    Arc::new(LimitsEvaluator::new(
        EvaluatorOptions::default(),
        Arc::new(ForwardedIpResolver::default()),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_refresh_reloads_on_every_interval() {
    let source = Arc::new(CountingSource::default());
    let loader = LimitsConfigLoader::new(source.clone());
    let evaluator = evaluator();
    let cancel = CancellationToken::new();

    let handle = evaluator.spawn_refresh(loader, Duration::from_secs(10), cancel.clone());
    assert!(handle.is_some());

    // Nothing before the first interval has elapsed
    tokio::time::sleep(Duration::from_secs(9)).await;
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    assert_eq!(evaluator.configuration().version(), 1);

    tokio::time::sleep(Duration::from_secs(26)).await;
    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(evaluator.configuration().version(), 3);
    assert_eq!(evaluator.configuration().max_requests(), 10);

    cancel.cancel();
    if let Some(handle) = handle {
        assert!(handle.await.is_ok());
    }
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_failed_refresh_keeps_current_configuration() {
    let source = Arc::new(CountingSource::default());
    let loader = LimitsConfigLoader::new(source.clone());
    let evaluator = evaluator();
    assert!(evaluator.load_config(&loader).await);
    assert_eq!(evaluator.configuration().version(), 1);

    source.fail.store(true, Ordering::SeqCst);
    let cancel = CancellationToken::new();
    let _handle = evaluator.spawn_refresh(loader, Duration::from_secs(5), cancel.clone());

    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    assert_eq!(evaluator.configuration().version(), 1);
    assert_eq!(evaluator.configuration().max_requests(), 10);
    cancel.cancel();
}

#[tokio::test]
async fn test_refresh_disabled_for_zero_or_short_intervals() {
    let source = Arc::new(CountingSource::default());
    let evaluator = evaluator();
    let cancel = CancellationToken::new();

    for interval in [Duration::ZERO, Duration::from_millis(4999)] {
        let loader = LimitsConfigLoader::new(source.clone());
        assert!(evaluator.spawn_refresh(loader, interval, cancel.clone()).is_none());
    }
    assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
}
