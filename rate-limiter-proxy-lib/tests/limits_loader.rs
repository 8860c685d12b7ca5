use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hyper::StatusCode;
use rate_limiter_proxy_lib::limits::{
    limits_source_for, FileLimitsSource, HttpLimitsSource, LimitsConfigLoader, LimitsSource,
    LoaderError,
};
use rate_limiter_proxy_lib::ProxyError;
use tempfile::NamedTempFile;

mod helpers;
use helpers::{spawn_http, text, TestResult, LIMITS_JSON};

const TIMEOUT: Duration = Duration::from_millis(1500);

#[tokio::test]
async fn test_file_source_loads_configuration() -> TestResult {
    let mut file = NamedTempFile::new()?;
    file.write_all(LIMITS_JSON.as_bytes())?;

    let loader = LimitsConfigLoader::new(Arc::new(FileLimitsSource::new(file.path())));
    let config = loader.try_load().await?;

    assert_eq!(config.version(), 3);
    assert_eq!(config.max_requests(), 2);
    assert_eq!(config.healthcheck_url(), Some("/status"));
    let names: Vec<_> = config.buckets().iter().map(|b| b.name()).collect();
    assert_eq!(names, ["reuse", "default"]);
    Ok(())
}

#[tokio::test]
async fn test_file_endpoint_by_scheme() -> TestResult {
    let mut file = NamedTempFile::new()?;
    file.write_all(LIMITS_JSON.as_bytes())?;
    let endpoint = format!("file://{}", file.path().display());

    let loader = LimitsConfigLoader::from_endpoint(&endpoint, TIMEOUT)?;
    assert_eq!(loader.endpoint(), endpoint);
    assert!(loader.load().await.is_some());
    Ok(())
}

#[tokio::test]
async fn test_missing_file_is_an_io_error() {
    let source = FileLimitsSource::new("/nonexistent/limits.json");
    assert!(matches!(source.fetch().await, Err(LoaderError::Io { .. })));
}

#[tokio::test]
async fn test_invalid_configuration_is_not_loaded() -> TestResult {
    let mut file = NamedTempFile::new()?;
    // Two default buckets
    file.write_all(br#"{"max_requests": 5, "buckets": [{"name": "a"}, {"name": "b"}]}"#)?;

    let loader = LimitsConfigLoader::new(Arc::new(FileLimitsSource::new(file.path())));
    assert!(matches!(loader.try_load().await, Err(ProxyError::Limits(_))));
    assert!(loader.load().await.is_none());
    Ok(())
}

#[tokio::test]
async fn test_http_source_loads_configuration() -> TestResult {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let addr = spawn_http(move |req| {
        counter.fetch_add(1, Ordering::SeqCst);
        if req.uri().path() == "/rate-limiter/" {
            text(StatusCode::OK, LIMITS_JSON)
        } else {
            text(StatusCode::NOT_FOUND, "")
        }
    })
    .await?;

    let loader =
        LimitsConfigLoader::from_endpoint(&format!("http://{addr}/rate-limiter/"), TIMEOUT)?;
    let config = loader.try_load().await?;

    assert_eq!(config.version(), 3);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn test_http_source_rejects_non_200() -> TestResult {
    let addr = spawn_http(|_| text(StatusCode::INTERNAL_SERVER_ERROR, LIMITS_JSON)).await?;
    let source = limits_source_for(&format!("http://{addr}/rate-limiter/"), TIMEOUT)?;

    match source.fetch().await {
        Err(LoaderError::Status { status, .. }) => assert_eq!(status, 500),
        other => panic!("expected a status error, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_http_source_rejects_malformed_json() -> TestResult {
    let addr = spawn_http(|_| text(StatusCode::OK, "{not json")).await?;
    let source = limits_source_for(&format!("http://{addr}/"), TIMEOUT)?;

    assert!(matches!(source.fetch().await, Err(LoaderError::Json { .. })));
    Ok(())
}

#[tokio::test]
async fn test_unreachable_endpoint_is_not_loaded() -> TestResult {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    let addr = listener.local_addr()?;
    drop(listener);

    let loader = LimitsConfigLoader::from_endpoint(&format!("http://{addr}/"), TIMEOUT)?;
    assert!(matches!(loader.try_load().await, Err(ProxyError::Loader(_))));
    Ok(())
}

#[tokio::test]
async fn test_silent_endpoint_times_out() -> TestResult {
    // Accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let timeout = Duration::from_millis(200);
    let url = format!("http://{addr}/rate-limiter/");
    let source = HttpLimitsSource::new(url.as_str(), timeout)?;
    match source.fetch().await {
        Err(LoaderError::Timeout { endpoint, timeout: waited }) => {
            assert_eq!(endpoint, url);
            assert_eq!(waited, timeout);
        }
        other => panic!("expected a timeout, got {other:?}"),
    }

    let loader = LimitsConfigLoader::new(Arc::new(HttpLimitsSource::new(url.as_str(), timeout)?));
    assert!(loader.load().await.is_none());

    server.abort();
    Ok(())
}

#[test]
fn test_unsupported_endpoints() {
    assert!(matches!(
        limits_source_for("ftp://example.com/limits.json", TIMEOUT),
        Err(LoaderError::UnsupportedScheme(_))
    ));
    assert!(matches!(
        limits_source_for("/rate-limiter/", TIMEOUT),
        Err(LoaderError::InvalidEndpoint { .. })
    ));
    assert!(matches!(
        limits_source_for("file://", TIMEOUT),
        Err(LoaderError::InvalidEndpoint { .. })
    ));
}
