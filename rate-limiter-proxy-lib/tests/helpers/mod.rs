//! Shared helpers for the integration tests: loopback backends and fixtures

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

pub type TestResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Response header the test backend echoes the bucket header into
pub const SEEN_BUCKET: &str = "x-seen-bucket";

pub const LIMITS_JSON: &str = r#"{
    "version": 3,
    "max_requests": 2,
    "buffer_ratio": 0,
    "healthcheck_url": "/status",
    "buckets": [
        {
            "name": "reuse",
            "conditions": [["header", "x-app", "eq", "reuse"]],
            "limits": { "capacity_unit": 1, "max_requests_per_ip": 1 }
        },
        {
            "name": "default",
            "limits": { "capacity_unit": 1 }
        }
    ]
}"#;

/// Serve `handler` over HTTP/1.1 on a loopback port
pub async fn spawn_http<F>(handler: F) -> std::io::Result<SocketAddr>
where
    F: Fn(Request<Incoming>) -> Response<Full<Bytes>> + Clone + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req| {
                    let resp = handler(req);
                    async move { Ok::<_, Infallible>(resp) }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), svc).await;
            });
        }
    });
    Ok(addr)
}

/// A protected service stand-in
///
/// Echoes the received bucket header back in [`SEEN_BUCKET`]. Requests to
/// `/hold` wait for a permit from the returned semaphore before answering.
pub async fn spawn_backend(bucket_header: &'static str) -> std::io::Result<(SocketAddr, Arc<Semaphore>)> {
    let gate = Arc::new(Semaphore::new(0));
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let accept_gate = gate.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let gate = accept_gate.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req: Request<Incoming>| {
                    let gate = gate.clone();
                    async move {
                        if req.uri().path() == "/hold" {
                            if let Ok(permit) = gate.acquire().await {
                                permit.forget();
                            }
                        }
                        let mut resp = Response::new(Full::new(Bytes::from_static(b"backend")));
                        if let Some(bucket) = req.headers().get(bucket_header) {
                            resp.headers_mut().insert(SEEN_BUCKET, bucket.clone());
                        }
                        Ok::<_, Infallible>(resp)
                    }
                });
                let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), svc).await;
            });
        }
    });
    Ok((addr, gate))
}

pub fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut resp = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *resp.status_mut() = status;
    resp
}

/// Poll `check` until it holds or two seconds pass
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
