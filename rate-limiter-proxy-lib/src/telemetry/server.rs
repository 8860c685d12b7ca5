use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use prometheus::Registry;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::limits::LimitsEvaluator;
use crate::proxy::synthetic_response::{internal_error_response, text_response};
use crate::proxy::RespBody;
use crate::telemetry::{
    handle_metrics, health_check_response, live_check_response, ready_check_response,
};

/// Start the observability server that handles metrics and health checks
/// This server runs on a dedicated port and serves:
/// - `/metrics` - Prometheus metrics
/// - `/health` - Health check endpoint
/// - `/ready` - Readiness check endpoint, with the limits version in force
/// - `/live` - Liveness check endpoint
pub async fn start_observability_server(
    port: u16,
    registry: Registry,
    evaluator: Arc<LimitsEvaluator>,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;

    info!(?addr, "Observability server started (metrics + health checks)");
    serve_observability(listener, registry, evaluator, shutdown).await;
    Ok(())
}

/// Serve observability routes on an already bound listener until `shutdown`
pub async fn serve_observability(
    listener: TcpListener,
    registry: Registry,
    evaluator: Arc<LimitsEvaluator>,
    shutdown: CancellationToken,
) {
    let registry = Arc::new(registry);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Observability server: shutdown requested");
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "Observability server: accept error");
                        continue;
                    }
                };

                let registry = registry.clone();
                let evaluator = evaluator.clone();
                tokio::spawn(async move {
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let response = route(req.uri().path(), &registry, &evaluator);
                        async move { Ok::<_, hyper::Error>(response) }
                    });

                    let builder = ConnBuilder::new(TokioExecutor::new());
                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "Observability server: serve_connection error");
                    }
                });
            }
        }
    }

    info!("Observability server stopped");
}

fn route(path: &str, registry: &Registry, evaluator: &LimitsEvaluator) -> Response<RespBody> {
    let result = match path {
        "/health" => health_check_response(),
        "/ready" => ready_check_response(&evaluator.configuration()),
        "/live" => live_check_response(),
        "/metrics" => handle_metrics(registry),
        _ => return text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    result.unwrap_or_else(|e| {
        warn!(path, error = %e, "Observability server: failed to build response");
        internal_error_response()
    })
}
