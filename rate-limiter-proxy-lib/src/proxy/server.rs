use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{ProxyError, Result};
use crate::proxy::connection::ConnectionManager;
use crate::proxy::context::ProxyContext;
use crate::proxy::handler::handle_request;

/// Bind `settings.listen` and serve until `shutdown` is cancelled
pub async fn run(
    settings: &Settings,
    ctx: Arc<ProxyContext>,
    shutdown: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(settings.listen).await.map_err(ProxyError::Io)?;
    serve(listener, ctx, Duration::from_secs(settings.timeout.shutdown_secs), shutdown).await
}

/// Accept loop over an already bound listener
///
/// After `shutdown` fires no new connections are accepted and open ones get
/// up to `drain_timeout` to finish.
pub async fn serve(
    listener: TcpListener,
    ctx: Arc<ProxyContext>,
    drain_timeout: Duration,
    shutdown: CancellationToken,
) -> Result<()> {
    let builder = ConnBuilder::new(TokioExecutor::new());
    let connections = Arc::new(ConnectionManager::new());
    let addr = listener.local_addr().map_err(ProxyError::Io)?;

    info!(?addr, "rate limiter listening (h1/h2)");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("Shutdown requested, no longer accepting connections");
                connections.begin_shutdown();
                break;
            }
            result = listener.accept() => {
                let (stream, peer) = match result {
                    Ok((stream, peer)) => (stream, peer),
                    Err(e) => {
                        warn!(error = %e, "accept error");
                        continue;
                    }
                };

                let guard = match connections.try_accept() {
                    Ok(guard) => guard,
                    Err(e) => {
                        debug!(?peer, error = %e, "connection refused");
                        continue;
                    }
                };

                let builder = builder.clone();
                let ctx = Arc::clone(&ctx);
                tokio::spawn(async move {
                    let _guard = guard;
                    let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let ctx = Arc::clone(&ctx);
                        async move { Ok::<_, hyper::Error>(handle_request(req, peer, &ctx).await) }
                    });

                    if let Err(e) = builder.serve_connection(TokioIo::new(stream), svc).await {
                        warn!(?peer, error = %e, "serve_connection error");
                    }
                });
            }
        }
    }

    info!(
        "Waiting for active connections to finish (timeout: {}s)",
        drain_timeout.as_secs()
    );
    connections.drain(drain_timeout).await;
    info!("Rate limiter stopped");
    Ok(())
}

/// Resolves on the first SIGTERM or SIGINT
pub async fn shutdown_signal() -> Result<()> {
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGTERM handler: {e}")))
    })?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt()).map_err(|e| {
        ProxyError::Io(std::io::Error::other(format!("Failed to setup SIGINT handler: {e}")))
    })?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
        _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
    }
    Ok(())
}
