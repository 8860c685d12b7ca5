use std::net::SocketAddr;

use http::{HeaderValue, StatusCode};
use hyper::body::Incoming;
use hyper::{Request, Response};
use tracing::{debug, error};

use crate::limits::{Decision, InFlight};
use crate::proxy::context::ProxyContext;
use crate::proxy::forwarding::forward;
use crate::proxy::synthetic_response::{
    healthcheck_response, internal_error_response, rejection_response, text_response,
};
use crate::proxy::RespBody;

/// Decide on `req` and answer it: locally, with a rejection, or from upstream
pub async fn handle_request(
    req: Request<Incoming>,
    peer: SocketAddr,
    ctx: &ProxyContext,
) -> Response<RespBody> {
    match ctx.evaluator.evaluate(&req, Some(peer.ip())) {
        Decision::Healthcheck => healthcheck_response(),
        Decision::Reject(rejection) => {
            ctx.hooks.rejected(&rejection);
            ctx.hooks
                .reject_response(&rejection)
                .unwrap_or_else(|| rejection_response(&rejection))
        }
        Decision::Forward(in_flight) => forward_request(req, in_flight, ctx).await,
    }
}

async fn forward_request(
    mut req: Request<Incoming>,
    in_flight: Option<InFlight>,
    ctx: &ProxyContext,
) -> Response<RespBody> {
    let admission = in_flight.as_ref().and_then(|g| g.admission());
    if let Some(a) = admission {
        match HeaderValue::from_str(a.bucket_name()) {
            Ok(v) => {
                req.headers_mut().insert(ctx.bucket_header.clone(), v);
            }
            Err(e) => debug!(bucket = a.bucket_name(), error = %e, "bucket name is not a valid header value"),
        }
    }

    ctx.hooks.forwarded(admission);

    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let result = forward(req, &ctx.upstream, ctx.client_pool.client()).await;

    let response = match result {
        Ok(resp) => {
            ctx.hooks.served(admission, resp.status());
            resp
        }
        Err(e) => {
            error!(
                %method,
                path = %path,
                bucket = ?admission.map(|a| a.bucket_name()),
                error = %e,
                "forwarding failed"
            );
            ctx.hooks.failed(admission, &e);
            let status = StatusCode::from(&e);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                internal_error_response()
            } else {
                text_response(status, status.canonical_reason().unwrap_or_default())
            }
        }
    };

    if let Some(guard) = in_flight {
        guard.complete();
    }
    response
}
