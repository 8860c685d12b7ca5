use hyper::Response;
use hyper::StatusCode;
use serde_json::{json, Value};

use crate::error::{ProxyError, Result};
use crate::limits::LimitsConfiguration;
use crate::proxy::synthetic_response::full_body;
use crate::proxy::RespBody;

fn json_response(status: StatusCode, body: &Value) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(body)
        .map_err(|e| ProxyError::Http(format!("Failed to serialize health response: {e}")))?;

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full_body(body_bytes))
        .map_err(|e| ProxyError::Http(format!("Failed to build health response: {e}")))
}

/// Health check response - always returns 200 if process is running
pub fn health_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "healthy"}))
}

/// Readiness check - reports the limits configuration in force
pub fn ready_check_response(config: &LimitsConfiguration) -> Result<Response<RespBody>> {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "ready",
            "limits_version": config.version(),
            "max_requests": config.max_requests(),
            "buckets": config.buckets().iter().map(|b| b.name()).collect::<Vec<_>>(),
        }),
    )
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, &json!({"status": "alive"}))
}
