use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;

use crate::limits::Rejection;
use crate::proxy::RespBody;

pub const HEALTHCHECK_BODY: &str = "OK";
pub const REJECTION_BODY: &str = "Request has been rejected by the rate limiter";
pub const INTERNAL_ERROR_BODY: &str = "An internal error has occurred.";

pub fn full_body(body: impl Into<Bytes>) -> RespBody {
    Full::new(body.into())
        .map_err(|never| match never {})
        .boxed()
}

/// Plain text response generated by the proxy itself
pub fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<RespBody> {
    let mut resp = Response::new(full_body(body));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    resp
}

pub fn healthcheck_response() -> Response<RespBody> {
    text_response(StatusCode::OK, HEALTHCHECK_BODY)
}

pub fn rejection_response(rejection: &Rejection) -> Response<RespBody> {
    text_response(rejection.status, REJECTION_BODY)
}

pub fn internal_error_response() -> Response<RespBody> {
    text_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY)
}
