use http::header::HOST;
use http::uri::{Authority, Scheme};
use http::{HeaderValue, Request, Response, Uri, Version};
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::proxy::client_pool::HttpClient;
use crate::proxy::http_result::{HttpError, HttpResult};
use crate::proxy::RespBody;

/// Scheme and authority of the protected service.
#[derive(Debug, Clone)]
pub struct Upstream {
    scheme: Scheme,
    authority: Authority,
}

impl Upstream {
    /// Parses a base URL such as `http://localhost:8000`. Any path is ignored.
    pub fn parse(url: &str) -> crate::error::Result<Self> {
        let uri: Uri = url.parse()?;
        let parts = uri.into_parts();
        match (parts.scheme, parts.authority) {
            (Some(scheme), Some(authority)) => Ok(Self { scheme, authority }),
            _ => Err(crate::error::ProxyError::Config(format!(
                "Forward URL must be absolute: {url}"
            ))),
        }
    }

    /// Target URI for `original`, keeping its path and query.
    pub fn target(&self, original: &Uri) -> HttpResult<Uri> {
        let path_and_query = original.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| HttpError::InvalidUri(e.to_string()))
    }
}

/// Sends `req` to the upstream and returns once response headers arrive.
///
/// The client's `Host` is kept; HTTP/2 requests, which carry the authority
/// in the URI instead, get it copied into a `Host` header.
pub async fn forward(
    req: Request<Incoming>,
    upstream: &Upstream,
    client: &HttpClient,
) -> HttpResult<Response<RespBody>> {
    let (mut parts, body) = req.into_parts();

    if !parts.headers.contains_key(HOST) {
        if let Some(authority) = parts.uri.authority() {
            let host = HeaderValue::from_str(authority.as_str())
                .map_err(|e| HttpError::FailedToGenerateUpstreamRequest(e.to_string()))?;
            parts.headers.insert(HOST, host);
        }
    }

    parts.uri = upstream.target(&parts.uri)?;
    parts.version = Version::HTTP_11;

    let out_req = Request::from_parts(parts, body);
    match client.request(out_req).await {
        Ok(resp) => Ok(resp.map(|b| b.boxed())),
        Err(e) => Err(HttpError::FailedToGetResponseFromBackend(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_path_and_query() -> Result<(), Box<dyn std::error::Error>> {
        let upstream = Upstream::parse("http://localhost:8000")?;
        let target = upstream.target(&"/a/b?c=d".parse()?)?;
        assert_eq!(target.to_string(), "http://localhost:8000/a/b?c=d");

        let absolute = upstream.target(&"http://public.example/x".parse()?)?;
        assert_eq!(absolute.to_string(), "http://localhost:8000/x");
        Ok(())
    }

    #[test]
    fn rejects_relative_forward_url() {
        assert!(Upstream::parse("/only/a/path").is_err());
    }
}
