use std::borrow::Cow;

use http::{HeaderMap, Request, Uri};

/// Read-only view of an inbound request that conditions are evaluated against.
///
/// The client IP is attached by the evaluator once it has been resolved.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
    pub client_ip: Option<&'a str>,
}

impl<'a> RequestView<'a> {
    pub fn new(uri: &'a Uri, headers: &'a HeaderMap) -> Self {
        Self { uri, headers, client_ip: None }
    }

    pub fn from_request<B>(req: &'a Request<B>) -> Self {
        Self::new(req.uri(), req.headers())
    }

    pub fn with_client_ip(mut self, ip: Option<&'a str>) -> Self {
        self.client_ip = ip;
        self
    }

    /// Path component only, without the query string.
    pub fn path(&self) -> &'a str {
        self.uri.path()
    }

    /// Path and query as received, `/` when the target carries neither.
    pub fn path_and_query(&self) -> &'a str {
        self.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/")
    }

    /// Header value as a string. Repeated headers are joined with `", "` in
    /// arrival order; non-visible-ASCII values are skipped.
    pub fn header(&self, name: &str) -> Option<Cow<'a, str>> {
        let mut values = self.headers.get_all(name).iter().filter_map(|v| v.to_str().ok());
        let first = values.next()?;
        match values.next() {
            None => Some(Cow::Borrowed(first)),
            Some(second) => {
                let mut joined = format!("{first}, {second}");
                for value in values {
                    joined.push_str(", ");
                    joined.push_str(value);
                }
                Some(Cow::Owned(joined))
            }
        }
    }
}
