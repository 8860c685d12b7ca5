use std::sync::Arc;

use http::header::HeaderName;

use crate::config::Settings;
use crate::error::{ProxyError, Result};
use crate::limits::LimitsEvaluator;
use crate::proxy::client_pool::ClientPool;
use crate::proxy::forwarding::Upstream;
use crate::proxy::hooks::Hooks;

/// Everything a request handler needs, shared by all connections
pub struct ProxyContext {
    pub evaluator: Arc<LimitsEvaluator>,
    pub upstream: Upstream,
    pub client_pool: ClientPool,
    pub bucket_header: HeaderName,
    pub hooks: Hooks,
}

impl ProxyContext {
    pub fn new(settings: &Settings, evaluator: Arc<LimitsEvaluator>, hooks: Hooks) -> Result<Self> {
        let upstream = Upstream::parse(&settings.forward_url())?;
        let bucket_header = HeaderName::from_bytes(settings.bucket_header_name.as_bytes())
            .map_err(|e| {
                ProxyError::Config(format!(
                    "Invalid bucket header name {}: {e}",
                    settings.bucket_header_name
                ))
            })?;
        Ok(Self {
            evaluator,
            upstream,
            client_pool: ClientPool::new(&settings.timeout.keep_alive),
            bucket_header,
            hooks,
        })
    }
}
