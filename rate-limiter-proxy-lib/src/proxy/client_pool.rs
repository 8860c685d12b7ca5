use std::time::Duration;

use hyper::body::Incoming;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::KeepAliveConfig;

pub type HttpClient = Client<HttpConnector, Incoming>;

/// Shared HTTP/1.1 client for the protected service
///
/// Cloning is cheap and all clones share one connection pool, so
/// upstream connections are reused across requests.
#[derive(Clone)]
pub struct ClientPool {
    client: HttpClient,
}

impl ClientPool {
    pub fn new(keep_alive: &KeepAliveConfig) -> Self {
        let mut connector = HttpConnector::new();
        // TCP keep-alive: sends periodic packets to keep idle connections alive
        if keep_alive.enabled {
            connector.set_keepalive(Some(Duration::from_secs(keep_alive.timeout_secs)));
        } else {
            connector.set_keepalive(None);
        }

        let mut builder = Client::builder(TokioExecutor::new());
        builder.pool_idle_timeout(Duration::from_secs(keep_alive.timeout_secs));
        if !keep_alive.enabled {
            builder.pool_max_idle_per_host(0);
        }

        Self { client: builder.build(connector) }
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }
}
