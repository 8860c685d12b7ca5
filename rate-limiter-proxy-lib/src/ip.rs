//! Client IP resolution from forwarded-header chains.

use std::net::IpAddr;

use http::header::HeaderName;
use http::HeaderMap;
use ipnet::IpNet;

use crate::config::ForwardedHeaderConfig;
use crate::error::{ProxyError, Result};

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// Private and documentation ranges skipped in `X-Forwarded-For` chains.
pub const DEFAULT_IGNORED_RANGES: &[&str] =
    &["127.0.0.0/8", "10.0.0.0/8", "172.16.0.0/12", "192.0.2.0/24", "192.168.0.0/16"];

/// Determines which client a request should be accounted to.
pub trait ClientIpResolver: Send + Sync {
    /// Returns `None` when no client address can be determined.
    fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String>;
}

/// A forwarded header and the proxy ranges to skip when reading it.
#[derive(Debug, Clone)]
pub struct ForwardedHeader {
    name: HeaderName,
    ignored_ranges: Vec<IpNet>,
}

impl ForwardedHeader {
    pub fn new(name: HeaderName, ignored_ranges: Vec<IpNet>) -> Self {
        Self { name, ignored_ranges }
    }

    pub fn x_forwarded_for() -> Self {
        let ignored_ranges = DEFAULT_IGNORED_RANGES
            .iter()
            .filter_map(|r| r.parse::<IpNet>().ok())
            .collect();
        Self { name: HeaderName::from_static(X_FORWARDED_FOR), ignored_ranges }
    }

    pub fn from_config(cfg: &ForwardedHeaderConfig) -> Result<Self> {
        let name = HeaderName::from_bytes(cfg.name.as_bytes()).map_err(|e| {
            ProxyError::Config(format!("Invalid forwarded header name {}: {e}", cfg.name))
        })?;
        let ignored_ranges = cfg
            .ignored_ip_ranges
            .iter()
            .map(|r| {
                r.parse::<IpNet>().map_err(|e| {
                    ProxyError::Config(format!("Invalid IP range {r} for header {}: {e}", cfg.name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { name, ignored_ranges })
    }

    pub fn name(&self) -> &HeaderName {
        &self.name
    }

    fn is_ignored(&self, entry: &str) -> bool {
        entry
            .parse::<IpAddr>()
            .is_ok_and(|ip| self.ignored_ranges.iter().any(|net| net.contains(&ip)))
    }

    /// Right-most entry outside the ignored ranges, or the right-most entry
    /// when every one of them is ignored.
    pub fn extract(&self, value: &str) -> Option<String> {
        let entries: Vec<&str> = value.split(',').map(str::trim).collect();
        entries
            .iter()
            .rev()
            .find(|entry| !self.is_ignored(entry))
            .or_else(|| entries.last())
            .map(|entry| (*entry).to_string())
    }
}

/// Reads the first present forwarded header, falling back to the peer address.
///
/// `X-Forwarded-For` is always consulted, after any configured headers.
#[derive(Debug, Clone)]
pub struct ForwardedIpResolver {
    headers: Vec<ForwardedHeader>,
}

impl ForwardedIpResolver {
    pub fn new(mut headers: Vec<ForwardedHeader>) -> Self {
        if !headers.iter().any(|h| h.name == X_FORWARDED_FOR) {
            headers.push(ForwardedHeader::x_forwarded_for());
        }
        Self { headers }
    }

    pub fn from_config(cfg: &[ForwardedHeaderConfig]) -> Result<Self> {
        let headers = cfg.iter().map(ForwardedHeader::from_config).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(headers))
    }

    pub fn headers(&self) -> &[ForwardedHeader] {
        &self.headers
    }
}

impl Default for ForwardedIpResolver {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl ClientIpResolver for ForwardedIpResolver {
    fn resolve(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
        for forwarded in &self.headers {
            let Some(Ok(value)) = headers.get(&forwarded.name).map(|v| v.to_str()) else {
                continue;
            };
            if !value.is_empty() {
                return forwarded.extract(value);
            }
        }
        peer.map(|ip| ip.to_string())
    }
}
