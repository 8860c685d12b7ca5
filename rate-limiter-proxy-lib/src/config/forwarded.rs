use serde::Deserialize;

/// A forwarded-for style header to read the client address from
///
/// Headers are consulted in the order they are configured; `X-Forwarded-For`
/// is always consulted after them.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ForwardedHeaderConfig {
    /// Header name, case-insensitive
    pub name: String,
    /// CIDR ranges of proxies to skip when reading the header right to left
    /// Example: ["10.0.0.0/8", "fd00::/8"]
    /// Default: []
    #[serde(default)]
    pub ignored_ip_ranges: Vec<String>,
}
