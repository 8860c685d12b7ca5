use std::fs;
use std::path::Path;

use http::header::HeaderName;

use crate::config::Settings;
use crate::error::{ProxyError, Result};
use crate::ip::ForwardedIpResolver;

pub fn load_from_path<P: AsRef<Path>>(p: P) -> Result<Settings> {
    let txt = fs::read_to_string(p)
        .map_err(|e| ProxyError::Config(format!("Failed to read config file: {e}")))?;
    let settings: Settings = toml::from_str(&txt)
        .map_err(|e| ProxyError::Config(format!("Failed to parse config: {e}")))?;

    validate_settings(&settings)?;

    Ok(settings)
}

pub fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.forward_host.trim().is_empty() {
        return Err(ProxyError::Config("forward_host must not be empty".to_string()));
    }

    if settings.forward_port == 0 {
        return Err(ProxyError::Config("forward_port must not be 0".to_string()));
    }

    HeaderName::from_bytes(settings.bucket_header_name.as_bytes()).map_err(|e| {
        ProxyError::Config(format!(
            "Invalid bucket header name {}: {e}",
            settings.bucket_header_name
        ))
    })?;

    let endpoint = settings.full_config_endpoint();
    let scheme = endpoint
        .split_once("://")
        .map(|(scheme, _)| scheme.to_ascii_lowercase())
        .unwrap_or_default();
    if !matches!(scheme.as_str(), "http" | "https" | "file") {
        return Err(ProxyError::Config(format!(
            "Unsupported config endpoint scheme in {endpoint}"
        )));
    }

    ForwardedIpResolver::from_config(&settings.forwarded_headers)?;

    Ok(())
}
