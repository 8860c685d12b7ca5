#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod ip;
pub mod limits;
pub mod proxy;
pub mod telemetry;

pub use config::{load_from_path, Settings};
pub use error::{ProxyError, Result};
pub use ip::{ClientIpResolver, ForwardedHeader, ForwardedIpResolver};
pub use limits::{Decision, LimitsConfigLoader, LimitsConfiguration, LimitsEvaluator};
pub use proxy::{run, serve, EventHook, Hooks, ProxyContext};
