mod forwarded;
mod loader;
mod root;
mod telemetry;
mod timeout;

pub use forwarded::ForwardedHeaderConfig;
pub use loader::{load_from_path, validate_settings};
pub use root::Settings;
pub use telemetry::{LoggingConfig, TelemetryConfig};
pub use timeout::{KeepAliveConfig, TimeoutConfig};
