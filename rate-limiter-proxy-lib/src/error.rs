use thiserror::Error;

use crate::limits::{LimitsConfigError, LoaderError};

/// Errors that can occur in the rate limiter
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(#[from] http::uri::InvalidUri),

    #[error("Limits configuration error: {0}")]
    Limits(#[from] LimitsConfigError),

    #[error("Limits configuration source error: {0}")]
    Loader(#[from] LoaderError),
}

pub type Result<T> = std::result::Result<T, ProxyError>;
