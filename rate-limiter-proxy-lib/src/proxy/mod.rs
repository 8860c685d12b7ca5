pub mod client_pool;
pub mod connection;
pub mod context;
pub mod forwarding;
pub mod handler;
pub mod hooks;
pub mod http_result;
pub mod server;
pub mod synthetic_response;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;

pub type RespBody = BoxBody<Bytes, hyper::Error>;

pub use client_pool::ClientPool;
pub use context::ProxyContext;
pub use forwarding::Upstream;
pub use hooks::{EventHook, Hooks};
pub use http_result::HttpError;
pub use server::{run, serve, shutdown_signal};
