use std::sync::Arc;

use http::{Response, StatusCode};

use crate::limits::{Admission, Rejection};
use crate::proxy::http_result::HttpError;
use crate::proxy::RespBody;

/// Observer of request outcomes. Every method defaults to a no-op.
///
/// `admission` is `None` for requests forwarded without being counted.
pub trait EventHook: Send + Sync {
    fn forwarded(&self, _admission: Option<&Admission>) {}

    fn rejected(&self, _rejection: &Rejection) {}

    /// Custom response for a rejected request. The first hook returning one wins.
    fn reject_response(&self, _rejection: &Rejection) -> Option<Response<RespBody>> {
        None
    }

    fn served(&self, _admission: Option<&Admission>, _status: StatusCode) {}

    fn failed(&self, _admission: Option<&Admission>, _error: &HttpError) {}
}

/// Ordered set of registered hooks.
#[derive(Clone, Default)]
pub struct Hooks {
    hooks: Vec<Arc<dyn EventHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn EventHook>) {
        self.hooks.push(hook);
    }

    pub fn with(mut self, hook: Arc<dyn EventHook>) -> Self {
        self.register(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub(crate) fn forwarded(&self, admission: Option<&Admission>) {
        self.hooks.iter().for_each(|h| h.forwarded(admission));
    }

    pub(crate) fn rejected(&self, rejection: &Rejection) {
        self.hooks.iter().for_each(|h| h.rejected(rejection));
    }

    pub(crate) fn reject_response(&self, rejection: &Rejection) -> Option<Response<RespBody>> {
        self.hooks.iter().find_map(|h| h.reject_response(rejection))
    }

    pub(crate) fn served(&self, admission: Option<&Admission>, status: StatusCode) {
        self.hooks.iter().for_each(|h| h.served(admission, status));
    }

    pub(crate) fn failed(&self, admission: Option<&Admission>, error: &HttpError) {
        self.hooks.iter().for_each(|h| h.failed(admission, error));
    }
}
