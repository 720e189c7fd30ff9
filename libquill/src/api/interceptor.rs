//! Response interceptors
//!
//! Every API result the store receives passes through the installed
//! interceptors, in installation order, before the calling action sees it.
//! Interceptors observe failures; they cannot swallow them. The error always
//! reaches the action unchanged.

use std::sync::{Arc, PoisonError, RwLock};

use super::ApiResult;
use crate::error::NetworkError;
use crate::events::Notifier;

pub const REQUEST_FAILED_TITLE: &str = "Request failed";

/// Hook run on every failed API response
pub trait ResponseInterceptor: Send + Sync {
    fn on_error(&self, error: &NetworkError);
}

/// Ordered interceptor chain
#[derive(Clone, Default)]
pub struct Interceptors {
    response: Arc<RwLock<Vec<Arc<dyn ResponseInterceptor>>>>,
}

impl Interceptors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn use_response(&self, interceptor: Arc<dyn ResponseInterceptor>) {
        self.response
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.response
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pass a result through the chain and hand it back untouched
    pub fn run<T>(&self, result: ApiResult<T>) -> ApiResult<T> {
        if let Err(error) = &result {
            // Snapshot so an interceptor may install another without deadlocking
            let chain = self
                .response
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for interceptor in chain {
                interceptor.on_error(error);
            }
        }
        result
    }
}

/// Forwards every failure to a [`Notifier`]
pub struct NotifyOnError {
    notifier: Arc<dyn Notifier>,
}

impl NotifyOnError {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

impl ResponseInterceptor for NotifyOnError {
    fn on_error(&self, error: &NetworkError) {
        tracing::warn!(error = %error, "API request failed");
        self.notifier
            .notify_error(REQUEST_FAILED_TITLE, &describe(error));
    }
}

/// Notification text for a failure
///
/// Appends the response body when the server sent one; transport failures
/// have no response and get the bare message.
pub fn describe(error: &NetworkError) -> String {
    match error.body() {
        Some(body) => format!("{}\n{}", error, body),
        None => error.to_string(),
    }
}
