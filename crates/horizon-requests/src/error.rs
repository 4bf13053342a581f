//! Error types for lazily executed requests.

use std::sync::Arc;

use thiserror::Error;

/// Errors produced while configuring, executing or decoding a request.
///
/// The type is `Clone` because a request memoizes its terminal error and hands
/// the same value to every accessor that observes it.
#[derive(Debug, Clone, Error)]
pub enum RequestError {
    /// Caller-supplied error. Displayed verbatim.
    #[error("{0}")]
    Custom(Arc<dyn std::error::Error + Send + Sync>),

    /// The outbound call could not be constructed (bad method, URL or client).
    #[error("[horizon-requests] {method} {url} new request failed: {message}")]
    Build {
        /// The configured method.
        method: String,
        /// The resolved URL.
        url: String,
        /// Underlying cause.
        message: String,
    },

    /// The transport failed to deliver the request or receive a response.
    #[error("[horizon-requests] {method} {url} send request failed: {message}")]
    Send {
        /// The configured method.
        method: String,
        /// The resolved URL.
        url: String,
        /// Underlying cause.
        message: String,
        /// Whether the configured timeout elapsed.
        timed_out: bool,
    },

    /// The response body could not be drained.
    #[error("[horizon-requests] {method} {url} read response failed: {message}")]
    Read {
        /// The configured method.
        method: String,
        /// The resolved URL.
        url: String,
        /// Underlying cause.
        message: String,
    },

    /// The caller stopped waiting before the stage finished. The request is
    /// not attempted again.
    #[error("[horizon-requests] {method} {url} {stage} cancelled before completion")]
    Cancelled {
        /// The configured method.
        method: String,
        /// The resolved URL.
        url: String,
        /// The stage that was interrupted.
        stage: &'static str,
    },

    /// The audit record could not be handed to the log producer.
    #[error("[horizon-requests] {method} {url} send log message failed: {message}")]
    LogDispatch {
        /// The configured method.
        method: String,
        /// The resolved URL.
        url: String,
        /// Underlying cause.
        message: String,
    },

    /// The response body is not valid JSON for the requested type.
    #[error("[horizon-requests] {method} {url} unmarshal response failed: {message}")]
    Decode {
        /// The configured method.
        method: String,
        /// The resolved URL.
        url: String,
        /// Underlying cause.
        message: String,
    },

    /// Invalid header name or value.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Cookie jar load or save failure.
    #[error("cookie jar error: {0}")]
    Cookie(String),

    /// A message publisher rejected an audit record.
    #[error("publish to {topic} failed: {message}")]
    Publish {
        /// Destination topic.
        topic: String,
        /// Underlying cause.
        message: String,
    },
}

impl RequestError {
    /// Create a caller-supplied error from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        let boxed: Box<dyn std::error::Error + Send + Sync> = message.into().into();
        Self::Custom(Arc::from(boxed))
    }

    /// Wrap an arbitrary error as a caller-supplied error.
    pub fn custom(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(err))
    }

    /// Whether this error was caused by the configured timeout elapsing.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Send { timed_out: true, .. })
    }

    /// Whether a caller abandoned the request while it was in flight.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Whether the error happened before any network I/O was attempted.
    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build { .. })
    }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for RequestError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for RequestError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// Render an error together with its source chain.
pub(crate) fn describe(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

/// A specialized Result type for request operations.
pub type Result<T> = std::result::Result<T, RequestError>;
