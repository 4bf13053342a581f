//! Diagnostic sinks for request execution.
//!
//! Every request carries a [`Logger`] that receives one line per execution
//! stage. The default, [`TracingLogger`], forwards lines to `tracing` so they
//! land wherever the application installed its subscriber.

use std::fmt;

/// Correlation handle passed alongside every diagnostic line and audit record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogContext {
    log_id: Option<String>,
}

impl LogContext {
    /// Create a context carrying the given correlation identifier.
    pub fn with_log_id(log_id: impl Into<String>) -> Self {
        Self {
            log_id: Some(log_id.into()),
        }
    }

    /// The correlation identifier, if one was supplied.
    pub fn log_id(&self) -> Option<&str> {
        self.log_id.as_deref()
    }
}

/// Destination for diagnostic lines.
///
/// Implementations must not fail; anything that goes wrong while writing a
/// line is the logger's own business.
pub trait Logger: Send + Sync {
    /// Record an informational line.
    fn info(&self, ctx: &LogContext, args: fmt::Arguments<'_>);

    /// Record an error line.
    fn error(&self, ctx: &LogContext, args: fmt::Arguments<'_>);
}

/// Logger that emits `tracing` events under the `horizon_requests` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, ctx: &LogContext, args: fmt::Arguments<'_>) {
        tracing::info!(target: "horizon_requests", log_id = ctx.log_id().unwrap_or_default(), "{}", args);
    }

    fn error(&self, ctx: &LogContext, args: fmt::Arguments<'_>) {
        tracing::error!(target: "horizon_requests", log_id = ctx.log_id().unwrap_or_default(), "{}", args);
    }
}

/// Logger that drops every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardLogger;

impl Logger for DiscardLogger {
    fn info(&self, _ctx: &LogContext, _args: fmt::Arguments<'_>) {}

    fn error(&self, _ctx: &LogContext, _args: fmt::Arguments<'_>) {}
}
