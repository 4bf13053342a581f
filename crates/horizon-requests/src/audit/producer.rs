//! Log producers: where serialized audit records go.

use std::io::Write;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{RequestError, Result};
use crate::logger::LogContext;

/// Destination for serialized audit records.
///
/// Returns an opaque message identifier on success. Producers that have no
/// notion of an identifier return an empty string.
#[async_trait]
pub trait LogProducer: Send + Sync {
    /// Ship one serialized audit record.
    async fn send_log_message(&self, ctx: &LogContext, data: &[u8]) -> Result<String>;
}

/// Producer that accepts and drops every record.
#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardLogProducer;

#[async_trait]
impl LogProducer for DiscardLogProducer {
    async fn send_log_message(&self, _ctx: &LogContext, _data: &[u8]) -> Result<String> {
        Ok(String::new())
    }
}

/// Producer that prints each record as one line.
pub struct PrinterLogProducer {
    out: Mutex<Box<dyn Write + Send>>,
}

impl PrinterLogProducer {
    /// Print records to standard output.
    pub fn stdout() -> Self {
        Self::with_writer(std::io::stdout())
    }

    /// Print records to an arbitrary writer.
    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Mutex::new(Box::new(writer)),
        }
    }
}

impl Default for PrinterLogProducer {
    fn default() -> Self {
        Self::stdout()
    }
}

impl std::fmt::Debug for PrinterLogProducer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterLogProducer").finish_non_exhaustive()
    }
}

#[async_trait]
impl LogProducer for PrinterLogProducer {
    async fn send_log_message(&self, _ctx: &LogContext, data: &[u8]) -> Result<String> {
        let mut out = self.out.lock();
        // Printing never fails the request.
        if let Err(e) = writeln!(
            out,
            "[PrinterLogProducer] send log message: {}",
            String::from_utf8_lossy(data)
        ) {
            tracing::warn!(target: "horizon_requests::audit", "Failed to print log message: {}", e);
        }
        Ok(String::new())
    }
}

/// Publish primitive of a message queue client.
///
/// Implement this for the queue client in use; [`QueueLogProducer`] handles the
/// audit-specific parts.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish `payload` to `topic`, returning the broker's message id.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<String>;
}

/// Producer that publishes every record to a message queue topic.
#[derive(Debug)]
pub struct QueueLogProducer<P> {
    publisher: P,
    topic: String,
}

impl<P: MessagePublisher> QueueLogProducer<P> {
    /// Create a producer publishing to `topic` through `publisher`.
    pub fn new(publisher: P, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    /// The destination topic.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

#[async_trait]
impl<P: MessagePublisher> LogProducer for QueueLogProducer<P> {
    async fn send_log_message(&self, _ctx: &LogContext, data: &[u8]) -> Result<String> {
        self.publisher
            .publish(&self.topic, data.to_vec())
            .await
            .map_err(|e| match e {
                RequestError::Publish { .. } => e,
                other => RequestError::Publish {
                    topic: self.topic.clone(),
                    message: other.to_string(),
                },
            })
    }
}
