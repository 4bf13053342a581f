//! Structured audit records and the producers that ship them.
//!
//! A request assembles at most one [`AuditRecord`] per execution and hands its
//! JSON form to a [`LogProducer`]. Three producers ship with the crate:
//!
//! - [`DiscardLogProducer`] accepts and drops every record
//! - [`PrinterLogProducer`] writes records to stdout (or any writer)
//! - [`QueueLogProducer`] publishes records through a [`MessagePublisher`]
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use horizon_requests::{PrinterLogProducer, RequestBuilder};
//!
//! let request = RequestBuilder::get("https://httpbin.org/get")
//!     .log_producer(Arc::new(PrinterLogProducer::stdout()))
//!     .build();
//!
//! let body = request.text().await?;
//! let record = request.audit_record().await;
//! ```

mod producer;
mod record;

pub use producer::{
    DiscardLogProducer, LogProducer, MessagePublisher, PrinterLogProducer, QueueLogProducer,
};
pub use record::{AuditRecord, RequestMessageType, header_values};
