//! Lazy, execute-once HTTP requests for Horizon.
//!
//! This crate provides a fluent request builder whose requests fire at most
//! once:
//!
//! - **Execute once**: the first terminal accessor sends the request; every
//!   later accessor, from any task, observes the memoized result or error
//! - **Audit logging**: an optional structured record of each exchange,
//!   shipped to a pluggable producer
//! - **Persistent cookies**: a cookie jar loaded before and saved after each
//!   execution
//!
//! # Making a request
//!
//! ```ignore
//! use horizon_requests::RequestBuilder;
//!
//! let request = RequestBuilder::get("https://httpbin.org/headers")
//!     .header("a", "1")
//!     .header("a", "2")
//!     .timeout(Duration::from_secs(10))
//!     .build();
//!
//! let status = request.status().await?;
//! let data: serde_json::Value = request.json().await?;
//! ```
//!
//! ## Terminal accessors
//!
//! - `text()` - body as a string
//! - `bytes()` - body as raw bytes
//! - `json()` - body deserialized from JSON
//! - `status()` - status code, without reading the body
//! - `headers()` - response headers, without reading the body
//!
//! # Audit records
//!
//! ```ignore
//! use horizon_requests::{PrinterLogProducer, RequestBuilder};
//!
//! let request = RequestBuilder::get("https://httpbin.org/get")
//!     .log_producer(Arc::new(PrinterLogProducer::stdout()))
//!     .log_id("trace-42")
//!     .build();
//!
//! request.text().await?;
//! let record = request.audit_record().await.expect("dispatched");
//! ```
//!
//! # Sessions
//!
//! ```ignore
//! use horizon_requests::Session;
//!
//! let session = Session::open("/tmp/cookies.json")?;
//! session.request("GET", "https://example.com/login").build().text().await?;
//! // Cookies set by the first response are sent, and saved to disk again.
//! session.request("GET", "https://example.com/me").build().text().await?;
//! ```

pub mod audit;
pub mod cookie;
mod error;
pub mod http;
pub mod logger;

pub use error::{RequestError, Result};

// Re-export commonly used types at the crate root
pub use audit::{
    AuditRecord, DiscardLogProducer, LogProducer, MessagePublisher, PrinterLogProducer,
    QueueLogProducer, RequestMessageType,
};
pub use cookie::{CookiePersistence, JsonFileCookies, PersistentCookieJar};
pub use crate::http::{
    MultipartForm, Request, RequestBuilder, RequestCheck, RequestConfig, RequestFactory,
    RequestOption, Session, with_config, with_cookie_jar, with_header, with_ignore_ssl,
    with_log_producer, with_logger, with_no_redirect, with_timeout,
};
pub use logger::{DiscardLogger, LogContext, Logger, TracingLogger};

/// Re-export of the HTTP types used in the public API.
pub use ::http::{HeaderMap, StatusCode};
