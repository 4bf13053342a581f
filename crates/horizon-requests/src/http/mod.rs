//! Lazily executed HTTP requests.
//!
//! A [`RequestBuilder`] collects configuration; [`RequestBuilder::build`]
//! freezes it into a [`Request`] whose first terminal accessor performs the
//! call. Factories and sessions hand out builders with shared options.
//!
//! # Example
//!
//! ```ignore
//! use horizon_requests::http::RequestBuilder;
//!
//! let request = RequestBuilder::get("https://httpbin.org/get")
//!     .query("a", "1")
//!     .timeout(Duration::from_secs(5))
//!     .build();
//!
//! // Sends the request.
//! let status = request.status().await?;
//! // Reads the body of the same response; nothing is sent again.
//! let body = request.text().await?;
//! ```

mod config;
mod execute;
mod factory;
mod request;

pub use config::RequestConfig;
pub use execute::Request;
pub use factory::{
    RequestCheck, RequestFactory, RequestOption, Session, with_config, with_cookie_jar,
    with_header, with_ignore_ssl, with_log_producer, with_logger, with_no_redirect, with_timeout,
};
pub use request::{MultipartForm, RequestBuilder};
