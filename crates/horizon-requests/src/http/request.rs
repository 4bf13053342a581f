//! Request builder.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::multipart::Part;
use serde::Serialize;

use super::config::RequestConfig;
use super::execute::{Request, RequestSpec};
use crate::audit::LogProducer;
use crate::cookie::PersistentCookieJar;
use crate::error::{RequestError, Result};
use crate::logger::{LogContext, Logger, TracingLogger};

/// The payload handed to the transport when the request fires.
pub(crate) enum RequestBody {
    /// Raw bytes, also recorded in the audit log.
    Bytes(Bytes),
    /// Multipart form; not recorded in the audit log.
    Multipart(reqwest::multipart::Form),
}

/// Builder for a lazily executed [`Request`].
///
/// Nothing is sent while building. Setters that cannot be applied, such as an
/// invalid header name, record an error instead; the built request then fails
/// every accessor with that error without touching the network.
///
/// # Example
///
/// ```ignore
/// use horizon_requests::RequestBuilder;
///
/// let request = RequestBuilder::get("https://httpbin.org/get")
///     .query("a", "1")
///     .header("Accept", "application/json")
///     .build();
///
/// let status = request.status().await?;
/// let body = request.text().await?;
/// ```
pub struct RequestBuilder {
    method: String,
    url: String,
    headers: http::HeaderMap,
    query: Vec<(String, String)>,
    body: Option<RequestBody>,
    raw_body: Bytes,
    timeout: Option<Duration>,
    ignore_ssl: bool,
    follow_redirects: bool,
    cookie_jar: Option<Arc<PersistentCookieJar>>,
    log_producer: Option<Arc<dyn LogProducer>>,
    logger: Arc<dyn Logger>,
    context: LogContext,
    preset_error: Option<RequestError>,
    send_error: Option<RequestError>,
}

impl RequestBuilder {
    /// Start a request with the given method and URL.
    ///
    /// The method is validated when the request fires; an unknown method is a
    /// build error at that point.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            headers: http::HeaderMap::new(),
            query: Vec::new(),
            body: None,
            raw_body: Bytes::new(),
            timeout: None,
            ignore_ssl: false,
            follow_redirects: true,
            cookie_jar: None,
            log_producer: None,
            logger: Arc::new(TracingLogger),
            context: LogContext::default(),
            preset_error: None,
            send_error: None,
        }
    }

    /// Start a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Start a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    /// Start a PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    /// Start a DELETE request.
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    /// Start a PATCH request.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new("PATCH", url)
    }

    /// Start a HEAD request.
    pub fn head(url: impl Into<String>) -> Self {
        Self::new("HEAD", url)
    }

    /// Apply transport settings and default headers from a config.
    pub fn config(mut self, config: &RequestConfig) -> Self {
        if let Some(timeout) = config.timeout {
            self.timeout = Some(timeout);
        }
        self.ignore_ssl = config.ignore_ssl;
        self.follow_redirects = config.follow_redirects;
        for (name, value) in &config.default_headers {
            self = self.header(name, value);
        }
        self
    }

    /// The configured method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The configured URL, before query parameters are merged.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Append a header. Repeated names accumulate values in order.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let parsed = HeaderName::from_bytes(name.as_ref().as_bytes())
            .map_err(RequestError::from)
            .and_then(|name| Ok((name, HeaderValue::from_str(value.as_ref())?)));
        match parsed {
            Ok((name, value)) => {
                self.headers.append(name, value);
            }
            Err(e) => self.record_error(e),
        }
        self
    }

    /// Append several headers in iteration order.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, value) in headers {
            self = self.header(name, value);
        }
        self
    }

    /// Append a query parameter. Repeated keys keep every value in order.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Append several query parameters in iteration order.
    pub fn queries<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Set a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.raw_body = body.clone();
        self.body = Some(RequestBody::Bytes(body));
        self
    }

    /// Set a plain text body.
    pub fn text(self, body: impl Into<String>) -> Self {
        self.body(body.into())
    }

    /// Set a JSON body from a serializable value.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        match serde_json::to_vec(body) {
            Ok(bytes) => {
                self.headers
                    .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                self.body(bytes)
            }
            Err(e) => {
                tracing::error!(target: "horizon_requests::http", "Failed to serialize JSON body: {}", e);
                self.record_error(e.into());
                self
            }
        }
    }

    /// Set a URL-encoded form body.
    pub fn form<I, K, V>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let encoded = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        self.body(encoded)
    }

    /// Set a multipart form body.
    ///
    /// Multipart payloads are streamed to the transport and do not appear in
    /// the audit record's `request_body`.
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.raw_body = Bytes::new();
        self.body = Some(RequestBody::Multipart(form.into_reqwest()));
        self
    }

    /// Upload a single file as multipart form data, alongside plain fields.
    pub fn file<I, K, V>(
        self,
        file_name: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        field_name: impl Into<String>,
        fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let form = fields
            .into_iter()
            .fold(MultipartForm::new(), |form, (k, v)| form.text(k, v))
            .file(field_name, file_name, contents);
        self.multipart(form)
    }

    /// Set the overall request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skip TLS certificate verification.
    ///
    /// # Warning
    ///
    /// This is insecure and should only be used for testing.
    pub fn ignore_ssl(mut self, ignore: bool) -> Self {
        self.ignore_ssl = ignore;
        self
    }

    /// Return redirect responses instead of following them.
    pub fn no_redirect(mut self, no_redirect: bool) -> Self {
        self.follow_redirects = !no_redirect;
        self
    }

    /// Load cookies from and save cookies to a persistent jar.
    pub fn cookie_jar(mut self, jar: Arc<PersistentCookieJar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Ship an audit record of the exchange to `producer`.
    pub fn log_producer(mut self, producer: Arc<dyn LogProducer>) -> Self {
        self.log_producer = Some(producer);
        self
    }

    /// Send diagnostic lines to `logger` instead of `tracing`.
    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Correlation identifier for diagnostics and the audit record.
    pub fn log_id(mut self, log_id: impl Into<String>) -> Self {
        self.context = LogContext::with_log_id(log_id);
        self
    }

    /// Fail the request with `err` before anything is sent.
    ///
    /// Every accessor of the built request returns this error and no network
    /// call, body read or audit dispatch happens.
    pub fn preset_error(mut self, err: RequestError) -> Self {
        self.preset_error = Some(err);
        self
    }

    /// Pre-populate the send-error slot.
    ///
    /// The request still fires. A slot that is already filled is never
    /// overwritten by the transport outcome, so `err` is what the audit record
    /// reports in `error_message`.
    pub fn send_error(mut self, err: RequestError) -> Self {
        self.send_error = Some(err);
        self
    }

    /// Whether a setter has already recorded an error.
    pub fn has_error(&self) -> bool {
        self.preset_error.is_some()
    }

    /// Freeze the configuration into an executable request.
    pub fn build(self) -> Request {
        let spec = RequestSpec {
            method: self.method,
            url: self.url,
            headers: self.headers,
            query: self.query,
            raw_body: self.raw_body,
            timeout: self.timeout,
            ignore_ssl: self.ignore_ssl,
            follow_redirects: self.follow_redirects,
            cookie_jar: self.cookie_jar,
            log_producer: self.log_producer,
            logger: self.logger,
            context: self.context,
        };
        Request::new(spec, self.body, self.preset_error, self.send_error)
    }

    /// Keep `err` unless an earlier error was already recorded.
    pub(crate) fn record_error(&mut self, err: RequestError) {
        if self.preset_error.is_none() {
            self.preset_error = Some(err);
        }
    }

    #[cfg(test)]
    pub(crate) fn header_map(&self) -> &http::HeaderMap {
        &self.headers
    }

    #[cfg(test)]
    pub(crate) fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }
}

impl std::fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("query", &self.query)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Multipart form data for file uploads.
pub struct MultipartForm {
    inner: reqwest::multipart::Form,
}

impl MultipartForm {
    /// Create a new empty multipart form.
    pub fn new() -> Self {
        Self {
            inner: reqwest::multipart::Form::new(),
        }
    }

    /// Add a text field to the form.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner = self.inner.text(name.into(), value.into());
        self
    }

    /// Add a file part.
    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Self {
        let part = Part::bytes(contents.into()).file_name(file_name.into());
        self.inner = self.inner.part(name.into(), part);
        self
    }

    /// Add a file part with an explicit content type.
    ///
    /// Fails if `content_type` is not a valid MIME type; the form is dropped in
    /// that case.
    pub fn typed_file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        contents: impl Into<Vec<u8>>,
        content_type: &str,
    ) -> Result<Self> {
        let part = Part::bytes(contents.into())
            .file_name(file_name.into())
            .mime_str(content_type)
            .map_err(|e| {
                RequestError::InvalidHeader(format!("content type {content_type:?}: {e}"))
            })?;
        self.inner = self.inner.part(name.into(), part);
        Ok(self)
    }

    pub(crate) fn into_reqwest(self) -> reqwest::multipart::Form {
        self.inner
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}
