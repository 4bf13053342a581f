//! Execute-once request state machine.
//!
//! A [`Request`] fires at most one network call no matter how many accessors
//! are called, or from how many tasks. Execution is split in three stages,
//! each guarded by its own flag so it runs at most once:
//!
//! 1. **send**: resolve the URL, build the client, perform the call
//! 2. **read**: drain the response body into memory
//! 3. **produce-log**: assemble and dispatch the [`AuditRecord`]
//!
//! Every accessor goes through a single per-request lock. The first error a
//! stage returns becomes the request's terminal error; later accessors get a
//! clone of it without touching the network again.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::{Mutex, MutexGuard};

use super::request::RequestBody;
use crate::audit::{AuditRecord, LogProducer, RequestMessageType, header_values};
use crate::cookie::PersistentCookieJar;
use crate::error::{RequestError, Result, describe};
use crate::logger::{LogContext, Logger};

/// Frozen configuration of a request.
pub(crate) struct RequestSpec {
    pub(crate) method: String,
    pub(crate) url: String,
    pub(crate) headers: http::HeaderMap,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) raw_body: Bytes,
    pub(crate) timeout: Option<Duration>,
    pub(crate) ignore_ssl: bool,
    pub(crate) follow_redirects: bool,
    pub(crate) cookie_jar: Option<Arc<PersistentCookieJar>>,
    pub(crate) log_producer: Option<Arc<dyn LogProducer>>,
    pub(crate) logger: Arc<dyn Logger>,
    pub(crate) context: LogContext,
}

/// Mutable state, only touched while holding the request lock.
#[derive(Default)]
struct ExecutionState {
    built: bool,
    read: bool,
    logged: bool,
    // Stage whose await was entered but never resumed.
    in_flight: Option<Stage>,
    body: Option<RequestBody>,
    response: Option<reqwest::Response>,
    status: Option<http::StatusCode>,
    response_headers: http::HeaderMap,
    bytes: Bytes,
    send_error: Option<RequestError>,
    request_time: Option<DateTime<Utc>>,
    response_time: Option<DateTime<Utc>>,
    record: Option<AuditRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    Send,
    Read,
}

/// A configured HTTP request that executes lazily, exactly once.
///
/// Built with [`RequestBuilder`](super::RequestBuilder). The first terminal
/// accessor ([`text`](Self::text), [`bytes`](Self::bytes),
/// [`json`](Self::json), [`status`](Self::status),
/// [`headers`](Self::headers)) performs the call; every later accessor,
/// including concurrent ones, observes the memoized outcome.
///
/// Share a request between tasks with `Arc<Request>`.
pub struct Request {
    spec: RequestSpec,
    resolved_url: OnceLock<String>,
    failure: OnceLock<RequestError>,
    state: Mutex<ExecutionState>,
}

impl Request {
    pub(crate) fn new(
        spec: RequestSpec,
        body: Option<RequestBody>,
        preset_error: Option<RequestError>,
        send_error: Option<RequestError>,
    ) -> Self {
        let failure = OnceLock::new();
        if let Some(err) = preset_error {
            let _ = failure.set(err);
        }
        Self {
            spec,
            resolved_url: OnceLock::new(),
            failure,
            state: Mutex::new(ExecutionState {
                body,
                send_error,
                ..Default::default()
            }),
        }
    }

    /// The configured method.
    pub fn method(&self) -> &str {
        &self.spec.method
    }

    /// The URL with query parameters merged in.
    ///
    /// Computed on first use and stable afterwards.
    pub fn resolved_url(&self) -> &str {
        self.resolved_url
            .get_or_init(|| resolve_url(&self.spec.url, &self.spec.query))
    }

    /// Whether the network call has been attempted.
    pub async fn has_executed(&self) -> bool {
        self.state.lock().await.built
    }

    /// The audit record assembled for this request, if one was dispatched.
    pub async fn audit_record(&self) -> Option<AuditRecord> {
        self.state.lock().await.record.clone()
    }

    /// Response status code. Does not read the body.
    pub async fn status(&self) -> Result<u16> {
        let state = self.execute(Stage::Send).await?;
        Ok(state.status.map(|s| s.as_u16()).unwrap_or_default())
    }

    /// Response headers. Does not read the body.
    pub async fn headers(&self) -> Result<http::HeaderMap> {
        let state = self.execute(Stage::Send).await?;
        Ok(state.response_headers.clone())
    }

    /// Response body as raw bytes.
    pub async fn bytes(&self) -> Result<Bytes> {
        let state = self.execute(Stage::Read).await?;
        Ok(state.bytes.clone())
    }

    /// Response body as text. Invalid UTF-8 is replaced.
    pub async fn text(&self) -> Result<String> {
        let state = self.execute(Stage::Read).await?;
        Ok(String::from_utf8_lossy(&state.bytes).into_owned())
    }

    /// Deserialize the response body from JSON.
    ///
    /// A decoding failure is returned to this caller only; it does not become
    /// the request's terminal error.
    pub async fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let state = self.execute(Stage::Read).await?;
        serde_json::from_slice(&state.bytes).map_err(|e| RequestError::Decode {
            method: self.spec.method.clone(),
            url: self.resolved_url().to_string(),
            message: e.to_string(),
        })
    }

    /// Run `stage` under the request lock, memoizing its failure.
    async fn execute(&self, stage: Stage) -> Result<MutexGuard<'_, ExecutionState>> {
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }

        let mut state = self.state.lock().await;
        // Another caller may have failed while we waited for the lock.
        if let Some(err) = self.failure.get() {
            return Err(err.clone());
        }

        let outcome = match stage {
            Stage::Send => self.send(&mut state).await,
            Stage::Read => self.read(&mut state).await,
        };

        match outcome {
            Ok(()) => Ok(state),
            Err(err) => Err(self.failure.get_or_init(|| err).clone()),
        }
    }

    async fn send(&self, state: &mut ExecutionState) -> Result<()> {
        if state.built {
            return match state.in_flight {
                Some(Stage::Send) => Err(self.cancelled(Stage::Send)),
                _ => Ok(()),
            };
        }

        let spec = &self.spec;
        let url = self.resolved_url();

        spec.logger.info(
            &spec.context,
            format_args!(
                "[horizon-requests] {}: {}, body={}, header={:?}",
                spec.method,
                url,
                String::from_utf8_lossy(&spec.raw_body),
                spec.headers
            ),
        );

        let _save_jar = spec.cookie_jar.as_deref().map(|jar| SaveJarOnDrop {
            jar,
            logger: spec.logger.as_ref(),
            context: &spec.context,
        });

        let (client, request) = match self.prepare(state.body.take(), url) {
            Ok(prepared) => prepared,
            Err(err) => {
                state.built = true;
                return Err(err);
            }
        };

        // Marked before awaiting so a dropped caller cannot cause a resend.
        state.built = true;
        state.in_flight = Some(Stage::Send);
        state.request_time = Some(Utc::now());
        let outcome = client.execute(request).await;
        state.response_time = Some(Utc::now());
        state.in_flight = None;

        match outcome {
            Ok(response) => {
                state.status = Some(response.status());
                state.response_headers = response.headers().clone();
                state.response = Some(response);
            }
            Err(e) => {
                let err = RequestError::Send {
                    method: spec.method.clone(),
                    url: url.to_string(),
                    message: if e.is_timeout() {
                        format!("deadline exceeded: {}", describe(&e))
                    } else {
                        describe(&e)
                    },
                    timed_out: e.is_timeout(),
                };
                if state.send_error.is_none() {
                    state.send_error = Some(err.clone());
                }
                return Err(err);
            }
        }

        if let Err(e) = self.produce_log(state).await {
            spec.logger
                .error(&spec.context, format_args!("produce log failed: {}", e));
        }
        Ok(())
    }

    async fn read(&self, state: &mut ExecutionState) -> Result<()> {
        self.send(state).await?;
        if state.read {
            return match state.in_flight {
                Some(Stage::Read) => Err(self.cancelled(Stage::Read)),
                _ => Ok(()),
            };
        }

        let spec = &self.spec;
        let url = self.resolved_url();

        state.read = true;
        state.in_flight = Some(Stage::Read);
        let outcome = match state.response.take() {
            Some(response) => response.bytes().await,
            None => Ok(Bytes::new()),
        };
        state.in_flight = None;

        state.bytes = outcome.map_err(|e| RequestError::Read {
            method: spec.method.clone(),
            url: url.to_string(),
            message: describe(&e),
        })?;

        spec.logger.info(
            &spec.context,
            format_args!(
                "[horizon-requests] {}: {}, status_code: {}, header: {:?}, body: {}",
                spec.method,
                url,
                state.status.map(|s| s.as_u16()).unwrap_or_default(),
                state.response_headers,
                String::from_utf8_lossy(&state.bytes)
            ),
        );
        Ok(())
    }

    async fn produce_log(&self, state: &mut ExecutionState) -> Result<()> {
        let Some(producer) = self.spec.log_producer.as_ref() else {
            return Ok(());
        };
        if !state.built || state.logged {
            return Ok(());
        }

        let spec = &self.spec;
        let url = self.resolved_url();
        let record = self.assemble_record(state);
        state.logged = true;

        let dispatch_error = |message: String| RequestError::LogDispatch {
            method: spec.method.clone(),
            url: url.to_string(),
            message,
        };

        let data = record.to_json().map_err(|e| dispatch_error(e.to_string()))?;
        state.record = Some(record);

        let message_id = producer
            .send_log_message(&spec.context, &data)
            .await
            .map_err(|e| dispatch_error(e.to_string()))?;

        spec.logger.info(
            &spec.context,
            format_args!(
                "[horizon-requests] {}: {}, produce log: id={}, {}",
                spec.method,
                url,
                message_id,
                String::from_utf8_lossy(&data)
            ),
        );
        Ok(())
    }

    /// Error for a stage whose caller went away before it finished.
    fn cancelled(&self, stage: Stage) -> RequestError {
        RequestError::Cancelled {
            method: self.spec.method.clone(),
            url: self.resolved_url().to_string(),
            stage: match stage {
                Stage::Send => "send request",
                Stage::Read => "read response",
            },
        }
    }

    fn assemble_record(&self, state: &ExecutionState) -> AuditRecord {
        let request_time = state.request_time.unwrap_or_default();
        let response_time = state.response_time.unwrap_or_default();
        let error_message = state
            .send_error
            .as_ref()
            .or_else(|| self.failure.get())
            .map(ToString::to_string)
            .unwrap_or_default();

        AuditRecord {
            method: self.spec.method.clone(),
            url: self.resolved_url().to_string(),
            request_body: String::from_utf8_lossy(&self.spec.raw_body).into_owned(),
            request_header: header_values(&self.spec.headers),
            request_time,
            response_body: String::from_utf8_lossy(&state.bytes).into_owned(),
            response_header: header_values(&state.response_headers),
            response_state_code: state.status.map(|s| s.as_u16()).unwrap_or_default(),
            response_time,
            time_consuming: response_time.timestamp_millis() - request_time.timestamp_millis(),
            error_message,
            log_id: self.spec.context.log_id().unwrap_or_default().to_string(),
            request_type: RequestMessageType::Outbound,
        }
    }

    fn prepare(
        &self,
        body: Option<RequestBody>,
        url: &str,
    ) -> Result<(reqwest::Client, reqwest::Request)> {
        let spec = &self.spec;
        let build_error = |message: String| RequestError::Build {
            method: spec.method.clone(),
            url: url.to_string(),
            message,
        };

        let method = reqwest::Method::from_bytes(spec.method.as_bytes())
            .map_err(|e| build_error(e.to_string()))?;
        let target = url::Url::parse(url).map_err(|e| build_error(e.to_string()))?;

        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = spec.timeout {
            builder = builder.timeout(timeout);
        }
        if spec.ignore_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(jar) = &spec.cookie_jar {
            builder = builder.cookie_provider(jar.provider());
        }
        if !spec.follow_redirects {
            builder = builder.redirect(Policy::none());
        }
        let client = builder.build().map_err(|e| build_error(describe(&e)))?;

        let mut request = client.request(method, target).headers(spec.headers.clone());
        match body {
            Some(RequestBody::Bytes(bytes)) => request = request.body(bytes),
            Some(RequestBody::Multipart(form)) => request = request.multipart(form),
            None => {}
        }
        let request = request.build().map_err(|e| build_error(describe(&e)))?;

        Ok((client, request))
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.spec.method)
            .field("url", &self.resolved_url())
            .field("failure", &self.failure.get())
            .finish_non_exhaustive()
    }
}

/// Saves the cookie jar when the send stage returns, on every path.
struct SaveJarOnDrop<'a> {
    jar: &'a PersistentCookieJar,
    logger: &'a dyn Logger,
    context: &'a LogContext,
}

impl Drop for SaveJarOnDrop<'_> {
    fn drop(&mut self) {
        // Saving is blocking file I/O; move it off a multi-thread worker.
        let save = || self.jar.save();
        let outcome = match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(save)
            }
            _ => save(),
        };
        if let Err(e) = outcome {
            self.logger
                .error(self.context, format_args!("save cookie failed: {}", e));
        }
    }
}

/// Merge query parameters into `url`, keeping existing ones first.
fn resolve_url(url: &str, query: &[(String, String)]) -> String {
    if query.is_empty() {
        return url.to_string();
    }

    match url::Url::parse(url) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().extend_pairs(query);
            parsed.into()
        }
        // Left for the send stage to reject as a build error.
        Err(_) => {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query)
                .finish();
            let separator = if url.contains('?') { '&' } else { '?' };
            format!("{url}{separator}{encoded}")
        }
    }
}
