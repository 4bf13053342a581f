//! Pre-configured request construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::config::RequestConfig;
use super::request::RequestBuilder;
use crate::audit::LogProducer;
use crate::cookie::PersistentCookieJar;
use crate::error::Result;
use crate::logger::Logger;

/// Configures a fresh builder.
pub type RequestOption = Arc<dyn Fn(RequestBuilder) -> RequestBuilder + Send + Sync>;

/// Validates a fresh builder; an error becomes the request's preset error.
pub type RequestCheck = Arc<dyn Fn(&RequestBuilder) -> Result<()> + Send + Sync>;

enum FactoryOption {
    Configure(RequestOption),
    Check(RequestCheck),
}

/// Creates builders that share a set of options.
///
/// Options run in the order they were added. A failing check stops the chain
/// and fails the request with the check's error.
///
/// # Example
///
/// ```ignore
/// use std::time::Duration;
/// use horizon_requests::{RequestFactory, with_timeout};
///
/// let factory = RequestFactory::new([with_timeout(Duration::from_secs(10))]);
/// let body = factory.request("GET", "https://httpbin.org/ip").build().text().await?;
/// ```
#[derive(Clone, Default)]
pub struct RequestFactory {
    options: Vec<Arc<FactoryOption>>,
}

impl RequestFactory {
    /// Create a factory applying `options` to every builder.
    pub fn new(options: impl IntoIterator<Item = RequestOption>) -> Self {
        Self {
            options: options
                .into_iter()
                .map(|option| Arc::new(FactoryOption::Configure(option)))
                .collect(),
        }
    }

    /// Create a factory applying a transport config to every builder.
    pub fn from_config(config: RequestConfig) -> Self {
        Self::new([with_config(config)])
    }

    /// Add a configuring option.
    pub fn option(
        mut self,
        option: impl Fn(RequestBuilder) -> RequestBuilder + Send + Sync + 'static,
    ) -> Self {
        self.options
            .push(Arc::new(FactoryOption::Configure(Arc::new(option))));
        self
    }

    /// Add a validating option.
    pub fn check(
        mut self,
        check: impl Fn(&RequestBuilder) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.options.push(Arc::new(FactoryOption::Check(Arc::new(check))));
        self
    }

    /// Start a request with every option applied.
    pub fn request(&self, method: impl Into<String>, url: impl Into<String>) -> RequestBuilder {
        let mut builder = RequestBuilder::new(method, url);
        for option in &self.options {
            match option.as_ref() {
                FactoryOption::Configure(configure) => builder = configure(builder),
                FactoryOption::Check(check) => {
                    if let Err(e) = check(&builder) {
                        builder.record_error(e);
                        return builder;
                    }
                }
            }
        }
        builder
    }

    /// Start a GET request with every option applied.
    pub fn get(&self, url: impl Into<String>) -> RequestBuilder {
        self.request("GET", url)
    }

    /// Start a POST request with every option applied.
    pub fn post(&self, url: impl Into<String>) -> RequestBuilder {
        self.request("POST", url)
    }
}

impl std::fmt::Debug for RequestFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestFactory")
            .field("options", &self.options.len())
            .finish()
    }
}

/// Option setting the request timeout.
pub fn with_timeout(timeout: Duration) -> RequestOption {
    Arc::new(move |builder| builder.timeout(timeout))
}

/// Option applying a transport config.
pub fn with_config(config: RequestConfig) -> RequestOption {
    Arc::new(move |builder| builder.config(&config))
}

/// Option appending a header.
pub fn with_header(name: impl Into<String>, value: impl Into<String>) -> RequestOption {
    let (name, value) = (name.into(), value.into());
    Arc::new(move |builder| builder.header(&name, &value))
}

/// Option skipping TLS verification.
pub fn with_ignore_ssl() -> RequestOption {
    Arc::new(|builder| builder.ignore_ssl(true))
}

/// Option disabling redirect following.
pub fn with_no_redirect() -> RequestOption {
    Arc::new(|builder| builder.no_redirect(true))
}

/// Option routing diagnostics to `logger`.
pub fn with_logger(logger: Arc<dyn Logger>) -> RequestOption {
    Arc::new(move |builder| builder.logger(logger.clone()))
}

/// Option shipping audit records to `producer`.
pub fn with_log_producer(producer: Arc<dyn LogProducer>) -> RequestOption {
    Arc::new(move |builder| builder.log_producer(producer.clone()))
}

/// Option attaching a persistent cookie jar.
pub fn with_cookie_jar(jar: Arc<PersistentCookieJar>) -> RequestOption {
    Arc::new(move |builder| builder.cookie_jar(jar.clone()))
}

/// Requests sharing one persistent cookie jar.
#[derive(Clone, Debug)]
pub struct Session {
    jar: Arc<PersistentCookieJar>,
    factory: RequestFactory,
}

impl Session {
    /// Open a session whose cookies live in the JSON file at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::with_jar(Arc::new(PersistentCookieJar::open(path)?)))
    }

    /// Create a session over an existing jar.
    pub fn with_jar(jar: Arc<PersistentCookieJar>) -> Self {
        let factory = RequestFactory::new([with_cookie_jar(jar.clone())]);
        Self { jar, factory }
    }

    /// Add an option applied to every request of this session.
    pub fn option(
        mut self,
        option: impl Fn(RequestBuilder) -> RequestBuilder + Send + Sync + 'static,
    ) -> Self {
        self.factory = self.factory.option(option);
        self
    }

    /// Start a request that loads and saves the session's cookies.
    pub fn request(&self, method: impl Into<String>, url: impl Into<String>) -> RequestBuilder {
        self.factory.request(method, url)
    }

    /// The shared jar.
    pub fn jar(&self) -> &Arc<PersistentCookieJar> {
        &self.jar
    }
}
