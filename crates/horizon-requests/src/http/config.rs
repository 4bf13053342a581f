//! Transport settings shared by many requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Transport settings applied to a request before it is built.
///
/// Usually loaded from an application's configuration file and handed to
/// [`RequestFactory::from_config`](super::RequestFactory::from_config).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Overall request timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Skip TLS certificate verification.
    pub ignore_ssl: bool,
    /// Follow redirects. When disabled the redirect response itself is returned.
    pub follow_redirects: bool,
    /// Headers added to every request, in order.
    pub default_headers: Vec<(String, String)>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: None,
            ignore_ssl: false,
            follow_redirects: true,
            default_headers: Vec::new(),
        }
    }
}

impl RequestConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Skip TLS certificate verification.
    ///
    /// # Warning
    ///
    /// This is insecure and should only be used for testing.
    pub fn with_ignore_ssl(mut self) -> Self {
        self.ignore_ssl = true;
        self
    }

    /// Return redirect responses instead of following them.
    pub fn with_no_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }

    /// Add a default header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RequestConfig::default();
        assert_eq!(config.timeout, None);
        assert!(!config.ignore_ssl);
        assert!(config.follow_redirects);
        assert!(config.default_headers.is_empty());
    }

    #[test]
    fn test_builder_pattern() {
        let config = RequestConfig::new()
            .with_timeout(Duration::from_secs(15))
            .with_ignore_ssl()
            .with_no_redirects()
            .with_header("User-Agent", "horizon");

        assert_eq!(config.timeout, Some(Duration::from_secs(15)));
        assert!(config.ignore_ssl);
        assert!(!config.follow_redirects);
        assert_eq!(
            config.default_headers,
            vec![("User-Agent".to_string(), "horizon".to_string())]
        );
    }

    #[test]
    fn test_partial_config_deserializes_with_defaults() {
        let config: RequestConfig = serde_json::from_value(serde_json::json!({
            "timeout": {"secs": 3, "nanos": 0},
            "follow_redirects": false
        }))
        .expect("deserialize");

        assert_eq!(config.timeout, Some(Duration::from_secs(3)));
        assert!(!config.follow_redirects);
        assert!(!config.ignore_ssl);
    }
}
