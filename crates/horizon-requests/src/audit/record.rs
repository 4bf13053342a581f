//! The audit record wire format.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of the request an audit record describes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum RequestMessageType {
    /// Direction not known.
    #[default]
    Unknown,
    /// A request received by this process.
    Inbound,
    /// A request issued by this process.
    Outbound,
}

impl From<RequestMessageType> for u8 {
    fn from(kind: RequestMessageType) -> Self {
        match kind {
            RequestMessageType::Unknown => 0,
            RequestMessageType::Inbound => 1,
            RequestMessageType::Outbound => 2,
        }
    }
}

impl From<u8> for RequestMessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Inbound,
            2 => Self::Outbound,
            _ => Self::Unknown,
        }
    }
}

/// Snapshot of one request/response cycle, as shipped to a log producer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Request method.
    pub method: String,
    /// Resolved request URL, including merged query parameters.
    pub url: String,

    /// Request body as text.
    pub request_body: String,
    /// Request headers, each name mapped to all of its values.
    pub request_header: BTreeMap<String, Vec<String>>,
    /// When the request was handed to the transport.
    pub request_time: DateTime<Utc>,

    /// Response body as text; empty unless the body was read before dispatch.
    pub response_body: String,
    /// Response headers, each name mapped to all of its values.
    pub response_header: BTreeMap<String, Vec<String>>,
    /// Response status code, `0` without a response.
    pub response_state_code: u16,
    /// When the transport returned.
    pub response_time: DateTime<Utc>,

    /// Milliseconds between `request_time` and `response_time`.
    pub time_consuming: i64,
    /// Text of the error captured so far, empty on success.
    pub error_message: String,

    /// Correlation identifier.
    pub log_id: String,
    /// Always [`RequestMessageType::Outbound`] for records built by a request.
    pub request_type: RequestMessageType,
}

impl AuditRecord {
    /// Serialize the record to its JSON wire form.
    pub fn to_json(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// First value recorded for a request header, matched case-insensitively.
    pub fn request_header_value(&self, name: &str) -> Option<&str> {
        self.request_header
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

/// Flatten a header map into `name -> [values]`, preserving value order.
///
/// Values that are not valid UTF-8 are rendered lossily.
pub fn header_values(headers: &http::HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        map.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    map
}
