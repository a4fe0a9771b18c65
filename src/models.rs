//! Request/response descriptors for the REST surface.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// HTTP methods the engine accepts.
pub const PERMITTED_METHODS: &[&str] =
    &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Inbound request descriptor.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyRequest {
    /// HTTP method; validated against [`PERMITTED_METHODS`].
    pub method: String,
    /// Absolute target URL (http or https).
    pub url: String,
    /// Header overrides; last write wins, empty value suppresses.
    #[serde(default)]
    pub headers: Option<HashMap<String, String>>,
    /// JSON value or raw string body.
    #[serde(default)]
    pub body: Option<Value>,
    /// Registered session handle; omit for an ephemeral session.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Upstream proxy URL (http, https, or socks5).
    #[serde(default)]
    pub proxy: Option<String>,
}

/// A response header value; Set-Cookie and friends may repeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    Single(String),
    Multi(Vec<String>),
}

/// Outbound response descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyResponse {
    pub status_code: u16,
    pub headers: BTreeMap<String, HeaderValue>,
    pub body: Value,
    pub session_id: Option<String>,
    pub elapsed_ms: f64,
    pub redirect_count: u32,
    /// URLs traversed before the final one; empty when no redirect occurred.
    pub redirect_chain: Vec<String>,
    pub final_url: String,
}

/// Collapse raw `Name: value` header lines into the response header map,
/// preserving arrival order within repeated names.
pub fn header_map(lines: &[String]) -> BTreeMap<String, HeaderValue> {
    use std::collections::btree_map::Entry;

    let mut map: BTreeMap<String, HeaderValue> = BTreeMap::new();
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_string();
        let value = value.trim().to_string();
        match map.entry(name) {
            Entry::Vacant(slot) => {
                slot.insert(HeaderValue::Single(value));
            }
            Entry::Occupied(mut slot) => {
                let current = slot.get_mut();
                match current {
                    HeaderValue::Single(first) => {
                        let first = std::mem::take(first);
                        *current = HeaderValue::Multi(vec![first, value]);
                    }
                    HeaderValue::Multi(values) => values.push(value),
                }
            }
        }
    }
    map
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreateResponse {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDeleteResponse {
    pub session_id: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCookiesResponse {
    pub session_id: String,
    pub cookies: HashMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub active_sessions: usize,
    pub max_sessions: usize,
}

/// Error envelope: `{"error": "<short code>", "detail": "<message>"}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    pub detail: String,
}
