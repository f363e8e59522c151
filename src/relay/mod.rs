//! Outbound relay to tenant endpoints
//!
//! Everything the monitor sends to a tenant goes through a [`Relay`]. The
//! relay forwards a method, target URL, an allow-listed subset of headers and
//! an optional JSON body, and hands back status, content type and raw body.
//! It carries no business logic: status classification is the caller's job.
//! The one thing a relay does interpret is an HTML body where JSON was
//! expected, reported as [`Error::UpstreamProtocol`](crate::Error::UpstreamProtocol).

pub mod direct;
pub mod proxy;
#[cfg(test)]
pub(crate) mod scripted;

pub use direct::DirectRelay;
pub use proxy::ProxyRelay;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::Result;

/// Headers a relay forwards; everything else is dropped
pub const ALLOWED_HEADERS: [&str; 6] = [
    "Authorization",
    "Referer",
    "Cookie",
    "Origin",
    "X-Requested-With",
    "Content-Type",
];

/// One request handed to the relay
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    pub target: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RelayRequest {
    pub fn get(target: Url) -> Self {
        Self {
            method: Method::GET,
            target,
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post(target: Url, body: Value) -> Self {
        Self {
            method: Method::POST,
            target,
            headers: Vec::new(),
            body: Some(body),
        }
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// What came back from the upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl RelayResponse {
    pub fn new(status: u16, content_type: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: content_type.into(),
            body: body.into(),
        }
    }

    /// A JSON response with the given status
    pub fn from_json(status: u16, value: &Value) -> Self {
        Self::new(status, "application/json", value.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_html(&self) -> bool {
        self.content_type.contains("text/html")
    }

    /// Parse the body; an empty body is `null`
    pub fn json(&self) -> Result<Value> {
        if self.body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// The relay contract
#[async_trait]
pub trait Relay: Send + Sync + std::fmt::Debug {
    async fn send(&self, request: RelayRequest) -> Result<RelayResponse>;
}

/// Keep only allow-listed headers
pub fn filter_headers(headers: &[(String, String)]) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| {
            let allowed = ALLOWED_HEADERS
                .iter()
                .any(|a| a.eq_ignore_ascii_case(name));
            if !allowed {
                tracing::debug!("Dropping header {} not on the relay allow-list", name);
            }
            allowed
        })
        .cloned()
        .collect()
}
