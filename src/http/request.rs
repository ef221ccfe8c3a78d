//! Outbound request description.
//!
//! # Responsibilities
//! - Carry caller body variants (text, raw bytes, JSON)
//! - Build the immutable request description handed to the outbound client
//! - Sanitize headers on the way in
//!
//! # Design Decisions
//! - Built once per execution and never mutated
//! - JSON bodies default their content type; text and bytes do not

use std::collections::BTreeMap;

use bytes::Bytes;
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::security::headers::{sanitize_headers, RawHeaders};

/// Caller-supplied request body.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Bytes(Bytes),
    Json(Value),
}

impl RequestBody {
    /// Encoded bytes plus the content type implied by the variant.
    fn encode(self) -> (Bytes, Option<&'static str>) {
        match self {
            RequestBody::Text(s) => (Bytes::from(s), None),
            RequestBody::Bytes(b) => (b, None),
            RequestBody::Json(v) => (Bytes::from(v.to_string()), Some("application/json")),
        }
    }
}

impl From<Value> for RequestBody {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => RequestBody::Text(s),
            other => RequestBody::Json(other),
        }
    }
}

impl From<String> for RequestBody {
    fn from(value: String) -> Self {
        RequestBody::Text(value)
    }
}

impl From<&str> for RequestBody {
    fn from(value: &str) -> Self {
        RequestBody::Text(value.to_string())
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(value: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(value))
    }
}

/// Immutable input to the outbound client.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequestSpec {
    pub method: Method,
    pub url: Url,
    /// Sanitized, lower-case header names.
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
}

impl OutboundRequestSpec {
    pub fn new(method: Method, url: Url, raw_headers: &RawHeaders, body: Option<RequestBody>) -> Self {
        let mut headers = sanitize_headers(raw_headers);

        let body = if method == Method::GET || method == Method::HEAD {
            None
        } else {
            body.map(|body| {
                let (bytes, implied_type) = body.encode();
                if let Some(content_type) = implied_type {
                    headers
                        .entry("content-type".to_string())
                        .or_insert_with(|| content_type.to_string());
                }
                bytes
            })
        };

        Self {
            method,
            url,
            headers,
            body,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.as_ref().map_or(0, Bytes::len)
    }
}
