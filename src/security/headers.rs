//! Outbound header sanitization.
//!
//! # Responsibilities
//! - Strip hop-by-hop and forwarding headers supplied by the caller
//! - Strip headers the transport computes itself (host, content-length)
//! - Lower-case names, drop empty or null values
//!
//! # Design Decisions
//! - Never trust caller-supplied Host or X-Forwarded-* headers
//! - Header values arrive loosely typed (string, number, bool, null)

use std::collections::BTreeMap;

use serde_json::Value;

/// Caller-supplied headers before sanitization.
pub type RawHeaders = BTreeMap<String, Value>;

/// Headers that are never forwarded from caller input.
pub const STRIPPED_HEADERS: &[&str] = &[
    "host",
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authorization",
    "proxy-authenticate",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "forwarded",
    "x-forwarded-for",
    "x-forwarded-host",
    "x-forwarded-proto",
    "x-real-ip",
    "content-length",
];

pub fn is_stripped(name: &str) -> bool {
    STRIPPED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Render a loosely typed header value as text. `None` means "drop it".
pub fn header_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(header_text)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Produce the header set that may be sent upstream.
pub fn sanitize_headers(raw: &RawHeaders) -> BTreeMap<String, String> {
    let mut clean = BTreeMap::new();
    for (name, value) in raw {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() || is_stripped(&name) {
            continue;
        }
        if let Some(text) = header_text(value) {
            clean.insert(name, text);
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawHeaders {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn strips_transport_and_forwarding_headers() {
        let headers = raw(json!({
            "Host": "internal.service",
            "Content-Length": "999",
            "Connection": "keep-alive",
            "X-Forwarded-For": "10.0.0.1",
            "X-Real-IP": "10.0.0.1",
            "Proxy-Authorization": "Basic abc",
            "Accept": "application/json",
        }));

        let clean = sanitize_headers(&headers);
        assert_eq!(clean.len(), 1);
        assert_eq!(clean.get("accept").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn lower_cases_and_stringifies_values() {
        let headers = raw(json!({
            "X-Retry": 3,
            "X-Debug": true,
            "X-Empty": "",
            "X-Null": null,
            "X-List": ["a", 1],
        }));

        let clean = sanitize_headers(&headers);
        assert_eq!(clean.get("x-retry").map(String::as_str), Some("3"));
        assert_eq!(clean.get("x-debug").map(String::as_str), Some("true"));
        assert_eq!(clean.get("x-list").map(String::as_str), Some("a, 1"));
        assert!(!clean.contains_key("x-empty"));
        assert!(!clean.contains_key("x-null"));
    }

    #[test]
    fn stripping_is_case_insensitive() {
        assert!(is_stripped("HOST"));
        assert!(is_stripped("content-LENGTH"));
        assert!(!is_stripped("authorization"));
    }
}
