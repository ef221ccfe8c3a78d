//! Response normalization.
//!
//! # Responsibilities
//! - Drain the upstream body with a running byte counter
//! - Decode the body by content type (JSON / text / binary)
//! - Wrap upstream errors (>= 400) in a size-capped envelope
//! - Shape transport failures like any other result
//!
//! # Design Decisions
//! - Success, upstream error and transport failure share one shape
//! - Oversized error bodies are replaced by an explicit `omitted` marker
//! - Response headers are passed through verbatim (lower-case names)

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{ErrorCode, TransportError};
use crate::resilience::Deadline;

pub const UPSTREAM_ERROR_MESSAGE: &str = "Upstream responded with error";
pub const ERROR_PAYLOAD_OMITTED_REASON: &str = "Upstream error payload too large";

/// How a body is decoded, chosen from its content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Text,
    Binary,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(raw) = content_type else {
            return BodyKind::Binary;
        };
        let mime = raw
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == "application/json" || mime.ends_with("+json") {
            BodyKind::Json
        } else if mime.starts_with("text/")
            || mime.contains("xml")
            || mime.contains("javascript")
            || mime == "application/x-www-form-urlencoded"
        {
            BodyKind::Text
        } else {
            BodyKind::Binary
        }
    }

    pub fn decode(self, body: Bytes) -> ResponseData {
        if body.is_empty() {
            return ResponseData::Text(String::new());
        }
        match self {
            BodyKind::Json => match serde_json::from_slice(&body) {
                Ok(value) => ResponseData::Json(value),
                Err(_) => ResponseData::Text(String::from_utf8_lossy(&body).into_owned()),
            },
            BodyKind::Text => ResponseData::Text(String::from_utf8_lossy(&body).into_owned()),
            BodyKind::Binary => ResponseData::Binary(body),
        }
    }
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseData {
    Json(Value),
    Text(String),
    /// Serialized as base64 text.
    Binary(Bytes),
}

impl ResponseData {
    pub fn to_value(&self) -> Value {
        match self {
            ResponseData::Json(v) => v.clone(),
            ResponseData::Text(s) => Value::String(s.clone()),
            ResponseData::Binary(b) => Value::String(STANDARD.encode(b)),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ResponseData::Json(v) => Some(v),
            _ => None,
        }
    }

}

impl Serialize for ResponseData {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ResponseData::Json(v) => v.serialize(serializer),
            ResponseData::Text(s) => serializer.serialize_str(s),
            ResponseData::Binary(b) => serializer.serialize_str(&STANDARD.encode(b)),
        }
    }
}

/// Uniform result of one execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResult {
    pub status: u16,
    pub status_text: String,
    pub data: ResponseData,
    pub headers: BTreeMap<String, String>,
}

impl NormalizedResult {
    /// Shape a classified failure.
    pub fn from_error(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            status: code.status(),
            status_text: code.status_text().to_string(),
            data: ResponseData::Json(json!({
                "error": code.message(),
                "code": code,
                "message": detail.into(),
            })),
            headers: BTreeMap::new(),
        }
    }

    /// The `code` field of an error payload, if present.
    pub fn error_code(&self) -> Option<&str> {
        self.data.as_json()?.get("code")?.as_str()
    }

    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

/// A fully drained upstream response.
#[derive(Debug, Clone)]
pub struct UpstreamReply {
    pub status: StatusCode,
    /// Reason phrase as sent, only when it differs from the canonical one.
    pub reason: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// The upstream's reason phrase, else the canonical one, else empty.
pub fn status_text(status: StatusCode, reason: Option<&str>) -> String {
    reason
        .filter(|r| !r.is_empty())
        .or_else(|| status.canonical_reason())
        .unwrap_or_default()
        .to_string()
}

/// Flatten response headers; repeated headers are joined with ", ".
pub fn flatten_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut flat: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    flat
}

/// Drain a body stream, failing once more than `limit` bytes arrive or the
/// deadline passes.
pub async fn collect_body<S, E>(stream: S, limit: usize, deadline: &Deadline) -> Result<Bytes, TransportError>
where
    S: Stream<Item = Result<Bytes, E>>,
    E: Into<TransportError>,
{
    let mut stream = std::pin::pin!(stream);
    let mut received = BytesMut::new();
    loop {
        let next = deadline
            .run(stream.next())
            .await
            .map_err(|_| TransportError::Timeout)?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(Into::into)?;
        if received.len() + chunk.len() > limit {
            return Err(TransportError::ResponseTooLarge { limit });
        }
        received.extend_from_slice(&chunk);
    }
    Ok(received.freeze())
}

/// Turns raw upstream responses into [`NormalizedResult`]s.
#[derive(Debug, Clone, Copy)]
pub struct ResponseNormalizer {
    max_error_payload_bytes: usize,
}

impl ResponseNormalizer {
    pub fn new(max_error_payload_bytes: usize) -> Self {
        Self {
            max_error_payload_bytes,
        }
    }

    pub fn normalize(&self, reply: UpstreamReply) -> NormalizedResult {
        let UpstreamReply {
            status,
            reason,
            headers,
            body,
        } = reply;
        let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
        let kind = BodyKind::from_content_type(content_type);
        let status_text = status_text(status, reason.as_deref());

        let data = if status.as_u16() >= 400 {
            let inner = if body.len() > self.max_error_payload_bytes {
                json!({ "omitted": true, "reason": ERROR_PAYLOAD_OMITTED_REASON })
            } else {
                kind.decode(body).to_value()
            };
            ResponseData::Json(json!({
                "error": UPSTREAM_ERROR_MESSAGE,
                "code": ErrorCode::UpstreamHttpError,
                "status": status.as_u16(),
                "statusText": status_text,
                "data": inner,
            }))
        } else {
            kind.decode(body)
        };

        NormalizedResult {
            status: status.as_u16(),
            status_text,
            data,
            headers: flatten_headers(&headers),
        }
    }
}
