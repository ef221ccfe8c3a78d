//! Error taxonomy and transport failure classification.
//!
//! Every expected failure of an execution maps to one [`ErrorCode`] with a
//! fixed HTTP status. The executor turns codes into a normalized result; none
//! of these escape to the caller as `Err`.

use std::error::Error as StdError;
use std::fmt;
use std::io;

use serde::Serialize;

use crate::config::ConfigError;
use crate::security::dns::DnsError;

/// Stable machine-readable failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Target failed safety validation; never attempted.
    SsrfBlocked,
    /// Non-HTTP(S) scheme or malformed URL.
    InvalidProtocol,
    DnsResolutionFailed,
    ConnectionRefused,
    UpstreamTimeout,
    NetworkUnreachable,
    /// Catch-all transport failure.
    NetworkError,
    /// Upstream answered with status >= 400. The proxy operation itself
    /// succeeded; the status carried is the upstream's.
    UpstreamHttpError,
    /// Streamed response body exceeded the configured cap.
    ResponseTooLarge,
    /// Request body exceeded the configured cap; nothing was sent.
    RequestTooLarge,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SsrfBlocked => "SSRF_BLOCKED",
            ErrorCode::InvalidProtocol => "INVALID_PROTOCOL",
            ErrorCode::DnsResolutionFailed => "DNS_RESOLUTION_FAILED",
            ErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorCode::NetworkUnreachable => "NETWORK_UNREACHABLE",
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::UpstreamHttpError => "UPSTREAM_HTTP_ERROR",
            ErrorCode::ResponseTooLarge => "RESPONSE_TOO_LARGE",
            ErrorCode::RequestTooLarge => "REQUEST_TOO_LARGE",
        }
    }

    /// HTTP status reported for this failure.
    pub fn status(&self) -> u16 {
        match self {
            ErrorCode::SsrfBlocked | ErrorCode::InvalidProtocol => 400,
            ErrorCode::RequestTooLarge => 413,
            ErrorCode::UpstreamTimeout => 504,
            ErrorCode::DnsResolutionFailed
            | ErrorCode::ConnectionRefused
            | ErrorCode::NetworkUnreachable
            | ErrorCode::NetworkError
            | ErrorCode::UpstreamHttpError
            | ErrorCode::ResponseTooLarge => 502,
        }
    }

    pub fn status_text(&self) -> &'static str {
        match self.status() {
            400 => "Bad Request",
            413 => "Payload Too Large",
            504 => "Gateway Timeout",
            _ => "Bad Gateway",
        }
    }

    /// Human-readable summary.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::SsrfBlocked => "Target URL is not allowed",
            ErrorCode::InvalidProtocol => "Invalid or unsupported URL protocol",
            ErrorCode::DnsResolutionFailed => "DNS resolution failed",
            ErrorCode::ConnectionRefused => "Connection refused by upstream",
            ErrorCode::UpstreamTimeout => "Upstream request timed out",
            ErrorCode::NetworkUnreachable => "Upstream network is unreachable",
            ErrorCode::NetworkError => "Network error while contacting upstream",
            ErrorCode::UpstreamHttpError => "Upstream responded with error",
            ErrorCode::ResponseTooLarge => "Upstream response exceeded the size limit",
            ErrorCode::RequestTooLarge => "Request body exceeds the size limit",
        }
    }

    /// Map a conventional socket/transport error code (`ECONNREFUSED`,
    /// `ENOTFOUND`, ...) to the taxonomy.
    pub fn from_transport_code(code: &str) -> ErrorCode {
        match code.trim().to_ascii_uppercase().as_str() {
            "ENOTFOUND" | "EAI_AGAIN" | "EAI_NONAME" | "EAI_FAIL" => ErrorCode::DnsResolutionFailed,
            "ECONNREFUSED" => ErrorCode::ConnectionRefused,
            "ETIMEDOUT" | "ECONNABORTED" | "ESOCKETTIMEDOUT" | "ERR_CANCELED" => {
                ErrorCode::UpstreamTimeout
            }
            "EHOSTUNREACH" | "ENETUNREACH" | "ENETDOWN" | "EHOSTDOWN" => {
                ErrorCode::NetworkUnreachable
            }
            "ERR_INVALID_PROTOCOL" | "ERR_INVALID_URL" => ErrorCode::InvalidProtocol,
            "ERR_RESPONSE_TOO_LARGE" | "ERR_FR_MAX_CONTENT_LENGTH_EXCEEDED" => {
                ErrorCode::ResponseTooLarge
            }
            "ERR_FR_MAX_BODY_LENGTH_EXCEEDED" => ErrorCode::RequestTooLarge,
            _ => ErrorCode::NetworkError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Library-level errors (construction and configuration). Execution failures
/// are not represented here.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("failed to build outbound client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Failure of one upstream exchange.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("deadline elapsed before the exchange completed")]
    Timeout,

    #[error("response body exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },

    #[error("request body of {size} bytes exceeds {limit} bytes")]
    RequestTooLarge { size: usize, limit: usize },

    #[error("outbound socket pool closed")]
    PoolClosed,

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TransportError::Timeout => ErrorCode::UpstreamTimeout,
            TransportError::ResponseTooLarge { .. } => ErrorCode::ResponseTooLarge,
            TransportError::RequestTooLarge { .. } => ErrorCode::RequestTooLarge,
            TransportError::PoolClosed => ErrorCode::NetworkError,
            TransportError::Http(e) => classify_reqwest(e),
        }
    }
}

fn classify_io(err: &io::Error) -> Option<ErrorCode> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => Some(ErrorCode::ConnectionRefused),
        io::ErrorKind::TimedOut => Some(ErrorCode::UpstreamTimeout),
        io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
            Some(ErrorCode::NetworkUnreachable)
        }
        _ => None,
    }
}

fn classify_text(text: &str) -> ErrorCode {
    let text = text.to_ascii_lowercase();
    if text.contains("dns error") || text.contains("failed to lookup address") {
        ErrorCode::DnsResolutionFailed
    } else if text.contains("connection refused") {
        ErrorCode::ConnectionRefused
    } else if text.contains("unreachable") {
        ErrorCode::NetworkUnreachable
    } else if text.contains("timed out") {
        ErrorCode::UpstreamTimeout
    } else if text.contains("url scheme") || text.contains("builder error") {
        ErrorCode::InvalidProtocol
    } else {
        ErrorCode::NetworkError
    }
}

/// Render an error and its whole source chain on one line.
pub fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        let rendered = inner.to_string();
        if !text.contains(&rendered) {
            text.push_str(": ");
            text.push_str(&rendered);
        }
        source = inner.source();
    }
    text
}

/// Classify a `reqwest` failure by its flags and source chain.
pub fn classify_reqwest(err: &reqwest::Error) -> ErrorCode {
    if err.is_timeout() {
        return ErrorCode::UpstreamTimeout;
    }
    if err.is_builder() {
        return ErrorCode::InvalidProtocol;
    }

    let mut source = err.source();
    while let Some(inner) = source {
        if inner.downcast_ref::<DnsError>().is_some() {
            return ErrorCode::DnsResolutionFailed;
        }
        if let Some(code) = inner.downcast_ref::<io::Error>().and_then(classify_io) {
            return code;
        }
        source = inner.source();
    }

    classify_text(&error_chain(err))
}
