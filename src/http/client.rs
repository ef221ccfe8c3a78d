//! Pooled outbound HTTP client.
//!
//! # Responsibilities
//! - Hold one keep-alive client shared by every execution
//! - Never follow redirects (3xx is handed back to the caller)
//! - Cap request and response body sizes
//! - Bound concurrently open sockets
//!
//! # Design Decisions
//! - DNS goes through the validator's cache so connections reuse the
//!   answers that were checked
//! - Environment proxies are ignored; traffic goes direct to the target
//! - HTTP/1.1 only
//! - A socket slot is held from send until the body is drained or dropped

use std::sync::Arc;
use std::time::Duration;

use hyper::ext::ReasonPhrase;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{redirect, StatusCode};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::OutboundConfig;
use crate::error::{ProxyError, TransportError};
use crate::http::request::OutboundRequestSpec;
use crate::http::response::{collect_body, UpstreamReply};
use crate::resilience::Deadline;
use crate::security::dns::CachingResolver;

const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Shared outbound client with conservative ceilings.
#[derive(Debug, Clone)]
pub struct OutboundClient {
    client: reqwest::Client,
    sockets: Arc<Semaphore>,
    max_sockets: usize,
    max_body_bytes: usize,
}

impl OutboundClient {
    pub fn new(config: &OutboundConfig, resolver: CachingResolver) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(config.timeout())
            .connect_timeout(config.timeout())
            // Per host; the process-wide bound is the socket semaphore.
            .pool_max_idle_per_host(config.max_idle_sockets)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .user_agent(config.user_agent.as_str())
            .http1_only()
            .no_proxy()
            .dns_resolver(Arc::new(resolver))
            .build()
            .map_err(ProxyError::ClientBuild)?;

        tracing::debug!(
            timeout_ms = config.timeout_ms,
            max_sockets = config.max_sockets,
            max_idle_sockets = config.max_idle_sockets,
            max_body_bytes = config.max_body_bytes,
            "Outbound client initialized"
        );

        Ok(Self {
            client,
            sockets: Arc::new(Semaphore::new(config.max_sockets.max(1))),
            max_sockets: config.max_sockets.max(1),
            max_body_bytes: config.max_body_bytes,
        })
    }

    pub fn max_body_bytes(&self) -> usize {
        self.max_body_bytes
    }

    /// Sockets currently in use.
    pub fn open_sockets(&self) -> usize {
        self.max_sockets - self.sockets.available_permits()
    }

    fn header_map(spec: &OutboundRequestSpec) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(spec.headers.len());
        for (name, value) in &spec.headers {
            let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) else {
                tracing::debug!(header = %name, "Skipping header that is not valid on the wire");
                continue;
            };
            map.insert(name, value);
        }
        map
    }

    /// Send the request and wait for the response head.
    pub async fn send(
        &self,
        spec: OutboundRequestSpec,
        deadline: &Deadline,
    ) -> Result<UpstreamResponse, TransportError> {
        if spec.body_len() > self.max_body_bytes {
            return Err(TransportError::RequestTooLarge {
                size: spec.body_len(),
                limit: self.max_body_bytes,
            });
        }

        let socket = deadline
            .run(Arc::clone(&self.sockets).acquire_owned())
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|_| TransportError::PoolClosed)?;

        let headers = Self::header_map(&spec);
        let mut builder = self
            .client
            .request(spec.method, spec.url)
            .headers(headers)
            .timeout(deadline.remaining());
        if let Some(body) = spec.body {
            builder = builder.body(body);
        }
        let request = builder.build()?;

        let response = deadline
            .run(self.client.execute(request))
            .await
            .map_err(|_| TransportError::Timeout)??;

        Ok(UpstreamResponse {
            response,
            max_body_bytes: self.max_body_bytes,
            _socket: socket,
        })
    }
}

/// Response head plus the not-yet-read body.
#[derive(Debug)]
pub struct UpstreamResponse {
    response: reqwest::Response,
    max_body_bytes: usize,
    _socket: OwnedSemaphorePermit,
}

impl UpstreamResponse {
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// Reason phrase from the status line. Only present when the upstream
    /// sent something other than the canonical phrase.
    pub fn reason(&self) -> Option<String> {
        self.response
            .extensions()
            .get::<ReasonPhrase>()
            .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
    }

    /// Drain the body under the size cap and the deadline.
    pub async fn read_body(self, deadline: &Deadline) -> Result<UpstreamReply, TransportError> {
        let limit = self.max_body_bytes;
        if let Some(declared) = self.response.content_length() {
            if declared > limit as u64 {
                return Err(TransportError::ResponseTooLarge { limit });
            }
        }

        let status = self.response.status();
        let reason = self.reason();
        let headers = self.response.headers().clone();
        let body = collect_body(self.response.bytes_stream(), limit, deadline).await?;
        Ok(UpstreamReply {
            status,
            reason,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DnsCacheConfig;
    use crate::security::dns::{DnsCache, SystemResolver};
    use crate::security::headers::RawHeaders;
    use reqwest::Method;
    use serde_json::json;

    fn client(max_body_bytes: usize) -> OutboundClient {
        let config = OutboundConfig {
            max_body_bytes,
            ..OutboundConfig::default()
        };
        let cache = Arc::new(DnsCache::from_config(&DnsCacheConfig::default()));
        OutboundClient::new(&config, CachingResolver::new(cache, Arc::new(SystemResolver))).unwrap()
    }

    #[tokio::test]
    async fn oversized_request_body_is_rejected_before_connecting() {
        let client = client(4);
        let spec = OutboundRequestSpec::new(
            Method::POST,
            url::Url::parse("http://127.0.0.1:9/").unwrap(),
            &RawHeaders::new(),
            Some(b"12345".to_vec().into()),
        );
        let deadline = Deadline::after(Duration::from_secs(1));
        let err = client.send(spec, &deadline).await.unwrap_err();
        assert!(matches!(err, TransportError::RequestTooLarge { size: 5, limit: 4 }));
        assert_eq!(client.open_sockets(), 0);
    }

    #[test]
    fn invalid_header_values_are_skipped() {
        let mut raw = RawHeaders::new();
        raw.insert("x-ok".into(), json!("fine"));
        raw.insert("x-bad".into(), json!("line\nbreak"));
        let spec = OutboundRequestSpec::new(
            Method::GET,
            url::Url::parse("http://example.com/").unwrap(),
            &raw,
            None,
        );
        let map = OutboundClient::header_map(&spec);
        assert_eq!(map.get("x-ok").unwrap(), "fine");
        assert!(map.get("x-bad").is_none());
    }
}
