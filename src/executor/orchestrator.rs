//! Execution orchestrator.
//!
//! # Responsibilities
//! - Gate every call on the address safety validator
//! - Start the call's deadline before validation, so DNS counts against it
//! - Admit the call through the concurrency limiter under one deadline
//! - Issue the request and drain the response through the outbound client
//! - Time the phases and produce exactly one timing sample per attempt
//! - Funnel every outcome into a [`NormalizedResult`]
//!
//! # Design Decisions
//! - Expected failures are values, never `Err`
//! - No retries; every failure is terminal for one call
//! - The timing sample is part of the return value; callbacks are a thin
//!   adapter over it

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use tokio::time::Instant;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::{DnsCacheConfig, OutboundConfig, ProxyConfig};
use crate::error::{error_chain, ErrorCode, ProxyError, TransportError};
use crate::executor::timing::{millis, NetworkTiming};
use crate::http::client::OutboundClient;
use crate::http::request::{OutboundRequestSpec, RequestBody};
use crate::http::response::{NormalizedResult, ResponseNormalizer};
use crate::observability::metrics;
use crate::resilience::{ConcurrencyLimiter, Deadline, LimiterError};
use crate::security::dns::{HostResolver, SystemResolver};
use crate::security::headers::RawHeaders;
use crate::security::ssrf::{AddressValidator, SafetyVerdict, REASON_INVALID_URL, REASON_SCHEME};

/// One call's request description, already interpolated and auth-applied.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub method: Method,
    pub url: String,
    pub headers: RawHeaders,
    pub body: Option<RequestBody>,
}

impl ExecuteRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: RawHeaders::new(),
            body: None,
        }
    }

    pub fn with_headers(mut self, headers: RawHeaders) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExecuteOptions {
    /// Trusted callers only: skip address validation.
    pub skip_safety_check: bool,
}

/// Outcome of one call.
#[derive(Debug, Clone)]
pub struct Execution {
    pub result: NormalizedResult,
    pub timing: NetworkTiming,
}

/// Entry point of the outbound core.
#[derive(Clone)]
pub struct Executor {
    validator: AddressValidator,
    limiter: ConcurrencyLimiter,
    client: OutboundClient,
    normalizer: ResponseNormalizer,
    timeout: Duration,
}

impl Executor {
    /// Executor resolving through the operating system.
    pub fn new(outbound: &OutboundConfig, dns: &DnsCacheConfig) -> Result<Self, ProxyError> {
        Self::with_resolver(outbound, dns, Arc::new(SystemResolver))
    }

    pub fn from_config(config: &ProxyConfig) -> Result<Self, ProxyError> {
        Self::new(&config.outbound, &config.dns)
    }

    /// Executor with an injected resolver. The validator and the client's
    /// connector share one DNS cache.
    pub fn with_resolver(
        outbound: &OutboundConfig,
        dns: &DnsCacheConfig,
        resolver: Arc<dyn HostResolver>,
    ) -> Result<Self, ProxyError> {
        let validator = AddressValidator::with_resolver(dns, resolver);
        let client = OutboundClient::new(outbound, validator.resolver().clone())?;

        Ok(Self {
            validator,
            limiter: ConcurrencyLimiter::new(outbound.max_inflight),
            client,
            normalizer: ResponseNormalizer::new(outbound.max_error_payload_bytes),
            timeout: outbound.timeout(),
        })
    }

    pub fn validator(&self) -> &AddressValidator {
        &self.validator
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn client(&self) -> &OutboundClient {
        &self.client
    }

    /// A fresh deadline for one call.
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.timeout)
    }

    /// Validate `raw_url` under `deadline`. `None` if the deadline passed
    /// before the verdict was reached.
    pub async fn check_within(&self, raw_url: &str, deadline: &Deadline) -> Option<SafetyVerdict> {
        deadline.run(self.validator.validate(raw_url)).await.ok()
    }

    /// Run one call to completion.
    pub async fn execute(&self, request: ExecuteRequest, options: ExecuteOptions) -> Execution {
        self.execute_within(request, options, self.deadline()).await
    }

    /// Run one call under a deadline the caller already started, so work
    /// done before the call counts against the same timeout.
    pub async fn execute_within(
        &self,
        request: ExecuteRequest,
        options: ExecuteOptions,
        deadline: Deadline,
    ) -> Execution {
        let attempt_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "execute",
            attempt_id = %attempt_id,
            method = %request.method,
        );
        self.run(request, options, deadline).instrument(span).await
    }

    /// Run one call, handing its timing sample to `on_timing` exactly once
    /// before returning.
    pub async fn execute_with<F>(
        &self,
        request: ExecuteRequest,
        options: ExecuteOptions,
        on_timing: F,
    ) -> NormalizedResult
    where
        F: FnOnce(&NetworkTiming),
    {
        let Execution { result, timing } = self.execute(request, options).await;
        on_timing(&timing);
        result
    }

    async fn run(&self, request: ExecuteRequest, options: ExecuteOptions, deadline: Deadline) -> Execution {
        let ExecuteRequest {
            method,
            url,
            headers,
            body,
        } = request;

        if !options.skip_safety_check {
            let Some(verdict) = self.check_within(&url, &deadline).await else {
                return finish(&method, validation_timed_out(), NetworkTiming::zero());
            };
            if !verdict.ok {
                metrics::record_ssrf_block();
                let result = NormalizedResult::from_error(ErrorCode::SsrfBlocked, verdict.reason());
                return finish(&method, result, NetworkTiming::zero());
            }
        }

        let url = match parse_target(&url) {
            Ok(url) => url,
            Err(reason) => {
                let result = NormalizedResult::from_error(ErrorCode::InvalidProtocol, reason);
                return finish(&method, result, NetworkTiming::zero());
            }
        };
        let host = url.host_str().unwrap_or_default().to_string();
        tracing::debug!(host = %host, path = %url.path(), "Executing outbound request");

        let slot = match self.limiter.acquire_until(deadline.instant()).await {
            Ok(slot) => slot,
            Err(e) => {
                let code = match e {
                    LimiterError::DeadlineElapsed => ErrorCode::UpstreamTimeout,
                    LimiterError::Closed => ErrorCode::NetworkError,
                };
                let result = NormalizedResult::from_error(code, e.to_string());
                return finish(&method, result, NetworkTiming::zero());
            }
        };
        metrics::set_inflight(self.limiter.in_flight());

        let spec = OutboundRequestSpec::new(method.clone(), url, &headers, body);
        let (result, timing) = self.exchange(spec, &host, &deadline).await;

        drop(slot);
        metrics::set_inflight(self.limiter.in_flight());
        finish(&method, result, timing)
    }

    /// Send and drain one request while holding an admission slot.
    async fn exchange(
        &self,
        spec: OutboundRequestSpec,
        host: &str,
        deadline: &Deadline,
    ) -> (NormalizedResult, NetworkTiming) {
        let sent = Instant::now();
        let response = match self.client.send(spec, deadline).await {
            Ok(response) => response,
            Err(e) => {
                let elapsed = millis(sent.elapsed());
                let timing = NetworkTiming {
                    outbound_proxy_ms: elapsed,
                    response_receive_ms: 0.0,
                    network_ms: Some(elapsed),
                };
                return (transport_failure(host, e), timing);
            }
        };

        let outbound_proxy_ms = millis(sent.elapsed());
        let received = Instant::now();
        let drained = response.read_body(deadline).await;
        let timing = NetworkTiming {
            outbound_proxy_ms,
            response_receive_ms: millis(received.elapsed()),
            network_ms: Some(millis(sent.elapsed())),
        };

        let result = match drained {
            Ok(reply) => self.normalizer.normalize(reply),
            Err(e) => transport_failure(host, e),
        };
        (result, timing)
    }
}

/// Parse without the safety gate: absolute http(s) URL only.
fn parse_target(raw: &str) -> Result<Url, &'static str> {
    let url = Url::parse(raw.trim()).map_err(|_| REASON_INVALID_URL)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(REASON_SCHEME);
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(REASON_INVALID_URL);
    }
    Ok(url)
}

/// Result for a call whose deadline ran out during address validation.
pub fn validation_timed_out() -> NormalizedResult {
    tracing::warn!("Deadline elapsed while validating the target");
    NormalizedResult::from_error(
        ErrorCode::UpstreamTimeout,
        "deadline elapsed while validating the target",
    )
}

fn transport_failure(host: &str, err: TransportError) -> NormalizedResult {
    // reqwest errors embed the full URL, query string included.
    let err = match err {
        TransportError::Http(e) => TransportError::Http(e.without_url()),
        other => other,
    };
    let code = err.code();
    let detail = error_chain(&err);
    tracing::warn!(host = %host, code = %code, error = %detail, "Outbound request failed");
    NormalizedResult::from_error(code, detail)
}

fn finish(method: &Method, result: NormalizedResult, timing: NetworkTiming) -> Execution {
    let latency_ms = timing.canonical_latency();
    let code = result.error_code().unwrap_or_default();
    metrics::record_execution(method.as_str(), result.status, code, latency_ms);

    tracing::debug!(
        status = result.status,
        code = %code,
        outbound_proxy_ms = timing.outbound_proxy_ms,
        response_receive_ms = timing.response_receive_ms,
        latency_ms,
        "Execution finished"
    );

    Execution { result, timing }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::dns::DnsError;
    use async_trait::async_trait;
    use std::net::IpAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver(Vec<IpAddr>);

    #[async_trait]
    impl HostResolver for FixedResolver {
        async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, DnsError> {
            Ok(self.0.clone())
        }
    }

    fn executor(answer: &str) -> Executor {
        let resolver = Arc::new(FixedResolver(vec![answer.parse().unwrap()]));
        Executor::with_resolver(&OutboundConfig::default(), &DnsCacheConfig::default(), resolver).unwrap()
    }

    #[tokio::test]
    async fn blocked_target_short_circuits() {
        let executor = executor("93.184.216.34");
        let calls = AtomicUsize::new(0);

        let result = executor
            .execute_with(
                ExecuteRequest::new(Method::GET, "http://localhost:9000/internal"),
                ExecuteOptions::default(),
                |timing| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(timing.canonical_latency(), 0);
                },
            )
            .await;

        assert_eq!(result.status, 400);
        assert_eq!(result.error_code(), Some("SSRF_BLOCKED"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(executor.limiter().in_flight(), 0);
    }

    #[tokio::test]
    async fn rebinding_hostname_is_blocked() {
        let executor = executor("10.0.0.7");
        let execution = executor
            .execute(
                ExecuteRequest::new(Method::GET, "https://rebind.example.com/"),
                ExecuteOptions::default(),
            )
            .await;
        assert_eq!(execution.result.error_code(), Some("SSRF_BLOCKED"));
        let data = execution.result.data.as_json().unwrap();
        assert_eq!(data["message"], "Target resolves to a private or reserved IP");
    }

    #[tokio::test]
    async fn skipped_check_still_rejects_bad_scheme() {
        let executor = executor("93.184.216.34");
        let execution = executor
            .execute(
                ExecuteRequest::new(Method::GET, "ftp://files.example.com/a"),
                ExecuteOptions {
                    skip_safety_check: true,
                },
            )
            .await;
        assert_eq!(execution.result.status, 400);
        assert_eq!(execution.result.error_code(), Some("INVALID_PROTOCOL"));
    }

    struct StalledResolver;

    #[async_trait]
    impl HostResolver for StalledResolver {
        async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, DnsError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec!["93.184.216.34".parse().unwrap()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_dns_is_bounded_by_timeout() {
        let outbound = OutboundConfig {
            timeout_ms: 200,
            ..OutboundConfig::default()
        };
        let executor =
            Executor::with_resolver(&outbound, &DnsCacheConfig::default(), Arc::new(StalledResolver)).unwrap();

        let started = Instant::now();
        let execution = executor
            .execute(
                ExecuteRequest::new(Method::GET, "http://slow-dns.example/"),
                ExecuteOptions::default(),
            )
            .await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(execution.result.status, 504);
        assert_eq!(execution.result.error_code(), Some("UPSTREAM_TIMEOUT"));
        assert_eq!(execution.timing.canonical_latency(), 0);
        assert_eq!(executor.limiter().in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn check_within_gives_up_at_deadline() {
        let executor = Executor::with_resolver(
            &OutboundConfig::default(),
            &DnsCacheConfig::default(),
            Arc::new(StalledResolver),
        )
        .unwrap();
        let deadline = Deadline::after(Duration::from_millis(50));
        assert_eq!(executor.check_within("https://slow-dns.example/", &deadline).await, None);

        let literal = executor
            .check_within("https://93.184.216.34/", &Deadline::after(Duration::from_millis(50)))
            .await;
        assert_eq!(literal, Some(SafetyVerdict::allow()));
    }

    #[test]
    fn parse_target_requires_http() {
        assert!(parse_target("http://127.0.0.1:8080/x").is_ok());
        assert_eq!(parse_target("not a url"), Err(REASON_INVALID_URL));
        assert_eq!(parse_target("file:///etc/passwd"), Err(REASON_SCHEME));
    }
}
