//! HTTP service surface.
//!
//! # Responsibilities
//! - Create the Axum router for the proxy API
//! - Wire up middleware (request ID, tracing, timeout, body limit)
//! - Apply auth and query params before handing off to the executor
//! - Pre-check the target for guest callers
//! - Emit one telemetry record per proxied call
//!
//! # Routes
//! - `POST /api/proxy` → normalized result plus timing (always HTTP 200
//!   unless the request itself is malformed)
//! - `POST /api/proxy/check` → safety verdict
//! - `GET /health` → liveness and in-flight count

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use url::Url;

use crate::config::{ListenerConfig, ProxyConfig};
use crate::error::{ErrorCode, ProxyError};
use crate::executor::orchestrator::validation_timed_out;
use crate::executor::{ExecuteOptions, ExecuteRequest, Executor, NetworkTiming};
use crate::http::response::NormalizedResult;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::security::auth::{apply, Auth};
use crate::security::headers::{header_text, RawHeaders};
use crate::security::ssrf::{SafetyVerdict, REASON_UNRESOLVABLE};

pub const X_REQUEST_ID: &str = "x-request-id";

const SUPPORTED_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::PATCH,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub executor: Executor,
}

/// Body of `POST /api/proxy`.
#[derive(Debug, Deserialize)]
pub struct ProxyRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: RawHeaders,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub auth: Auth,
}

/// Reply of `POST /api/proxy`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyResponse {
    #[serde(flatten)]
    pub result: NormalizedResult,
    pub timing: NetworkTiming,
    pub latency_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub url: String,
}

/// HTTP server for the proxy API.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        let executor = Executor::from_config(&config)?;
        Ok(Self::with_executor(config, executor))
    }

    pub fn with_executor(config: ProxyConfig, executor: Executor) -> Self {
        let router = build_router(&config.listener, AppState { executor });
        Self { router, config }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), ProxyError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
pub fn build_router(config: &ListenerConfig, state: AppState) -> Router {
    Router::new()
        .route("/api/proxy", post(proxy_handler))
        .route("/api/proxy/check", post(check_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_request_bytes))
        .layer(RequestBodyLimitLayer::new(config.max_request_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string()
}

fn parse_method(raw: &str) -> Option<Method> {
    let upper = raw.trim().to_ascii_uppercase();
    SUPPORTED_METHODS.into_iter().find(|m| m.as_str() == upper)
}

/// Append `params` to the query of `raw`. Unparsable URLs are returned as-is
/// and left for the validator to reject.
fn merge_params(raw: &str, params: &BTreeMap<String, String>) -> String {
    if params.is_empty() {
        return raw.to_string();
    }
    let Ok(mut url) = Url::parse(raw.trim()) else {
        return raw.to_string();
    };
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in params {
            query.append_pair(key, value);
        }
    }
    url.into()
}

async fn proxy_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProxyRequest>,
) -> Response {
    let started = Instant::now();
    let request_id = request_id(&headers);

    let Some(method) = parse_method(&payload.method) else {
        tracing::debug!(request_id = %request_id, method = %payload.method, "Unsupported method");
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Unsupported HTTP method" })),
        )
            .into_response();
    };

    let params: BTreeMap<String, String> = payload
        .params
        .iter()
        .filter_map(|(k, v)| header_text(v).map(|v| (k.clone(), v)))
        .collect();
    let applied = apply(&payload.auth, payload.headers, params);
    let url = merge_params(&payload.url, &applied.params);

    // One deadline covers the pre-check and the execution.
    let deadline = state.executor.deadline();
    let (result, timing) = match state.executor.check_within(&url, &deadline).await {
        Some(verdict) if verdict.ok => {
            let mut request = ExecuteRequest::new(method.clone(), url).with_headers(applied.headers);
            if let Some(body) = payload.body.filter(|b| !b.is_null()) {
                request = request.with_body(body);
            }
            let execution = state
                .executor
                .execute_within(request, ExecuteOptions::default(), deadline)
                .await;
            (execution.result, execution.timing)
        }
        Some(verdict) => {
            metrics::record_ssrf_block();
            (
                NormalizedResult::from_error(ErrorCode::SsrfBlocked, verdict.reason()),
                NetworkTiming::zero(),
            )
        }
        None => (validation_timed_out(), NetworkTiming::zero()),
    };

    let latency_ms = timing.canonical_latency();
    tracing::info!(
        request_id = %request_id,
        route = "/api/proxy",
        method = %method,
        status = result.status,
        outbound_proxy_ms = timing.outbound_proxy_ms,
        response_receive_ms = timing.response_receive_ms,
        network_ms = timing.network_ms.unwrap_or(f64::NAN),
        total_internal_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Proxy request completed"
    );

    Json(ProxyResponse {
        result,
        timing,
        latency_ms,
    })
    .into_response()
}

/// A lookup that outlives the executor timeout fails closed.
async fn check_handler(
    State(state): State<AppState>,
    Json(payload): Json<CheckRequest>,
) -> Json<SafetyVerdict> {
    let deadline = state.executor.deadline();
    let verdict = state
        .executor
        .check_within(&payload.url, &deadline)
        .await
        .unwrap_or_else(|| SafetyVerdict::deny(REASON_UNRESOLVABLE));
    Json(verdict)
}

async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "inflight": state.executor.limiter().in_flight(),
    }))
}
