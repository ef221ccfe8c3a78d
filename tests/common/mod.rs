//! Shared utilities for integration tests: raw-TCP mock upstreams.

#![allow(dead_code)]

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use outbound_proxy::config::{DnsCacheConfig, OutboundConfig};
use outbound_proxy::security::{DnsError, HostResolver};
use outbound_proxy::Executor;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;

/// A request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub head: String,
    pub body: Vec<u8>,
    pub arrived_at: Instant,
}

impl RecordedRequest {
    /// Request line, e.g. `POST /path HTTP/1.1`.
    pub fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    /// All values of header `name` (case-insensitive).
    pub fn header_values(&self, name: &str) -> Vec<String> {
        self.head
            .lines()
            .skip(1)
            .filter_map(|line| line.split_once(':'))
            .filter(|(n, _)| n.trim().eq_ignore_ascii_case(name))
            .map(|(_, v)| v.trim().to_string())
            .collect()
    }

    pub fn header(&self, name: &str) -> Option<String> {
        self.header_values(name).into_iter().next()
    }
}

/// What the mock writes back.
#[derive(Debug, Clone)]
pub struct MockReply {
    pub delay: Duration,
    pub bytes: Vec<u8>,
    /// Keep the socket open without answering.
    pub hang: bool,
}

impl MockReply {
    pub fn raw(bytes: Vec<u8>) -> Self {
        Self {
            delay: Duration::ZERO,
            bytes,
            hang: false,
        }
    }

    pub fn hang() -> Self {
        Self {
            delay: Duration::ZERO,
            bytes: Vec::new(),
            hang: true,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Build a complete `HTTP/1.1` response with a content length.
pub fn response(status: u16, reason: &str, content_type: Option<&str>, body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
    if let Some(ct) = content_type {
        head.push_str(&format!("Content-Type: {ct}\r\n"));
    }
    head.push_str("\r\n");
    let mut bytes = head.into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// Build a response whose body is delimited by connection close.
pub fn response_without_length(content_type: &str, body: &[u8]) -> Vec<u8> {
    let mut bytes =
        format!("HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nConnection: close\r\n\r\n").into_bytes();
    bytes.extend_from_slice(body);
    bytes
}

/// A running mock upstream on 127.0.0.1.
pub struct Upstream {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a programmable mock upstream.
pub async fn start_upstream<F>(handler: F) -> Upstream
where
    F: Fn(&RecordedRequest) -> MockReply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let handler = Arc::new(handler);

    {
        let accepted = Arc::clone(&accepted);
        let requests = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accepted.fetch_add(1, Ordering::SeqCst);
                let handler = Arc::clone(&handler);
                let requests = Arc::clone(&requests);
                tokio::spawn(async move {
                    serve_one(socket, handler.as_ref(), &requests).await;
                });
            }
        });
    }

    Upstream {
        addr,
        accepted,
        requests,
    }
}

/// Upstream that always answers with `bytes`.
pub async fn start_fixed_upstream(bytes: Vec<u8>) -> Upstream {
    start_upstream(move |_| MockReply::raw(bytes.clone())).await
}

async fn serve_one<F>(mut socket: TcpStream, handler: &F, requests: &Mutex<Vec<RecordedRequest>>)
where
    F: Fn(&RecordedRequest) -> MockReply,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().unwrap().push(request.clone());

    let reply = handler(&request);
    if reply.hang {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        return;
    }
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let _ = socket.write_all(&reply.bytes).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = find(&buf, b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    let arrived_at = Instant::now();

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(n, _)| n.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        head,
        body,
        arrived_at,
    })
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// A loopback address with nothing listening on it.
pub async fn closed_port_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Outbound settings tuned for fast tests.
pub fn test_outbound() -> OutboundConfig {
    OutboundConfig {
        timeout_ms: 2_000,
        ..OutboundConfig::default()
    }
}

pub fn executor(outbound: &OutboundConfig) -> Executor {
    Executor::new(outbound, &DnsCacheConfig::default()).unwrap()
}

/// Resolver that answers a public address after three seconds.
pub struct SlowResolver;

#[async_trait]
impl HostResolver for SlowResolver {
    async fn lookup(&self, _host: &str) -> Result<Vec<IpAddr>, DnsError> {
        tokio::time::sleep(Duration::from_secs(3)).await;
        Ok(vec!["93.184.216.34".parse().unwrap()])
    }
}

pub fn slow_dns_executor(outbound: &OutboundConfig) -> Executor {
    Executor::with_resolver(outbound, &DnsCacheConfig::default(), Arc::new(SlowResolver)).unwrap()
}
