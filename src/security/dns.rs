//! Shared DNS answer cache and the resolver seam.
//!
//! # Responsibilities
//! - Resolve hostnames to every A/AAAA address
//! - Reuse answers for a short TTL to bound lookup cost
//! - Bound the cache size, evicting the oldest inserted host first
//! - Serve the same answers to the outbound client's connector
//!
//! # Design Decisions
//! - Only the answer is cached, never a safety verdict
//! - Eviction is insertion-ordered (approximate LRU)
//! - The cache does not filter addresses; the validator does

use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};

use crate::config::DnsCacheConfig;

/// Hostname resolution failure.
#[derive(Debug, thiserror::Error)]
pub enum DnsError {
    #[error("failed to resolve {host}: {source}")]
    Lookup {
        host: String,
        #[source]
        source: io::Error,
    },

    #[error("{host} resolved to no addresses")]
    NoAddresses { host: String },
}

/// Source of DNS answers.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError>;
}

/// Resolver backed by the operating system (`getaddrinfo` via Tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let addrs = tokio::net::lookup_host((host, 0))
            .await
            .map_err(|source| DnsError::Lookup {
                host: host.to_string(),
                source,
            })?;

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        if ips.is_empty() {
            return Err(DnsError::NoAddresses {
                host: host.to_string(),
            });
        }
        Ok(ips)
    }
}

/// A cached DNS answer.
#[derive(Debug, Clone)]
pub struct DnsCacheEntry {
    pub addresses: Vec<IpAddr>,
    pub expires_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, DnsCacheEntry>,
    /// Insertion order, oldest first.
    order: VecDeque<String>,
}

impl CacheState {
    fn forget(&mut self, host: &str) {
        if self.entries.remove(host).is_some() {
            self.order.retain(|h| h != host);
        }
    }
}

/// Process-wide, TTL-bounded and size-bounded map from hostname to addresses.
#[derive(Debug)]
pub struct DnsCache {
    ttl: Duration,
    max_entries: usize,
    state: Mutex<CacheState>,
}

impl DnsCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn from_config(config: &DnsCacheConfig) -> Self {
        Self::new(config.ttl(), config.cache_max_entries)
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fresh addresses for `host`, if any. Expired entries are dropped.
    pub fn get(&self, host: &str) -> Option<Vec<IpAddr>> {
        let mut state = self.state();
        let now = Instant::now();
        let lookup = state
            .entries
            .get(host)
            .map(|entry| (entry.expires_at > now, entry.addresses.clone()));
        match lookup {
            Some((true, addresses)) => Some(addresses),
            Some((false, _)) => {
                state.forget(host);
                None
            }
            None => None,
        }
    }

    /// Store an answer. A zero TTL disables caching.
    pub fn insert(&self, host: &str, addresses: Vec<IpAddr>) {
        if self.ttl.is_zero() {
            return;
        }
        let mut state = self.state();
        state.forget(host);
        state.entries.insert(
            host.to_string(),
            DnsCacheEntry {
                addresses,
                expires_at: Instant::now() + self.ttl,
            },
        );
        state.order.push_back(host.to_string());

        while state.entries.len() > self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            tracing::trace!(host = %oldest, "DNS cache entry evicted");
        }
    }

    pub fn len(&self) -> usize {
        self.state().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state();
        state.entries.clear();
        state.order.clear();
    }
}

/// Resolver that consults the shared cache before asking the underlying
/// resolver. Also plugs into `reqwest` so connections reuse validated answers.
#[derive(Clone)]
pub struct CachingResolver {
    cache: Arc<DnsCache>,
    inner: Arc<dyn HostResolver>,
}

impl CachingResolver {
    pub fn new(cache: Arc<DnsCache>, inner: Arc<dyn HostResolver>) -> Self {
        Self { cache, inner }
    }

    pub fn cache(&self) -> &Arc<DnsCache> {
        &self.cache
    }

    /// Resolve `host`, hitting the cache first.
    pub async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, DnsError> {
        let key = host.to_ascii_lowercase();
        if let Some(addresses) = self.cache.get(&key) {
            tracing::trace!(host = %key, "DNS cache hit");
            return Ok(addresses);
        }

        let addresses = self.inner.lookup(&key).await?;
        if addresses.is_empty() {
            return Err(DnsError::NoAddresses { host: key });
        }
        self.cache.insert(&key, addresses.clone());
        Ok(addresses)
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let this = self.clone();
        Box::pin(async move {
            let ips = this
                .lookup(name.as_str())
                .await
                .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}
