//! Server-side cache for DICOMweb metadata responses.
//!
//! Only JSON/text metadata lands here. Pixel payloads are cached by the
//! browser through long-lived `Cache-Control` headers instead.

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};
use lru::LruCache;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Query parameters that carry gateway concerns rather than upstream ones.
pub const PROXY_PARAMS: [&str; 2] = ["token", "clinicId"];

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: Vec<(HeaderName, HeaderValue)>,
    pub body: Bytes,
}

struct Entry {
    response: CachedResponse,
    inserted_at: Instant,
}

/// Capped, TTL-expiring store. Lookups do not refresh recency, so the entry
/// evicted at capacity is always the oldest insertion.
pub struct MetadataCache {
    entries: Mutex<LruCache<String, Entry>>,
    ttl: Duration,
    max_entry_bytes: usize,
}

impl MetadataCache {
    pub fn new(ttl: Duration, max_entries: usize, max_entry_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            ttl,
            max_entry_bytes,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the entry if present and younger than the TTL.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.lock();
        let expired = match entries.peek(key) {
            Some(entry) => entry.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };
        if expired {
            entries.pop(key);
            return None;
        }
        entries.peek(key).map(|e| e.response.clone())
    }

    /// Store a response. Bodies over the per-entry limit are refused.
    pub fn insert(&self, key: String, response: CachedResponse) -> bool {
        if response.body.len() > self.max_entry_bytes {
            tracing::debug!(
                "Not caching {} byte response (limit {})",
                response.body.len(),
                self.max_entry_bytes
            );
            return false;
        }
        let mut entries = self.lock();
        // Re-inserting must count as a fresh insertion for eviction order.
        entries.pop(&key);
        entries.push(
            key,
            Entry {
                response,
                inserted_at: Instant::now(),
            },
        );
        true
    }

    /// Drop everything past its TTL; returns how many entries went.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.inserted_at.elapsed() >= self.ttl)
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        expired.len()
    }

    /// Purge expired entries once per TTL until `shutdown` fires, so idle
    /// keys do not sit in memory until capacity pushes them out.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(cache.ttl.max(Duration::from_secs(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately and there is nothing to purge yet.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = cache.purge_expired();
                        if purged > 0 {
                            tracing::debug!(purged, remaining = cache.len(), "Metadata cache sweep");
                        }
                    }
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Cache key for a request: tenant prefix plus a digest of the normalized
/// path and the upstream-relevant query (gateway params removed, pairs sorted).
pub fn cache_key(clinic_id: Option<&str>, path: &str, query: Option<&str>) -> String {
    let normalized_path = normalize_path(path);

    let mut pairs: Vec<(String, String)> = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .filter(|(k, _)| !PROXY_PARAMS.contains(&k.as_ref()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    pairs.sort();

    let mut hasher = Sha256::new();
    hasher.update(normalized_path.as_bytes());
    for (k, v) in &pairs {
        hasher.update(b"\0");
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    match clinic_id {
        Some(id) => format!("clinic/{}:{}", id, digest),
        None => format!("default:{}", digest),
    }
}

fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}
