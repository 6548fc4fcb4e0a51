// Response Cache
// Deterministic content-hash caching of analysis responses
//
// Keyed by SHA-256 of (original, generated, sensitivity). Digest collisions
// are treated as hits; the window is negligible for a bounded in-memory
// cache and is documented as an accepted risk.

use crate::models::DiffResponse;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Compute the deterministic cache key for one request fingerprint.
pub fn cache_key(original_text: &str, generated_text: &str, sensitivity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(original_text.as_bytes());
    hasher.update(b"|");
    hasher.update(generated_text.as_bytes());
    hasher.update(b"|");
    hasher.update(sensitivity.as_bytes());
    format!("{:x}", hasher.finalize())
}

struct CacheEntry {
    value: DiffResponse,
    created_at: Instant,
    expires_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    // (key, created_at) in insertion order; stale pairs are skipped on pop
    insertion_order: VecDeque<(String, Instant)>,
    hits: u64,
    misses: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub ttl_secs: u64,
}

/// In-memory cache for analysis responses.
///
/// All operations are O(1) amortized; the interior lock is held only for
/// constant-time sections and never across an await point.
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl ResponseCache {
    pub fn new(ttl_secs: u64, capacity: usize) -> Self {
        info!(
            "[CACHE] initialized: ttl={}s capacity={}",
            ttl_secs, capacity
        );
        Self {
            ttl: Duration::from_secs(ttl_secs),
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                insertion_order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Retrieve a cached response if present and not expired.
    pub fn get(
        &self,
        original_text: &str,
        generated_text: &str,
        sensitivity: &str,
    ) -> Option<DiffResponse> {
        let key = cache_key(original_text, generated_text, sensitivity);
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;

        match inner.entries.get(&key) {
            Some(entry) if now < entry.expires_at => {
                let value = entry.value.clone();
                inner.hits += 1;
                let hit_rate = inner.hits as f64 / (inner.hits + inner.misses) as f64;
                info!(
                    "[CACHE] hit {}... (hit_rate: {:.1}%)",
                    &key[..16],
                    hit_rate * 100.0
                );
                Some(value)
            }
            Some(_) => {
                inner.entries.remove(&key);
                inner.misses += 1;
                debug!("[CACHE] expired {}...", &key[..16]);
                None
            }
            None => {
                inner.misses += 1;
                debug!("[CACHE] miss {}...", &key[..16]);
                None
            }
        }
    }

    /// Store a response under the request fingerprint.
    pub fn put(
        &self,
        original_text: &str,
        generated_text: &str,
        sensitivity: &str,
        value: DiffResponse,
    ) {
        let key = cache_key(original_text, generated_text, sensitivity);
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.entries.len() >= self.capacity {
            Self::evict(&mut inner, self.capacity, now);
        }

        inner.entries.insert(
            key.clone(),
            CacheEntry {
                value,
                created_at: now,
                expires_at: now + self.ttl,
            },
        );
        inner.insertion_order.push_back((key.clone(), now));
        debug!("[CACHE] set {}... (ttl={}s)", &key[..16], self.ttl.as_secs());
    }

    /// Drop expired entries, then oldest-inserted entries until there is
    /// room for one more insert.
    fn evict(inner: &mut CacheInner, capacity: usize, now: Instant) {
        inner.entries.retain(|_, entry| now < entry.expires_at);

        let mut removed = 0usize;
        while inner.entries.len() >= capacity {
            // Oldest-inserted first; skip queue records superseded by a re-put
            match inner.insertion_order.pop_front() {
                Some((key, created_at)) => {
                    let matches = inner
                        .entries
                        .get(&key)
                        .map(|entry| entry.created_at == created_at)
                        .unwrap_or(false);
                    if matches {
                        inner.entries.remove(&key);
                        removed += 1;
                    }
                }
                None => break,
            }
        }

        if removed > 0 {
            info!("[CACHE] evicted {} oldest entries", removed);
        }
    }

    /// Remove expired entries; run periodically by the sweeper task.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *guard;
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| now < entry.expires_at);
        let removed = before - inner.entries.len();
        // Keep the queue bounded alongside the map
        let entries = &inner.entries;
        inner
            .insertion_order
            .retain(|(key, created_at)| match entries.get(key) {
                Some(entry) => entry.created_at == *created_at,
                None => false,
            });
        if removed > 0 {
            info!("[CACHE] sweep removed {} expired entries", removed);
        }
    }

    /// Run `sweep` periodically until the handle is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                cache.sweep();
            }
        })
    }

    /// Drop every entry and reset counters (shutdown).
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let count = inner.entries.len();
        inner.entries.clear();
        inner.insertion_order.clear();
        inner.hits = 0;
        inner.misses = 0;
        info!("[CACHE] cleared {} entries", count);
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let total = inner.hits + inner.misses;
        CacheStats {
            size: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.hits as f64 / total as f64
            },
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic_and_sensitivity_aware() {
        let a = cache_key("orig", "gen", "medium");
        let b = cache_key("orig", "gen", "medium");
        let c = cache_key("orig", "gen", "high");
        let d = cache_key("orig2", "gen", "medium");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_round_trip() {
        let cache = ResponseCache::new(3600, 10);
        assert!(cache.get("o", "g", "medium").is_none());

        cache.put("o", "g", "medium", DiffResponse::no_changes());
        let hit = cache.get("o", "g", "medium").unwrap();
        assert!(hit.summary.is_safe);
        assert_eq!(hit.summary.risk_score, 0);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = ResponseCache::new(3600, 10);
        cache.put("o", "g", "medium", DiffResponse::no_changes());
        {
            let mut inner = cache.inner.lock().unwrap();
            for entry in inner.entries.values_mut() {
                entry.expires_at = Instant::now() - Duration::from_secs(1);
            }
        }
        assert!(cache.get("o", "g", "medium").is_none());
        assert_eq!(cache.stats().size, 0);
    }

    #[test]
    fn test_eviction_removes_oldest_first() {
        let cache = ResponseCache::new(3600, 3);
        cache.put("a", "g", "medium", DiffResponse::no_changes());
        cache.put("b", "g", "medium", DiffResponse::no_changes());
        cache.put("c", "g", "medium", DiffResponse::no_changes());
        // Full: inserting a fourth entry evicts the oldest ("a")
        cache.put("d", "g", "medium", DiffResponse::no_changes());

        assert!(cache.get("a", "g", "medium").is_none());
        assert!(cache.get("c", "g", "medium").is_some());
        assert!(cache.get("d", "g", "medium").is_some());
    }

    #[test]
    fn test_reput_refreshes_entry() {
        let cache = ResponseCache::new(3600, 10);
        cache.put("o", "g", "medium", DiffResponse::no_changes());
        let mut updated = DiffResponse::no_changes();
        updated.summary.risk_score = 25;
        updated.summary.is_safe = false;
        cache.put("o", "g", "medium", updated);

        let hit = cache.get("o", "g", "medium").unwrap();
        assert_eq!(hit.summary.risk_score, 25);
    }

    #[test]
    fn test_sweep_and_clear() {
        let cache = ResponseCache::new(3600, 10);
        cache.put("o", "g", "medium", DiffResponse::no_changes());
        cache.sweep();
        assert_eq!(cache.stats().size, 1);

        cache.clear();
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().hits, 0);
    }
}
