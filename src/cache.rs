//! Response cache keyed by the raw query minus its transaction ID.
//!
//! Entries expire lazily: `lookup` never checks age, and stale entries keep
//! being served until the next `sweep` removes them. The TTL counts from
//! insertion, not from last use.
//!
//! The key is the query from byte 2 onward, so it includes the header flags
//! and the full question. Queries that differ only in transaction ID share
//! an entry. The key is compared as raw bytes and is never decoded, so any
//! two queries whose bytes after the ID are identical share one entry; the
//! scheme is kept exactly as observed and not split by record type.

use rustc_hash::FxHashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::dns;

/// Default time an entry stays eligible before a sweep drops it.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60);

struct CacheEntry {
    response: Vec<u8>,
    inserted_at: Instant,
}

/// Memory-only cache of upstream responses.
pub struct ResponseCache {
    entries: RwLock<FxHashMap<Vec<u8>, CacheEntry>>,
    ttl: Duration,
}

/// Cache key for a query: everything after the transaction ID.
pub fn cache_key(query: &[u8]) -> &[u8] {
    query.get(2..).unwrap_or(&[])
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(FxHashMap::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a cached response for `query`.
    ///
    /// The stored response is returned with its transaction ID replaced by
    /// the one in `query`.
    pub fn lookup(&self, query: &[u8]) -> Option<Vec<u8>> {
        let Ok(entries) = self.entries.read() else {
            warn!("Response cache lock poisoned, skipping lookup");
            return None;
        };
        let entry = entries.get(cache_key(query))?;

        let tail = entry.response.get(2..).unwrap_or(&[]);
        let mut response = Vec::with_capacity(2 + tail.len());
        response.extend_from_slice(&dns::transaction_id(query));
        response.extend_from_slice(tail);
        Some(response)
    }

    /// Store `response` for `query`, replacing any previous entry.
    pub fn insert(&self, query: &[u8], response: &[u8]) {
        self.insert_at(query, response, Instant::now());
    }

    /// Store `response` for `query` as if inserted at `now`.
    pub fn insert_at(&self, query: &[u8], response: &[u8], now: Instant) {
        let Ok(mut entries) = self.entries.write() else {
            warn!("Response cache lock poisoned, dropping insert");
            return;
        };

        entries.insert(
            cache_key(query).to_vec(),
            CacheEntry {
                response: response.to_vec(),
                inserted_at: now,
            },
        );
    }

    /// Drop every entry whose age at `now` is at least the TTL.
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let Ok(mut entries) = self.entries.write() else {
            warn!("Response cache lock poisoned, skipping sweep");
            return 0;
        };

        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| now.saturating_duration_since(entry.inserted_at) < ttl);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::tests::build_query;
    use std::sync::Arc;

    fn fake_response(query: &[u8], ip: [u8; 4]) -> Vec<u8> {
        let mut response = query.to_vec();
        response[2] = 0x81;
        response[3] = 0x80;
        response[7] = 0x01;
        response.extend_from_slice(&[0xC0, 0x0C, 0, 1, 0, 1, 0, 0, 1, 0x2C, 0, 4]);
        response.extend_from_slice(&ip);
        response
    }

    #[test]
    fn cache_key_strips_transaction_id() {
        let a = build_query(0x0001, "example.com");
        let b = build_query(0xFFFF, "example.com");

        assert_eq!(cache_key(&a), cache_key(&b));
        assert_eq!(cache_key(&a), &a[2..]);
    }

    fn poison(cache: &ResponseCache) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = cache.entries.write().unwrap();
            panic!("poison the cache lock");
        }));
        assert!(result.is_err());
        assert!(cache.entries.is_poisoned());
    }

    #[test]
    fn with_ttl_sets_ttl() {
        assert_eq!(ResponseCache::new().ttl(), DEFAULT_CACHE_TTL);
        assert_eq!(
            ResponseCache::with_ttl(Duration::from_secs(5)).ttl(),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn poisoned_lock_degrades_to_misses() {
        let cache = ResponseCache::new();
        let query = build_query(1, "example.com");
        poison(&cache);

        cache.insert(&query, &fake_response(&query, [1, 1, 1, 1]));

        assert!(cache.lookup(&query).is_none());
        assert_eq!(cache.sweep(Instant::now() + Duration::from_secs(120)), 0);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn lookup_miss_on_empty_cache() {
        let cache = ResponseCache::new();

        assert!(cache.lookup(&build_query(1, "example.com")).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_rewrites_transaction_id() {
        let cache = ResponseCache::new();
        let first = build_query(0x1111, "example.com");
        let response = fake_response(&first, [93, 184, 216, 34]);
        cache.insert(&first, &response);

        let second = build_query(0x2222, "example.com");
        let hit = cache.lookup(&second).expect("cache hit");

        assert_eq!(&hit[0..2], &[0x22, 0x22]);
        assert_eq!(&hit[2..], &response[2..]);
    }

    #[test]
    fn different_names_do_not_collide() {
        let cache = ResponseCache::new();
        let a = build_query(1, "a.example.com");
        cache.insert(&a, &fake_response(&a, [1, 1, 1, 1]));

        assert!(cache.lookup(&build_query(1, "b.example.com")).is_none());
    }

    #[test]
    fn insert_overwrites_previous_entry() {
        let cache = ResponseCache::new();
        let query = build_query(1, "example.com");
        cache.insert(&query, &fake_response(&query, [1, 1, 1, 1]));
        cache.insert(&query, &fake_response(&query, [2, 2, 2, 2]));

        let hit = cache.lookup(&query).expect("cache hit");
        assert_eq!(&hit[hit.len() - 4..], &[2, 2, 2, 2]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_are_served_until_swept() {
        let cache = ResponseCache::new();
        let query = build_query(1, "example.com");
        let t = Instant::now();
        cache.insert_at(&query, &fake_response(&query, [1, 1, 1, 1]), t);

        assert_eq!(cache.sweep(t + Duration::from_secs(59)), 0);
        assert!(cache.lookup(&query).is_some());

        assert_eq!(cache.sweep(t + Duration::from_secs(61)), 1);
        assert!(cache.lookup(&query).is_none());
    }

    #[test]
    fn sweep_removes_at_exact_ttl() {
        let cache = ResponseCache::with_ttl(Duration::from_secs(10));
        let query = build_query(1, "example.com");
        let t = Instant::now();
        cache.insert_at(&query, &fake_response(&query, [1, 1, 1, 1]), t);

        assert_eq!(cache.sweep(t + Duration::from_secs(10)), 1);
    }

    #[test]
    fn sweep_keeps_fresh_entries() {
        let cache = ResponseCache::new();
        let old = build_query(1, "old.example.com");
        let fresh = build_query(1, "fresh.example.com");
        let t = Instant::now();
        cache.insert_at(&old, &fake_response(&old, [1, 1, 1, 1]), t);
        cache.insert_at(&fresh, &fake_response(&fresh, [2, 2, 2, 2]), t + Duration::from_secs(30));

        assert_eq!(cache.sweep(t + Duration::from_secs(61)), 1);
        assert!(cache.lookup(&old).is_none());
        assert!(cache.lookup(&fresh).is_some());
    }

    #[test]
    fn concurrent_access_never_tears_entries() {
        let cache = Arc::new(ResponseCache::new());
        let domains = ["a.example.com", "b.example.com", "c.example.com"];

        let handles: Vec<_> = (0..8u16)
            .map(|worker| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..500u16 {
                        let domain = domains[(worker + i) as usize % domains.len()];
                        let query = build_query(worker, domain);
                        let octet = (i % 250) as u8;
                        cache.insert(&query, &fake_response(&query, [octet; 4]));

                        if let Some(hit) = cache.lookup(&query) {
                            assert_eq!(&hit[0..2], &worker.to_be_bytes());
                            assert_eq!(hit.len(), query.len() + 16);
                            let ip = &hit[hit.len() - 4..];
                            assert!(ip.iter().all(|&b| b == ip[0]));
                        }
                        if i % 100 == 0 {
                            cache.sweep(Instant::now() + Duration::from_secs(120));
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker panicked");
        }
        assert!(cache.len() <= domains.len());
    }
}
