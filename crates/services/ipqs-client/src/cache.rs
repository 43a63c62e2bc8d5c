//! Verdict cache with lazy, read-time expiration.

use crate::metrics;
use crate::verdict::Verdict;
use dashmap::DashMap;
use prometheus::IntGauge;
use std::time::Duration;
use tokio::time::Instant;

/// Cached classification for a single lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub verdict: Verdict,
    pub expires_at: Instant,
}

impl CacheEntry {
    pub fn new(verdict: Verdict, ttl: Duration) -> Self {
        Self {
            verdict,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Concurrent map from lookup key to its last verdict.
///
/// Reads and writes go through a sharded map, so a writer only ever contends
/// with readers of the same shard. Expired entries stay in place until they are
/// overwritten or purged.
///
/// The size gauge is shared by every cache in the process and only ever moves
/// by this cache's own deltas, so it reports the total across clients.
#[derive(Debug)]
pub struct VerdictCache {
    entries: DashMap<String, CacheEntry>,
    size: IntGauge,
}

impl Default for VerdictCache {
    fn default() -> Self {
        Self::with_size_gauge(metrics::LOOKUP_CACHE_SIZE.clone())
    }
}

impl VerdictCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that reports its size changes to `size`.
    pub fn with_size_gauge(size: IntGauge) -> Self {
        Self {
            entries: DashMap::new(),
            size,
        }
    }

    /// Returns the stored entry for `key`, fresh or not.
    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| *entry)
    }

    /// Returns the stored verdict for `key` if it has not yet expired at `now`.
    pub fn get_fresh(&self, key: &str, now: Instant) -> Option<Verdict> {
        self.get(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.verdict)
    }

    /// Stores `entry` under `key`, replacing whatever was there.
    pub fn put(&self, key: &str, entry: CacheEntry) {
        if self.entries.insert(key.to_string(), entry).is_none() {
            self.size.inc();
        }
    }

    /// Drops every entry that expired at or before `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = entry.is_fresh(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        self.size.sub(removed as i64);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Drop for VerdictCache {
    fn drop(&mut self) {
        self.size.sub(self.entries.len() as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn expired_entries_are_kept_but_not_fresh() {
        let cache = VerdictCache::new();
        cache.put("1.1.1.1", CacheEntry::new(Verdict::Good, Duration::from_secs(5)));

        assert_eq!(cache.get_fresh("1.1.1.1", Instant::now()), Some(Verdict::Good));

        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.get_fresh("1.1.1.1", Instant::now()), None);
        let stale = cache.get("1.1.1.1").expect("expired entry is still stored");
        assert_eq!(stale.verdict, Verdict::Good);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_whole_entry() {
        let cache = VerdictCache::new();
        cache.put("host.example", CacheEntry::new(Verdict::Bad, Duration::from_secs(60)));
        cache.put("host.example", CacheEntry::new(Verdict::Unknown, Duration::from_secs(1)));

        let entry = cache.get("host.example").unwrap();
        assert_eq!(entry.verdict, Verdict::Unknown);
        assert_eq!(entry.expires_at, Instant::now() + Duration::from_secs(1));
    }

    #[test]
    fn keys_are_case_sensitive() {
        let cache = VerdictCache::new();
        cache.put("Host.Example", CacheEntry::new(Verdict::Bad, Duration::from_secs(60)));
        assert!(cache.get("host.example").is_none());
        assert!(cache.get("Host.Example").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_removes_only_expired() {
        let cache = VerdictCache::new();
        cache.put("short", CacheEntry::new(Verdict::Good, Duration::from_secs(1)));
        cache.put("long", CacheEntry::new(Verdict::Bad, Duration::from_secs(600)));

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(cache.purge_expired(Instant::now()), 1);
        assert!(cache.get("short").is_none());
        assert!(cache.get("long").is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_never_tear_entries() {
        let cache = Arc::new(VerdictCache::new());
        let mut tasks = Vec::new();

        for i in 0..8u64 {
            let cache = cache.clone();
            tasks.push(tokio::spawn(async move {
                let verdict = if i % 2 == 0 { Verdict::Good } else { Verdict::Bad };
                let ttl = Duration::from_secs(100 + i);
                for _ in 0..500 {
                    cache.put("shared", CacheEntry::new(verdict, ttl));
                    let seen = cache.get("shared").unwrap();
                    assert!(matches!(seen.verdict, Verdict::Good | Verdict::Bad));
                }
            }));
        }

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn size_gauge_sums_across_caches() {
        let gauge = IntGauge::new("test_cache_size", "entries").unwrap();
        let first = VerdictCache::with_size_gauge(gauge.clone());
        let second = VerdictCache::with_size_gauge(gauge.clone());

        first.put("a", CacheEntry::new(Verdict::Good, Duration::from_secs(1)));
        first.put("b", CacheEntry::new(Verdict::Bad, Duration::from_secs(600)));
        first.put("b", CacheEntry::new(Verdict::Bad, Duration::from_secs(600)));
        second.put("a", CacheEntry::new(Verdict::Unknown, Duration::from_secs(600)));
        assert_eq!(gauge.get(), 3);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(first.purge_expired(Instant::now()), 1);
        assert_eq!(gauge.get(), 2);

        drop(second);
        assert_eq!(gauge.get(), 1);
    }
}
