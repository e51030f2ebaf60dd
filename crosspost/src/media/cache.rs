//! Content-hash dedup cache.
//!
//! Thread-safe map from content hash to canonical URL with TTL-based
//! eviction, a bounded entry count, and request deduplication: population of
//! a given hash is single-flighted, with losing callers awaiting the winner's
//! result. The durable truth lives in the rehost store; this map is purely a
//! performance layer and can always be recomputed from the bytes.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, OnceCell};

/// A cached canonical URL with expiration time.
#[derive(Clone)]
struct CacheEntry {
    canonical_url: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(canonical_url: String, ttl: Duration) -> Self {
        Self {
            canonical_url,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Result shared with waiters of an in-flight population.
pub(super) type InFlightResult = Result<String, String>;

pub(super) struct InFlightState {
    result: OnceCell<InFlightResult>,
    notify: Notify,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            result: OnceCell::new(),
            notify: Notify::new(),
        }
    }

    fn set_result(&self, result: InFlightResult) {
        let _ = self.result.set(result);
        self.notify.notify_waiters();
    }

    async fn wait(&self) -> InFlightResult {
        loop {
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            let notified = self.notify.notified();
            if let Some(result) = self.result.get() {
                return result.clone();
            }

            notified.await;
        }
    }
}

pub(super) type InFlightRequest = Arc<InFlightState>;

/// Bounded, TTL-evicting map from content hash to canonical URL.
#[derive(Clone)]
pub struct DedupCache {
    entries: Arc<DashMap<String, CacheEntry>>,
    in_flight: Arc<DashMap<String, InFlightRequest>>,
    ttl: Duration,
    max_entries: usize,
}

impl DedupCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            in_flight: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Get the cached canonical URL for a content hash.
    pub fn get(&self, content_hash: &str) -> Option<String> {
        let entry = self.entries.get(content_hash)?;

        if entry.is_expired() {
            drop(entry); // Release the lock before removing
            self.entries.remove(content_hash);
            return None;
        }

        Some(entry.canonical_url.clone())
    }

    /// Insert a mapping, evicting expired then closest-to-expiry entries when
    /// the cache is full.
    pub fn insert(&self, content_hash: String, canonical_url: String) {
        if self.entries.len() >= self.max_entries {
            self.cleanup_expired();
        }
        while self.entries.len() >= self.max_entries {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|e| e.value().expires_at)
                .map(|e| e.key().clone())
            else {
                break;
            };
            self.entries.remove(&oldest);
        }

        self.entries
            .insert(content_hash, CacheEntry::new(canonical_url, self.ttl));
    }

    /// Remove all expired entries. Returns how many were dropped.
    pub fn cleanup_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ========== Population Deduplication ==========

    /// Get or create the in-flight population for a hash.
    ///
    /// Returns (request, is_new); the caller that receives `is_new == true`
    /// performs the upload, everyone else waits on the request.
    pub(super) fn get_or_create_in_flight(&self, content_hash: &str) -> (InFlightRequest, bool) {
        if let Some(existing) = self.in_flight.get(content_hash) {
            return (existing.clone(), false);
        }

        let request = Arc::new(InFlightState::new());

        // Entry API handles the create/create race.
        match self.in_flight.entry(content_hash.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => (entry.get().clone(), false),
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(request.clone());
                (request, true)
            }
        }
    }

    /// Complete an in-flight population: cache the URL and wake waiters.
    pub(super) fn complete_in_flight(
        &self,
        content_hash: &str,
        request: &InFlightRequest,
        canonical_url: String,
    ) {
        if let Some((_, current)) = self.in_flight.remove(content_hash) {
            if Arc::ptr_eq(&current, request) {
                current.set_result(Ok(canonical_url.clone()));
                self.insert(content_hash.to_string(), canonical_url);
            } else {
                self.in_flight.insert(content_hash.to_string(), current);
            }
        }
    }

    /// Fail an in-flight population, waking waiters with the reason.
    pub(super) fn fail_in_flight(&self, content_hash: &str, request: &InFlightRequest, reason: String) {
        if let Some((_, current)) = self.in_flight.remove(content_hash) {
            if Arc::ptr_eq(&current, request) {
                current.set_result(Err(reason));
            } else {
                self.in_flight.insert(content_hash.to_string(), current);
            }
        }
    }

    /// Wait for another caller's population to finish.
    pub(super) async fn wait_for_in_flight(&self, request: &InFlightRequest) -> InFlightResult {
        request.wait().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let cache = DedupCache::new(Duration::from_secs(60), 16);
        cache.insert("hash-1".to_string(), "https://m.example/a".to_string());

        assert_eq!(
            cache.get("hash-1").as_deref(),
            Some("https://m.example/a")
        );
        assert!(cache.get("hash-2").is_none());
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = DedupCache::new(Duration::from_millis(10), 16);
        cache.insert("hash-1".to_string(), "url".to_string());

        assert!(cache.get("hash-1").is_some());
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.get("hash-1").is_none());
    }

    #[test]
    fn test_bounded_size_evicts() {
        let cache = DedupCache::new(Duration::from_secs(60), 3);
        for i in 0..10 {
            cache.insert(format!("hash-{i}"), format!("url-{i}"));
        }

        assert!(cache.len() <= 3);
        // The most recent insert always survives.
        assert_eq!(cache.get("hash-9").as_deref(), Some("url-9"));
    }

    #[tokio::test]
    async fn test_in_flight_shares_result() {
        let cache = DedupCache::new(Duration::from_secs(60), 16);

        let (winner, is_new) = cache.get_or_create_in_flight("hash-1");
        assert!(is_new);
        let (loser, is_new) = cache.get_or_create_in_flight("hash-1");
        assert!(!is_new);

        cache.complete_in_flight("hash-1", &winner, "url-1".to_string());

        assert_eq!(cache.wait_for_in_flight(&loser).await, Ok("url-1".to_string()));
        assert_eq!(cache.get("hash-1").as_deref(), Some("url-1"));
    }

    #[tokio::test]
    async fn test_in_flight_failure_propagates() {
        let cache = DedupCache::new(Duration::from_secs(60), 16);

        let (winner, _) = cache.get_or_create_in_flight("hash-1");
        let (loser, _) = cache.get_or_create_in_flight("hash-1");

        cache.fail_in_flight("hash-1", &winner, "upload failed".to_string());

        assert_eq!(
            cache.wait_for_in_flight(&loser).await,
            Err("upload failed".to_string())
        );
        assert!(cache.get("hash-1").is_none());

        // A new population can start after the failure.
        let (_, is_new) = cache.get_or_create_in_flight("hash-1");
        assert!(is_new);
    }
}
