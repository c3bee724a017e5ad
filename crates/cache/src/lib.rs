//! In-memory cache keyed by string with fingerprint validation.
//!
//! The analyzer has no process lifetime of its own, so this cache is the only
//! cross-call memoization layer in the server. Entries are validated against a
//! caller-supplied fingerprint (typically a digest of source-file mtimes) and
//! expire after a TTL; when the cache is full the least-recently-used entry is
//! evicted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Generic TTL + LRU cache with fingerprint validation.
pub struct Cache<T> {
    inner: Mutex<HashMap<String, Entry<T>>>,
    ttl: Duration,
    max_size: usize,
}

struct Entry<T> {
    value: T,
    fingerprint: String,
    cached_at: Instant,
    last_used: Instant,
}

impl<T: Clone> Cache<T> {
    /// Creates a cache with the given TTL and capacity. A non-positive
    /// capacity falls back to 10 entries.
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        let max_size = if max_size == 0 { 10 } else { max_size };
        Self {
            inner: Mutex::new(HashMap::new()),
            ttl,
            max_size,
        }
    }

    /// Returns the cached value if the key is present, the fingerprint
    /// matches, and the TTL has not expired. A stale or mismatched entry is
    /// deleted on the spot.
    pub fn get(&self, key: &str, fingerprint: &str) -> Option<T> {
        let mut entries = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let stale = match entries.get(key) {
            None => return None,
            Some(e) => e.fingerprint != fingerprint || e.cached_at.elapsed() > self.ttl,
        };
        if stale {
            entries.remove(key);
            return None;
        }
        let entry = entries.get_mut(key)?;
        entry.last_used = Instant::now();
        Some(entry.value.clone())
    }

    /// Stores a value, evicting the least-recently-used entry when inserting
    /// a new key at capacity. An existing key is overwritten in place.
    pub fn put(&self, key: &str, fingerprint: &str, value: T) {
        let mut entries = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        if !entries.contains_key(key) && entries.len() >= self.max_size {
            Self::evict_lru(&mut entries);
        }

        entries.insert(
            key.to_string(),
            Entry {
                value,
                fingerprint: fingerprint.to_string(),
                cached_at: now,
                last_used: now,
            },
        );
    }

    /// Removes a cache entry if present.
    pub fn invalidate(&self, key: &str) {
        let mut entries = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
    }

    // O(n) scan; capacities are in the low dozens.
    fn evict_lru(entries: &mut HashMap<String, Entry<T>>) {
        let oldest = entries
            .iter()
            .min_by_key(|(_, e)| e.last_used)
            .map(|(k, _)| k.clone());
        if let Some(key) = oldest {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn get_and_put() {
        let cache: Cache<String> = Cache::new(Duration::from_secs(300), 10);

        assert!(cache.get("key1", "fp1").is_none(), "miss on empty cache");

        cache.put("key1", "fp1", "value1".to_string());
        assert_eq!(cache.get("key1", "fp1").as_deref(), Some("value1"));
    }

    #[test]
    fn fingerprint_mismatch_invalidates() {
        let cache: Cache<String> = Cache::new(Duration::from_secs(300), 10);
        cache.put("key1", "fp1", "value1".to_string());

        assert!(cache.get("key1", "fp2").is_none());
        // The mismatched entry is deleted, not merely hidden.
        assert!(cache.get("key1", "fp1").is_none());
    }

    #[test]
    fn ttl_expiry() {
        let cache: Cache<String> = Cache::new(Duration::from_millis(50), 10);
        cache.put("key1", "fp1", "value1".to_string());

        assert!(cache.get("key1", "fp1").is_some(), "hit before TTL");
        sleep(Duration::from_millis(60));
        assert!(cache.get("key1", "fp1").is_none(), "miss after TTL");
    }

    #[test]
    fn lru_eviction() {
        let cache: Cache<String> = Cache::new(Duration::from_secs(300), 2);

        cache.put("key1", "f1", "v1".to_string());
        sleep(Duration::from_millis(2));
        cache.put("key2", "f2", "v2".to_string());
        sleep(Duration::from_millis(2));

        // Touch key1 so key2 becomes the LRU entry.
        cache.get("key1", "f1");
        sleep(Duration::from_millis(2));

        cache.put("key3", "f3", "v3".to_string());

        assert!(cache.get("key1", "f1").is_some(), "recently used survives");
        assert!(cache.get("key2", "f2").is_none(), "LRU entry evicted");
        assert!(cache.get("key3", "f3").is_some(), "new entry present");
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache: Cache<u32> = Cache::new(Duration::from_secs(300), 2);
        cache.put("a", "f", 1);
        cache.put("b", "f", 2);
        cache.put("a", "f", 3);

        assert_eq!(cache.get("a", "f"), Some(3));
        assert_eq!(cache.get("b", "f"), Some(2));
    }

    #[test]
    fn invalidate() {
        let cache: Cache<String> = Cache::new(Duration::from_secs(300), 10);
        cache.put("key1", "fp1", "value1".to_string());

        cache.invalidate("key1");
        assert!(cache.get("key1", "fp1").is_none());
    }

    #[test]
    fn zero_capacity_defaults() {
        let cache: Cache<u32> = Cache::new(Duration::from_secs(300), 0);
        for i in 0..10 {
            cache.put(&format!("k{i}"), "f", i);
        }
        // Default capacity of 10 keeps all of them.
        for i in 0..10 {
            assert_eq!(cache.get(&format!("k{i}"), "f"), Some(i));
        }
    }
}
