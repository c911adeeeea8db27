//! Per-record-type answer caching
//!
//! Each record type the resolver serves (A, AAAA, TLSA) has its own bounded
//! LRU store. The store itself never looks at expiry: the resolver checks
//! freshness on read and removes stale entries.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::rr::{Record, RecordType};
use lru::LruCache;
use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Default maximum number of cache entries for each record type
pub const DEFAULT_MAX_ENTRIES: usize = 5000;

/// Normalize a query name into a cache key: lower-cased, with a trailing dot
pub fn cache_key(name: &str) -> String {
    let mut key = name.trim().to_ascii_lowercase();
    if !key.ends_with('.') {
        key.push('.');
    }
    key
}

/// Cached answer for one name
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Answer section of the response
    pub records: Vec<Record>,
    /// AD flag of the response
    pub secure: bool,
    /// When this entry expires
    pub expires_at: Instant,
}

impl CacheEntry {
    /// Create an entry that lives for `ttl` from now
    pub fn new(records: Vec<Record>, secure: bool, ttl: Duration) -> Self {
        Self {
            records,
            secure,
            expires_at: Instant::now() + ttl,
        }
    }

    /// Check if this entry has expired at `now`
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    /// Check if this entry has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Get the remaining TTL
    pub fn remaining_ttl(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Cache statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of lookups that found an entry
    pub hits: u64,
    /// Number of lookups that found nothing
    pub misses: u64,
    /// Number of entries pushed out to respect the bound
    pub evictions: u64,
    /// Current number of entries in cache
    pub entries: usize,
}

struct Inner {
    entries: LruCache<String, Arc<CacheEntry>>,
    stats: CacheStats,
}

/// Bounded answer store for a single record type
///
/// Every operation takes the internal lock for its own duration only.
pub struct RecordCache {
    inner: Mutex<Inner>,
    capacity: NonZeroUsize,
}

impl RecordCache {
    /// Create a cache holding at most `max_entries` answers
    ///
    /// A zero size falls back to [`DEFAULT_MAX_ENTRIES`].
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries)
            .or(NonZeroUsize::new(DEFAULT_MAX_ENTRIES))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
        }
    }

    /// Get the entry stored under `key`, fresh or not
    ///
    /// Only fresh entries count as hits; an expired entry is still returned
    /// but recorded as a miss.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(key).cloned();
        match &found {
            Some(entry) if !entry.is_expired() => inner.stats.hits += 1,
            _ => inner.stats.misses += 1,
        }
        found
    }

    /// Store `entry` under `key`, replacing any previous one
    pub fn set(&self, key: impl Into<String>, entry: CacheEntry) {
        let key = key.into();
        let mut inner = self.inner.lock();
        if let Some((evicted, _)) = inner.entries.push(key.clone(), Arc::new(entry)) {
            if evicted != key {
                inner.stats.evictions += 1;
            }
        }
        inner.stats.entries = inner.entries.len();
    }

    /// Remove the entry under `key`
    pub fn remove(&self, key: &str) -> Option<Arc<CacheEntry>> {
        let mut inner = self.inner.lock();
        let removed = inner.entries.pop(key);
        inner.stats.entries = inner.entries.len();
        removed
    }

    /// Remove the entry under `key` only if it is still `entry`
    ///
    /// Returns whether anything was removed. An entry stored by a concurrent
    /// `set` since `entry` was read is kept.
    pub fn remove_if_same(&self, key: &str, entry: &Arc<CacheEntry>) -> bool {
        let mut inner = self.inner.lock();
        let same = inner
            .entries
            .peek(key)
            .is_some_and(|current| Arc::ptr_eq(current, entry));
        if same {
            inner.entries.pop(key);
            inner.stats.entries = inner.entries.len();
        }
        same
    }

    /// Clear all entries from the cache
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.stats.entries = 0;
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }
}

/// Record types the resolver keeps a cache for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachedType {
    A,
    Aaaa,
    Tlsa,
}

impl CachedType {
    /// The DNS record type
    pub fn record_type(&self) -> RecordType {
        match self {
            CachedType::A => RecordType::A,
            CachedType::Aaaa => RecordType::AAAA,
            CachedType::Tlsa => RecordType::TLSA,
        }
    }
}

impl TryFrom<RecordType> for CachedType {
    type Error = Error;

    fn try_from(record_type: RecordType) -> Result<Self> {
        match record_type {
            RecordType::A => Ok(CachedType::A),
            RecordType::AAAA => Ok(CachedType::Aaaa),
            RecordType::TLSA => Ok(CachedType::Tlsa),
            other => Err(Error::UnsupportedRecordType(other)),
        }
    }
}

/// One cache per served record type
pub struct TypeCaches {
    a: RecordCache,
    aaaa: RecordCache,
    tlsa: RecordCache,
}

impl TypeCaches {
    /// Create the caches, each bounded at `max_entries`
    pub fn new(max_entries: usize) -> Self {
        Self {
            a: RecordCache::new(max_entries),
            aaaa: RecordCache::new(max_entries),
            tlsa: RecordCache::new(max_entries),
        }
    }

    /// The cache for `kind`
    pub fn get(&self, kind: CachedType) -> &RecordCache {
        match kind {
            CachedType::A => &self.a,
            CachedType::Aaaa => &self.aaaa,
            CachedType::Tlsa => &self.tlsa,
        }
    }

    /// Clear every cache
    pub fn clear(&self) {
        self.a.clear();
        self.aaaa.clear();
        self.tlsa.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ttl: Duration) -> CacheEntry {
        CacheEntry::new(Vec::new(), false, ttl)
    }

    #[test]
    fn test_cache_key_normalized() {
        assert_eq!(cache_key("Example.COM"), "example.com.");
        assert_eq!(cache_key("example.com."), "example.com.");
        assert_eq!(cache_key("_443._tcp.Example.com"), "_443._tcp.example.com.");
    }

    #[test]
    fn test_cache_miss() {
        let cache = RecordCache::new(100);
        assert!(cache.get("example.com.").is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_cache_set_get_remove() {
        let cache = RecordCache::new(100);
        cache.set("example.com.", CacheEntry::new(Vec::new(), true, Duration::from_secs(60)));

        let hit = cache.get("example.com.").unwrap();
        assert!(hit.secure);
        assert_eq!(cache.stats().hits, 1);

        assert!(cache.remove("example.com.").is_some());
        assert!(cache.get("example.com.").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_get_returns_expired_entries() {
        let cache = RecordCache::new(10);
        cache.set("stale.example.", entry(Duration::ZERO));

        let stale = cache.get("stale.example.").unwrap();
        assert!(stale.is_expired());

        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_remove_if_same() {
        let cache = RecordCache::new(10);
        cache.set("example.com.", entry(Duration::ZERO));
        let stale = cache.get("example.com.").unwrap();

        // A fresh entry written after the stale read must survive
        cache.set("example.com.", entry(Duration::from_secs(60)));
        assert!(!cache.remove_if_same("example.com.", &stale));
        assert_eq!(cache.len(), 1);
        assert!(!cache.get("example.com.").unwrap().is_expired());

        let current = cache.get("example.com.").unwrap();
        assert!(cache.remove_if_same("example.com.", &current));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().entries, 0);
    }

    #[test]
    fn test_set_replaces_entry() {
        let cache = RecordCache::new(10);
        cache.set("example.com.", CacheEntry::new(Vec::new(), false, Duration::from_secs(60)));
        cache.set("example.com.", CacheEntry::new(Vec::new(), true, Duration::from_secs(60)));

        assert_eq!(cache.len(), 1);
        assert!(cache.get("example.com.").unwrap().secure);
        assert_eq!(cache.stats().evictions, 0);
    }

    #[test]
    fn test_cache_entry_expiration() {
        let entry = entry(Duration::from_secs(30));
        let now = Instant::now();
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + Duration::from_secs(31)));
        assert!(entry.remaining_ttl() <= Duration::from_secs(30));
    }

    #[test]
    fn test_cache_bounded() {
        let max = 50;
        let cache = RecordCache::new(max);
        for i in 0..=max {
            cache.set(format!("host{}.example.com.", i), entry(Duration::from_secs(60)));
        }

        assert_eq!(cache.len(), max);
        assert_eq!(cache.stats().entries, max);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_zero_size_uses_default() {
        assert_eq!(RecordCache::new(0).capacity(), DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_cached_type_mapping() {
        assert_eq!(CachedType::try_from(RecordType::A).unwrap(), CachedType::A);
        assert_eq!(
            CachedType::try_from(RecordType::TLSA).unwrap().record_type(),
            RecordType::TLSA
        );
        assert!(CachedType::try_from(RecordType::MX).is_err());
    }

    #[test]
    fn test_type_caches_are_separate() {
        let caches = TypeCaches::new(10);
        caches
            .get(CachedType::A)
            .set("example.com.", entry(Duration::from_secs(60)));

        assert_eq!(caches.get(CachedType::A).len(), 1);
        assert!(caches.get(CachedType::Aaaa).is_empty());
        assert!(caches.get(CachedType::Tlsa).is_empty());

        caches.clear();
        assert!(caches.get(CachedType::A).is_empty());
    }
}
