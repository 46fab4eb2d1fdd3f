//! Sharded session cache with expiry and LRU eviction.

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::config::CacheConfig;

/// Entry stored in the cache.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// Cached value.
    pub value: V,

    /// Absolute expiry. `None` means the entry only leaves through
    /// invalidation or capacity eviction.
    pub expires_at: Option<DateTime<Utc>>,

    /// When this entry was inserted into cache.
    pub cached_at: Instant,
}

impl<V> CacheEntry<V> {
    /// Create a new cache entry.
    pub fn new(value: V, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value,
            expires_at,
            cached_at: Instant::now(),
        }
    }

    /// Whether the entry is expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

type Shard<V> = Mutex<LruCache<String, CacheEntry<V>>>;

/// Concurrency-safe session cache.
///
/// Keys are hashed onto a fixed set of shards, each with its own lock and
/// its own LRU bound. A shard lock is only ever held for the duration of a
/// map operation; nothing awaits while holding it.
///
/// Cloning is cheap and yields a handle to the same cache.
pub struct SessionCache<V> {
    shards: Arc<[Shard<V>]>,
    hasher: RandomState,
    config: CacheConfig,
}

impl<V: Clone> SessionCache<V> {
    /// Create a new, empty cache.
    pub fn new(config: CacheConfig) -> Self {
        let cap = NonZeroUsize::new(config.shard_capacity()).unwrap_or(NonZeroUsize::MIN);
        let shards: Vec<Shard<V>> = (0..config.shards.max(1))
            .map(|_| Mutex::new(LruCache::new(cap)))
            .collect();

        Self {
            shards: shards.into(),
            hasher: RandomState::new(),
            config,
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        let idx = (self.hasher.hash_one(key) as usize) % self.shards.len();
        &self.shards[idx]
    }

    /// Look up a value.
    ///
    /// Marks the entry as recently used. An entry found past its expiry is
    /// removed and reported as a miss.
    pub fn lookup(&self, key: &str) -> Option<V> {
        let now = Utc::now();
        let mut shard = self.shard(key).lock();

        match shard.get(key) {
            None => return None,
            Some(entry) if !entry.is_expired_at(now) => {
                trace!("Session cache hit");
                return Some(entry.value.clone());
            }
            Some(_) => {}
        }

        shard.pop(key);
        debug!("Session cache entry expired, removed on access");
        None
    }

    /// Insert a value with an optional absolute expiry.
    ///
    /// Returns `false` without caching anything when `expires_at` is already
    /// in the past. If the shard is full, its least recently used entry is
    /// evicted.
    pub fn insert(&self, key: &str, value: V, expires_at: Option<DateTime<Utc>>) -> bool {
        let entry = CacheEntry::new(value, expires_at);
        if entry.is_expired_at(Utc::now()) {
            trace!("Refusing to cache an already expired entry");
            return false;
        }

        let mut shard = self.shard(key).lock();
        if let Some((evicted, _)) = shard.push(key.to_string(), entry)
            && evicted != key
        {
            debug!("Evicted least recently used session to make room");
        }

        true
    }

    /// Remove an entry. Returns whether something was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.shard(key).lock().pop(key).is_some();
        if removed {
            debug!("Session invalidated from cache");
        }
        removed
    }

    /// Check if a live entry exists without touching LRU order.
    pub fn contains(&self, key: &str) -> bool {
        let now = Utc::now();
        self.shard(key)
            .lock()
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Remove every expired entry.
    ///
    /// Shards are swept one at a time so concurrent requests on other shards
    /// are not blocked. Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut count = 0;

        for shard in self.shards.iter() {
            let mut shard = shard.lock();
            let expired: Vec<String> = shard
                .iter()
                .filter(|(_, entry)| entry.is_expired_at(now))
                .map(|(key, _)| key.clone())
                .collect();

            for key in expired {
                shard.pop(&key);
                count += 1;
            }
        }

        if count > 0 {
            debug!(count = count, "Cleaned up expired sessions");
        }

        count
    }

    /// Number of entries currently held, including not yet swept expired
    /// ones.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.config.shard_capacity() * self.shards.len(),
            shards: self.shards.len(),
        }
    }
}

impl<V> Clone for SessionCache<V> {
    fn clone(&self) -> Self {
        Self {
            shards: Arc::clone(&self.shards),
            hasher: self.hasher.clone(),
            config: self.config.clone(),
        }
    }
}

impl<V> std::fmt::Debug for SessionCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache")
            .field("shards", &self.shards.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Current number of cached entries.
    pub size: usize,

    /// Maximum capacity across all shards.
    pub capacity: usize,

    /// Number of shards.
    pub shards: usize,
}
