//! Configuration for the session cache.

use std::time::Duration;

/// Default maximum number of cached sessions across all shards.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Default number of independently locked shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Default interval between background sweeps of expired entries.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Configuration for the session cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of entries before LRU eviction kicks in.
    ///
    /// The bound is split evenly across shards.
    pub max_entries: usize,

    /// Number of shards. Clamped to at least one.
    pub shards: usize,

    /// Interval for the background sweep task.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            shards: DEFAULT_SHARDS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    /// Set the number of shards.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Capacity of a single shard.
    pub(crate) fn shard_capacity(&self) -> usize {
        let shards = self.shards.max(1);
        self.max_entries.div_ceil(shards).max(1)
    }
}
