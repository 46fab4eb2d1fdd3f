//! Session cache with expiry and LRU eviction.
//!
//! This crate provides the concurrency-safe cache the proxy uses to map a
//! session cookie to a resolved session:
//! - Entries carry an absolute expiry and are never returned past it
//! - Expired entries are dropped lazily on access and by a periodic sweep
//! - Each shard is LRU-bounded so memory stays bounded
//! - Keys are spread over independently locked shards, so lookups for
//!   different cookies do not contend on a single lock
//!
//! # Example
//!
//! ```rust,ignore
//! use ory_session::{CacheConfig, SessionCache};
//!
//! let cache: SessionCache<String> = SessionCache::new(
//!     CacheConfig::default().with_max_entries(1000).with_shards(8),
//! );
//! cache.insert("cookie", "value".to_string(), None);
//! assert_eq!(cache.lookup("cookie").as_deref(), Some("value"));
//! ```

mod cache;
mod config;
mod sweeper;

pub use cache::{CacheEntry, CacheStats, SessionCache};
pub use config::CacheConfig;
pub use sweeper::spawn_sweeper;
