#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, TTL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # tagcache
//!
//! Tag-addressable cache layer between an application's data-fetching logic
//! and a remote key-value store (Redis).
//!
//! ## Overview
//!
//! The cache answers two questions for a caller: "do I have a fresh cached
//! value for this key?" and "which keys must be dropped because the data
//! they represent changed?". Entries are written with a set of tags;
//! invalidating a tag removes every entry that carries it in one logical
//! operation, and a timestamp protocol covers the window between an
//! invalidation being recorded and the records actually disappearing.
//!
//! ## Key Features
//!
//! - **Write coalescing**: concurrent readers of a key wait for an
//!   in-flight writer instead of observing a torn or pre-write state
//! - **Tag invalidation**: best-effort, eventually-consistent invalidation
//!   driven by durable per-tag timestamps shared across instances
//! - **Pipelined batches**: an entry and all its tag memberships are
//!   applied in a single network round trip
//! - **Fails soft**: every public operation degrades to a miss or no-op on
//!   internal failure - the cache never fails the caller's request
//!
//! ## Module Organization
//!
//! - [`cache`] - `TaggedCache`, the caller-facing orchestrator
//! - [`entry`] - entry model, payload producers and the wire codec
//! - [`coalesce`] - per-key in-flight write registry
//! - [`tags`] - tag membership and invalidation timestamps
//! - [`store`] - remote store boundary and the Redis implementation
//! - [`config`] - environment-driven configuration
//! - [`error`] - structured error handling
//! - [`logging`] - tracing subscriber setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tagcache::cache::TaggedCache;
//! use tagcache::config::CacheConfig;
//! use tagcache::entry::{PayloadSource, PendingEntry};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let cache = TaggedCache::with_redis(CacheConfig::from_env()?)?;
//!
//! cache
//!     .set(
//!         "w1",
//!         PendingEntry {
//!             payload: PayloadSource::Ready(b"abc".to_vec()),
//!             tags: vec!["wines".to_string()],
//!             stale: false,
//!             written_at: chrono::Utc::now().timestamp_millis(),
//!             ttl_seconds: 3600,
//!             revalidate_seconds: 3600,
//!         },
//!     )
//!     .await;
//!
//! if let Some(entry) = cache.get("w1", &["wines".to_string()]).await {
//!     println!("hit, {} bytes, stale: {}", entry.payload.len(), entry.stale);
//! }
//!
//! cache.update_tags(&["wines".to_string()], None).await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod coalesce;
pub mod config;
pub mod entry;
pub mod error;
pub mod logging;
pub mod store;
pub mod tags;
pub mod test_helpers;

pub use cache::TaggedCache;
pub use config::CacheConfig;
pub use entry::{CacheEntry, PayloadSource, PendingEntry};
pub use error::{CacheError, Result};
