//! # Remote Store Boundary
//!
//! The cache layer talks to the remote key-value store through the
//! [`StoreBackend`] trait: point reads on one logical connection, mutations
//! batched into single pipelined round trips on the other. The production
//! implementation is [`RedisStore`]; tests inject an in-process store.

pub mod redis;

use async_trait::async_trait;

use crate::error::Result;

pub use self::redis::RedisStore;

/// One mutation inside a pipelined batch.
///
/// A batch is applied by the store as a single network round trip, without
/// interleaving from other clients' commands within that batch.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCommand {
    /// Store a string value with a per-key TTL.
    SetWithExpiry {
        key: String,
        value: String,
        ttl_seconds: u64,
    },
    /// Add members to a set and refresh the set's own TTL.
    AddToSet {
        key: String,
        members: Vec<String>,
        ttl_seconds: u64,
    },
    /// Store a durable string value with no TTL.
    Set { key: String, value: String },
    /// Remove keys outright.
    Delete { keys: Vec<String> },
}

/// Boundary contract for the remote key-value store.
///
/// Connections are opened lazily on first use and reused for the process
/// lifetime; `connect` is idempotent.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Establish connections if not yet established.
    async fn connect(&self) -> Result<()>;

    /// Point read of a string value. `None` when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// All members of a set key. Empty when the key is absent.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Batched point reads, position-aligned with `keys`.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// All keys matching a glob-style pattern.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Apply a batch of mutations as one pipelined round trip.
    async fn execute_batch(&self, commands: Vec<StoreCommand>) -> Result<()>;
}
