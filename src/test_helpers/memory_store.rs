//! In-memory [`StoreBackend`] for tests.
//!
//! Faithful to the contract the cache relies on: string values, member sets
//! with their own TTLs, atomically applied batches. Physical TTL expiry is
//! recorded but not simulated; tests assert on the recorded lifetimes
//! instead of sleeping. A failure switch turns every operation into a store
//! error to exercise the fails-soft paths.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{CacheError, Result};
use crate::store::{StoreBackend, StoreCommand};

#[derive(Debug, Default)]
struct Inner {
    strings: HashMap<String, String>,
    sets: HashMap<String, HashSet<String>>,
    /// key -> TTL seconds recorded at last write, for assertions.
    ttls: HashMap<String, u64>,
    batches: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(CacheError::Store(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "simulated store outage",
            ))));
        }
        Ok(())
    }

    /// Make every subsequent operation fail (or recover).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub async fn seed_string(&self, key: &str, value: &str) {
        let mut inner = self.inner.lock().await;
        inner.strings.insert(key.to_string(), value.to_string());
    }

    pub async fn seed_set(&self, key: &str, members: &[&str]) {
        let mut inner = self.inner.lock().await;
        inner
            .sets
            .entry(key.to_string())
            .or_default()
            .extend(members.iter().map(|m| m.to_string()));
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        self.inner.lock().await.strings.get(key).cloned()
    }

    pub async fn set_snapshot(&self, key: &str) -> Vec<String> {
        self.inner
            .lock()
            .await
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// TTL seconds recorded for a key at its last write, if any.
    pub async fn recorded_ttl(&self, key: &str) -> Option<u64> {
        self.inner.lock().await.ttls.get(key).copied()
    }

    pub async fn batch_count(&self) -> usize {
        self.inner.lock().await.batches
    }

    pub async fn reset_batch_count(&self) {
        self.inner.lock().await.batches = 0;
    }

    /// Glob match restricted to the single-`*` patterns the cache issues.
    fn glob_match(pattern: &str, key: &str) -> bool {
        match pattern.split_once('*') {
            Some((prefix, suffix)) => {
                key.len() >= prefix.len() + suffix.len()
                    && key.starts_with(prefix)
                    && key.ends_with(suffix)
            }
            None => pattern == key,
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryStore {
    async fn connect(&self) -> Result<()> {
        self.check_available()
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_available()?;
        Ok(self.inner.lock().await.strings.get(key).cloned())
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .await
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        Ok(keys
            .iter()
            .map(|key| inner.strings.get(key).cloned())
            .collect())
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.check_available()?;
        let inner = self.inner.lock().await;
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .filter(|key| Self::glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn execute_batch(&self, commands: Vec<StoreCommand>) -> Result<()> {
        self.check_available()?;
        // One lock acquisition for the whole batch: all-or-nothing
        // visibility, like a pipelined round trip.
        let mut inner = self.inner.lock().await;
        inner.batches += 1;
        for command in commands {
            match command {
                StoreCommand::SetWithExpiry {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    inner.strings.insert(key.clone(), value);
                    inner.ttls.insert(key, ttl_seconds);
                }
                StoreCommand::AddToSet {
                    key,
                    members,
                    ttl_seconds,
                } => {
                    inner.sets.entry(key.clone()).or_default().extend(members);
                    inner.ttls.insert(key, ttl_seconds);
                }
                StoreCommand::Set { key, value } => {
                    inner.strings.insert(key, value);
                }
                StoreCommand::Delete { keys } => {
                    for key in keys {
                        inner.strings.remove(&key);
                        inner.sets.remove(&key);
                        inner.ttls.remove(&key);
                    }
                }
            }
        }
        Ok(())
    }
}
