//! # Tag Index
//!
//! Per-tag invalidation state. Membership (which entry keys carry a tag)
//! lives only in the remote store; the in-process state is a concurrent map
//! of tag to last-invalidation timestamp, seeded from the store by
//! [`TagIndex::refresh`] and updated incrementally on every invalidation
//! this instance performs.
//!
//! The map is an injected, explicitly-owned component with process-lifetime
//! scope - populated lazily, never torn down.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::store::{StoreBackend, StoreCommand};

pub struct TagIndex {
    store: Arc<dyn StoreBackend>,
    config: Arc<CacheConfig>,
    /// tag -> last invalidation instant, epoch milliseconds.
    timestamps: DashMap<String, i64>,
}

impl TagIndex {
    pub fn new(store: Arc<dyn StoreBackend>, config: Arc<CacheConfig>) -> Self {
        Self {
            store,
            config,
            timestamps: DashMap::new(),
        }
    }

    /// Invalidate every entry currently tagged with any of `tags`.
    ///
    /// Reads each tag's member set, then issues one pipelined batch across
    /// all tags: deletes for every member key, deletion of the member sets
    /// themselves, and a durable timestamp write per tag. The in-process map
    /// is updated only after the batch succeeds.
    ///
    /// `override_timestamp` substitutes the recorded invalidation instant;
    /// callers normally leave it unset and get `now`.
    pub async fn invalidate_tags(
        &self,
        tags: &[String],
        override_timestamp: Option<i64>,
    ) -> Result<()> {
        if tags.is_empty() {
            return Ok(());
        }

        let stamp = override_timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        let mut commands = Vec::new();
        let mut invalidated_keys = 0usize;

        for tag in tags {
            let tag_key = self.config.tag_key(tag);
            // Member values are full entry record keys, deletable as-is.
            let members = self.store.set_members(&tag_key).await?;
            invalidated_keys += members.len();
            if !members.is_empty() {
                commands.push(StoreCommand::Delete { keys: members });
            }
            commands.push(StoreCommand::Delete {
                keys: vec![tag_key],
            });
            commands.push(StoreCommand::Set {
                key: self.config.tag_timestamp_key(tag),
                value: stamp.to_string(),
            });
        }

        self.store.execute_batch(commands).await?;

        for tag in tags {
            self.timestamps.insert(tag.clone(), stamp);
        }

        debug!(
            tag_count = tags.len(),
            invalidated_keys,
            timestamp = stamp,
            "Invalidated tags"
        );
        Ok(())
    }

    /// Maximum last-invalidation timestamp across `tags`; 0 when none of
    /// them has ever been invalidated. Pure in-process read.
    pub fn max_invalidation_timestamp(&self, tags: &[String]) -> i64 {
        tags.iter()
            .filter_map(|tag| self.timestamps.get(tag).map(|entry| *entry))
            .max()
            .unwrap_or(0)
    }

    /// Repopulate the timestamp map from the store's durable records.
    ///
    /// The map is not authoritative across process restarts or across
    /// instances sharing one store; this is how a fresh instance catches up
    /// on invalidations it did not itself perform.
    pub async fn refresh(&self) -> Result<()> {
        let keys = self
            .store
            .scan_keys(&self.config.tag_timestamp_pattern())
            .await?;
        let values = self.store.mget(&keys).await?;

        let mut loaded = 0usize;
        for (key, value) in keys.iter().zip(values) {
            let Some(raw) = value else { continue };
            let Some(tag) = key
                .strip_prefix(&self.config.tag_prefix)
                .and_then(|rest| rest.strip_suffix(":timestamp"))
            else {
                continue;
            };
            match raw.parse::<i64>() {
                Ok(stamp) => {
                    self.timestamps.insert(tag.to_string(), stamp);
                    loaded += 1;
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Skipping unparseable tag timestamp record");
                }
            }
        }

        debug!(loaded, "Refreshed tag invalidation timestamps");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::MemoryStore;

    fn index_with_store() -> (TagIndex, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(CacheConfig::default());
        let index = TagIndex::new(store.clone(), config);
        (index, store)
    }

    #[tokio::test]
    async fn test_unknown_tag_has_zero_timestamp() {
        let (index, _store) = index_with_store();
        assert_eq!(
            index.max_invalidation_timestamp(&["unknown-tag".to_string()]),
            0
        );
        assert_eq!(index.max_invalidation_timestamp(&[]), 0);
    }

    #[tokio::test]
    async fn test_invalidation_deletes_members_and_records_timestamp() {
        let (index, store) = index_with_store();
        store.seed_string("cache:w1", "entry-one").await;
        store.seed_set("tag:wines", &["cache:w1"]).await;

        index
            .invalidate_tags(&["wines".to_string()], None)
            .await
            .unwrap();

        assert!(store.get_string("cache:w1").await.is_none());
        assert!(store.set_snapshot("tag:wines").await.is_empty());
        let recorded = store
            .get_string("tag:wines:timestamp")
            .await
            .expect("timestamp record missing");
        let stamp: i64 = recorded.parse().unwrap();
        assert!(stamp > 0);
        assert_eq!(
            index.max_invalidation_timestamp(&["wines".to_string()]),
            stamp
        );
    }

    #[tokio::test]
    async fn test_invalidation_is_idempotent() {
        let (index, store) = index_with_store();
        store.seed_string("cache:w1", "entry-one").await;
        store.seed_set("tag:wines", &["cache:w1"]).await;

        let tags = vec!["wines".to_string()];
        index.invalidate_tags(&tags, None).await.unwrap();
        let first = index.max_invalidation_timestamp(&tags);

        // Second pass over an already-empty member set: no error, timestamp
        // moves forward (or stays), nothing reappears.
        index.invalidate_tags(&tags, None).await.unwrap();
        let second = index.max_invalidation_timestamp(&tags);
        assert!(second >= first);
        assert!(store.get_string("cache:w1").await.is_none());
    }

    #[tokio::test]
    async fn test_timestamp_monotonicity() {
        let (index, _store) = index_with_store();
        let tags = vec!["wines".to_string()];
        let mut last = 0;
        for _ in 0..5 {
            index.invalidate_tags(&tags, None).await.unwrap();
            let current = index.max_invalidation_timestamp(&tags);
            assert!(current >= last);
            last = current;
        }
    }

    #[tokio::test]
    async fn test_override_timestamp() {
        let (index, store) = index_with_store();
        index
            .invalidate_tags(&["wines".to_string()], Some(12345))
            .await
            .unwrap();
        assert_eq!(
            index.max_invalidation_timestamp(&["wines".to_string()]),
            12345
        );
        assert_eq!(
            store.get_string("tag:wines:timestamp").await.as_deref(),
            Some("12345")
        );
    }

    #[tokio::test]
    async fn test_max_across_multiple_tags() {
        let (index, _store) = index_with_store();
        index
            .invalidate_tags(&["a".to_string()], Some(100))
            .await
            .unwrap();
        index
            .invalidate_tags(&["b".to_string()], Some(200))
            .await
            .unwrap();
        let both = vec!["a".to_string(), "b".to_string()];
        assert_eq!(index.max_invalidation_timestamp(&both), 200);
    }

    #[tokio::test]
    async fn test_refresh_seeds_from_store() {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(CacheConfig::default());
        store.seed_string("tag:wines:timestamp", "777").await;
        store.seed_string("tag:broken:timestamp", "not-a-number").await;

        // A fresh instance sharing the same store catches up via refresh.
        let index = TagIndex::new(store.clone(), config);
        assert_eq!(index.max_invalidation_timestamp(&["wines".to_string()]), 0);
        index.refresh().await.unwrap();
        assert_eq!(
            index.max_invalidation_timestamp(&["wines".to_string()]),
            777
        );
        assert_eq!(index.max_invalidation_timestamp(&["broken".to_string()]), 0);
    }

    #[tokio::test]
    async fn test_invalidation_across_tags_is_one_batch() {
        let (index, store) = index_with_store();
        store.seed_set("tag:a", &["cache:x"]).await;
        store.seed_set("tag:b", &["cache:y"]).await;
        store.reset_batch_count().await;

        index
            .invalidate_tags(&["a".to_string(), "b".to_string()], None)
            .await
            .unwrap();

        assert_eq!(store.batch_count().await, 1);
    }
}
