//! # Cache Layer Orchestration
//!
//! [`TaggedCache`] composes the store client, entry codec, write coalescer
//! and tag index into the four caller-facing operations. Every public
//! operation fails soft: internal errors are logged with their detail and
//! replaced by the operation's safe default (miss for reads, no-op for
//! writes and invalidations), so the cache is never a source of request
//! failure for its caller.

use std::sync::Arc;

use tracing::{debug, instrument, warn, Span};

use crate::coalesce::WriteCoalescer;
use crate::config::CacheConfig;
use crate::entry::{self, CacheEntry, PendingEntry};
use crate::error::Result;
use crate::store::{RedisStore, StoreBackend, StoreCommand};
use crate::tags::TagIndex;

pub struct TaggedCache {
    store: Arc<dyn StoreBackend>,
    config: Arc<CacheConfig>,
    coalescer: WriteCoalescer,
    tags: TagIndex,
}

impl TaggedCache {
    /// Build a cache over an injected store backend.
    pub fn new(store: Arc<dyn StoreBackend>, config: CacheConfig) -> Self {
        let config = Arc::new(config);
        let tags = TagIndex::new(Arc::clone(&store), Arc::clone(&config));
        Self {
            store,
            config,
            coalescer: WriteCoalescer::new(),
            tags,
        }
    }

    /// Build a cache over Redis, connections opened lazily on first use.
    pub fn with_redis(config: CacheConfig) -> Result<Self> {
        let store: Arc<dyn StoreBackend> = Arc::new(RedisStore::new(&config)?);
        Ok(Self::new(store, config))
    }

    /// Look up `key`, gated on any in-flight write for it.
    ///
    /// Returns `None` on absence, on a record that outlived its TTL, on a
    /// corrupt record, and on any store failure. A returned entry carries an
    /// advisory `stale` flag - forced at write time, past its soft
    /// revalidation window, or written before the most recent invalidation
    /// of one of `tags_to_check`; the caller decides whether to serve it.
    #[instrument(
        name = "cache.get",
        skip(self, key, tags_to_check),
        fields(
            cache.key = %key,
            cache.tag_count = tags_to_check.len(),
            cache.stale = tracing::field::Empty,
        )
    )]
    pub async fn get(&self, key: &str, tags_to_check: &[String]) -> Option<CacheEntry> {
        self.coalescer.wait(key).await;

        match self.read_entry(key, tags_to_check).await {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed - treating as miss");
                None
            }
        }
    }

    async fn read_entry(&self, key: &str, tags_to_check: &[String]) -> Result<Option<CacheEntry>> {
        let Some(raw) = self.store.get(&self.config.entry_key(key)).await? else {
            return Ok(None);
        };

        let mut entry = match entry::decode(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cache record - treating as miss");
                return Ok(None);
            }
        };

        let now = chrono::Utc::now().timestamp_millis();
        // The store should have expired this already; reject it rather than
        // serve a record past its physical lifetime.
        if entry.expired(now) {
            debug!(key = %key, "Record outlived its TTL - treating as miss");
            return Ok(None);
        }

        let invalidated_at = self.tags.max_invalidation_timestamp(tags_to_check);
        let stale = entry.stale
            || entry.past_revalidate_window(now)
            || (invalidated_at > 0 && entry.written_at <= invalidated_at);
        entry.stale = stale;
        Span::current().record("cache.stale", stale);

        Ok(Some(entry))
    }

    /// Cache an entry under `key`, registering the write before any I/O so
    /// concurrent readers of the same key wait instead of racing.
    ///
    /// The entry record and all its tag memberships are applied in one
    /// pipelined batch; readers gated on the coalescer observe either none
    /// or all of it. Failures are logged and swallowed - the caller already
    /// holds the value and only loses the caching benefit.
    #[instrument(
        name = "cache.set",
        skip(self, key, pending),
        fields(
            cache.key = %key,
            cache.tag_count = tracing::field::Empty,
            cache.expire = tracing::field::Empty,
            cache.revalidate = tracing::field::Empty,
            cache.stale = tracing::field::Empty,
        )
    )]
    pub async fn set(&self, key: &str, pending: PendingEntry) {
        // Held for the whole write; Drop releases the slot on every path.
        let _slot = self.coalescer.begin(key).await;

        if let Err(e) = self.write_entry(key, pending).await {
            warn!(key = %key, error = %e, "Cache write failed - caller keeps its value uncached");
        }
    }

    async fn write_entry(&self, key: &str, pending: PendingEntry) -> Result<()> {
        let entry = pending.materialize().await?;

        let span = Span::current();
        span.record("cache.tag_count", entry.tags.len());
        span.record("cache.expire", entry.ttl_seconds);
        span.record("cache.revalidate", entry.revalidate_seconds);
        span.record("cache.stale", entry.stale);

        let entry_key = self.config.entry_key(key);
        let mut commands = vec![StoreCommand::SetWithExpiry {
            key: entry_key.clone(),
            value: entry::encode(&entry)?,
            ttl_seconds: entry.ttl_seconds,
        }];
        for tag in &entry.tags {
            // The member set outlives its entries by the grace window so the
            // index can still invalidate records near their expiry.
            commands.push(StoreCommand::AddToSet {
                key: self.config.tag_key(tag),
                members: vec![entry_key.clone()],
                ttl_seconds: entry.ttl_seconds + self.config.tag_grace_seconds,
            });
        }

        self.store.execute_batch(commands).await?;
        debug!(key = %key, tag_count = entry.tags.len(), bytes = entry.payload.len(), "Cached entry");
        Ok(())
    }

    /// Invalidate every entry tagged with any of `tags`. Best effort: a
    /// failure leaves stale data visible until store TTL expiry, which
    /// callers must treat as the bound on staleness.
    ///
    /// `expire` overrides the recorded invalidation instant (epoch ms).
    #[instrument(
        name = "cache.update_tags",
        skip(self, tags),
        fields(cache.tag_count = tags.len(), cache.expire = tracing::field::Empty)
    )]
    pub async fn update_tags(&self, tags: &[String], expire: Option<i64>) {
        if let Some(stamp) = expire {
            Span::current().record("cache.expire", stamp);
        }
        if let Err(e) = self.tags.invalidate_tags(tags, expire).await {
            warn!(tag_count = tags.len(), error = %e, "Tag invalidation failed - stale data bounded by TTL");
        }
    }

    /// Pick up invalidations performed by other instances sharing this
    /// store. Call periodically, e.g. once per incoming request batch.
    #[instrument(name = "cache.refresh_tags", skip(self))]
    pub async fn refresh_tags(&self) {
        if let Err(e) = self.tags.refresh().await {
            warn!(error = %e, "Tag timestamp refresh failed - keeping current view");
        }
    }

    /// Maximum invalidation timestamp across `tags`, 0 if none was ever
    /// invalidated. Pure in-process read.
    pub fn get_expiration(&self, tags: &[String]) -> i64 {
        self.tags.max_invalidation_timestamp(tags)
    }

    /// Health probe: true when the store connections can be established.
    pub async fn ping(&self) -> bool {
        match self.store.connect().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cache store health check failed");
                false
            }
        }
    }
}
