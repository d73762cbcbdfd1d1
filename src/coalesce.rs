//! # Write Coalescing
//!
//! In-process registry mapping a cache key to its in-flight write. Readers
//! gate on the registry so they never observe a half-written entry; a second
//! writer for the same key queues behind the first. Entries for different
//! keys never contend.
//!
//! The slot handed to a writer is a guard: dropping it (on success or
//! failure) removes the registry entry and wakes every waiter, so no key is
//! permanently blocked by one failed write.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::trace;

type Registry = Arc<DashMap<String, watch::Receiver<()>>>;

#[derive(Debug, Default)]
pub struct WriteCoalescer {
    inflight: Registry,
}

/// Exclusive in-flight marker for one key. Held for the duration of one
/// write; cleanup happens in `Drop` regardless of outcome.
#[derive(Debug)]
pub struct WriteSlot {
    key: String,
    inflight: Registry,
    // Dropped after the registry entry is removed, closing the channel and
    // waking waiters.
    _done: watch::Sender<()>,
}

impl Drop for WriteSlot {
    fn drop(&mut self) {
        self.inflight.remove(&self.key);
        trace!(key = %self.key, "Write slot released");
    }
}

impl WriteCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register intent to write `key` before any I/O happens.
    ///
    /// If another write for the same key is already in flight, this waits
    /// for it to finish and then claims the slot; writers never race each
    /// other for one key.
    pub async fn begin(&self, key: &str) -> WriteSlot {
        loop {
            let existing = match self.inflight.entry(key.to_string()) {
                Entry::Vacant(slot) => {
                    let (tx, rx) = watch::channel(());
                    slot.insert(rx);
                    trace!(key = %key, "Write slot claimed");
                    return WriteSlot {
                        key: key.to_string(),
                        inflight: Arc::clone(&self.inflight),
                        _done: tx,
                    };
                }
                // Clone the receiver out so the shard lock is released
                // before awaiting.
                Entry::Occupied(slot) => slot.get().clone(),
            };

            let mut rx = existing;
            // Err means the writer dropped its sender, i.e. finished.
            let _ = rx.changed().await;
        }
    }

    /// Reader-side gate: if a write for `key` is in flight, wait for it to
    /// complete. Returns immediately otherwise.
    pub async fn wait(&self, key: &str) {
        let Some(rx) = self.inflight.get(key).map(|entry| entry.value().clone()) else {
            return;
        };
        let mut rx = rx;
        let _ = rx.changed().await;
    }

    /// Whether a write for `key` is currently registered.
    pub fn in_flight(&self, key: &str) -> bool {
        self.inflight.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_slot_released_on_drop() {
        let coalescer = WriteCoalescer::new();
        let slot = coalescer.begin("k1").await;
        assert!(coalescer.in_flight("k1"));
        drop(slot);
        assert!(!coalescer.in_flight("k1"));
    }

    #[tokio::test]
    async fn test_wait_returns_immediately_without_writer() {
        let coalescer = WriteCoalescer::new();
        timeout(Duration::from_millis(100), coalescer.wait("idle"))
            .await
            .expect("wait should not block when nothing is in flight");
    }

    #[tokio::test]
    async fn test_reader_blocks_until_writer_finishes() {
        let coalescer = Arc::new(WriteCoalescer::new());
        let slot = coalescer.begin("k1").await;

        // While the slot is held, a reader must stay parked.
        let parked = coalescer.wait("k1");
        tokio::pin!(parked);
        assert!(timeout(Duration::from_millis(50), &mut parked).await.is_err());

        drop(slot);
        timeout(Duration::from_millis(500), parked)
            .await
            .expect("reader should be released once the writer finishes");
    }

    #[tokio::test]
    async fn test_second_writer_queues_behind_first() {
        let coalescer = Arc::new(WriteCoalescer::new());
        let first = coalescer.begin("k1").await;

        let contender = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                let _slot = coalescer.begin("k1").await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished(), "second writer raced the first");

        drop(first);
        timeout(Duration::from_millis(500), contender)
            .await
            .expect("queued writer should claim the slot")
            .unwrap();
        assert!(!coalescer.in_flight("k1"));
    }

    #[tokio::test]
    async fn test_different_keys_do_not_contend() {
        let coalescer = WriteCoalescer::new();
        let _slot = coalescer.begin("a").await;
        timeout(Duration::from_millis(100), coalescer.begin("b"))
            .await
            .expect("unrelated keys must not block each other");
    }
}
