//! # Cache Entry Model and Wire Codec
//!
//! A cache entry is stored in the remote store as a single JSON string with
//! the payload carried as base64, so arbitrary binary content survives the
//! store's string value representation. The codec is the only place that
//! knows the persisted record layout.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};

/// A fully materialized cache entry, as stored and as returned on a hit.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Opaque cached artifact.
    pub payload: Vec<u8>,
    /// Tags associated with this entry at write time.
    pub tags: Vec<String>,
    /// Externally forced staleness, independent of age.
    pub stale: bool,
    /// Production timestamp, epoch milliseconds.
    pub written_at: i64,
    /// Physical lifetime of the store record, seconds.
    pub ttl_seconds: u64,
    /// Soft revalidation window, seconds. Entries older than this are
    /// advisory-stale even while the store record is still live. Callers
    /// are expected to keep this at or below `ttl_seconds`; the cache does
    /// not enforce it, a violation only produces early physical misses.
    pub revalidate_seconds: u64,
}

impl CacheEntry {
    /// Physical age in milliseconds relative to `now_ms`.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms - self.written_at
    }

    /// True once the store record should already have expired.
    pub fn expired(&self, now_ms: i64) -> bool {
        self.age_ms(now_ms) > (self.ttl_seconds as i64).saturating_mul(1000)
    }

    /// True once the entry has left its soft revalidation window.
    pub fn past_revalidate_window(&self, now_ms: i64) -> bool {
        self.age_ms(now_ms) > (self.revalidate_seconds as i64).saturating_mul(1000)
    }
}

/// Source of an entry's payload bytes at write time.
///
/// The caller may register a write before the payload is fully materialized;
/// a deferred source is drained completely into memory before serialization,
/// the record is stored as one atomic string.
pub enum PayloadSource {
    Ready(Vec<u8>),
    Deferred(BoxFuture<'static, anyhow::Result<Vec<u8>>>),
}

impl std::fmt::Debug for PayloadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PayloadSource::Ready(bytes) => f.debug_tuple("Ready").field(&bytes.len()).finish(),
            PayloadSource::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl PayloadSource {
    pub(crate) async fn resolve(self) -> Result<Vec<u8>> {
        match self {
            PayloadSource::Ready(bytes) => Ok(bytes),
            PayloadSource::Deferred(fut) => {
                fut.await.map_err(|e| CacheError::Producer(e.to_string()))
            }
        }
    }
}

/// An entry handed to `set` whose payload may still be in flight.
#[derive(Debug)]
pub struct PendingEntry {
    pub payload: PayloadSource,
    pub tags: Vec<String>,
    pub stale: bool,
    pub written_at: i64,
    pub ttl_seconds: u64,
    pub revalidate_seconds: u64,
}

impl PendingEntry {
    /// Drain the payload source and produce the storable entry.
    pub(crate) async fn materialize(self) -> Result<CacheEntry> {
        let payload = self.payload.resolve().await?;
        Ok(CacheEntry {
            payload,
            tags: self.tags,
            stale: self.stale,
            written_at: self.written_at,
            ttl_seconds: self.ttl_seconds,
            revalidate_seconds: self.revalidate_seconds,
        })
    }
}

/// Persisted record layout. Field names are part of the stored format.
#[derive(Debug, Serialize, Deserialize)]
struct WireRecord {
    value: String,
    tags: Vec<String>,
    stale: bool,
    timestamp: i64,
    expire: u64,
    revalidate: u64,
}

/// Serialize an entry into the store's string value representation.
pub fn encode(entry: &CacheEntry) -> Result<String> {
    let record = WireRecord {
        value: BASE64.encode(&entry.payload),
        tags: entry.tags.clone(),
        stale: entry.stale,
        timestamp: entry.written_at,
        expire: entry.ttl_seconds,
        revalidate: entry.revalidate_seconds,
    };
    Ok(serde_json::to_string(&record)?)
}

/// Deserialize a stored record. Any malformation is an error; the cache
/// layer treats it the same as an absent key.
pub fn decode(raw: &str) -> Result<CacheEntry> {
    let record: WireRecord = serde_json::from_str(raw)?;
    let payload = BASE64.decode(record.value.as_bytes())?;
    Ok(CacheEntry {
        payload,
        tags: record.tags,
        stale: record.stale,
        written_at: record.timestamp,
        ttl_seconds: record.expire,
        revalidate_seconds: record.revalidate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            payload: b"abc".to_vec(),
            tags: vec!["wines".to_string()],
            stale: false,
            written_at: 1_700_000_000_000,
            ttl_seconds: 3600,
            revalidate_seconds: 3600,
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let entry = sample_entry();
        let raw = encode(&entry).expect("encode failed");
        let decoded = decode(&raw).expect("decode failed");
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_wire_field_names() {
        let raw = encode(&sample_entry()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        for field in ["value", "tags", "stale", "timestamp", "expire", "revalidate"] {
            assert!(value.get(field).is_some(), "missing wire field {field}");
        }
        // payload is base64, not raw bytes
        assert_eq!(value["value"], "YWJj");
    }

    #[test]
    fn test_decode_rejects_malformed_records() {
        assert!(decode("not json at all").is_err());
        assert!(decode(r#"{"value":"YWJj"}"#).is_err());
        assert!(decode(r#"{"value":"***","tags":[],"stale":false,"timestamp":0,"expire":1,"revalidate":1}"#).is_err());
    }

    #[test]
    fn test_age_checks() {
        let entry = sample_entry();
        let now = entry.written_at + 3_599 * 1000;
        assert!(!entry.expired(now));
        assert!(!entry.past_revalidate_window(now));

        let later = entry.written_at + 3_601 * 1000;
        assert!(entry.expired(later));
        assert!(entry.past_revalidate_window(later));
    }

    #[test]
    fn test_deferred_payload_resolution() {
        let pending = PendingEntry {
            payload: PayloadSource::Deferred(Box::pin(async { Ok(b"streamed".to_vec()) })),
            tags: vec![],
            stale: false,
            written_at: 0,
            ttl_seconds: 60,
            revalidate_seconds: 60,
        };
        let entry = tokio_test::block_on(pending.materialize()).unwrap();
        assert_eq!(entry.payload, b"streamed");
    }

    #[tokio::test]
    async fn test_failed_producer_surfaces_as_producer_error() {
        let pending = PendingEntry {
            payload: PayloadSource::Deferred(Box::pin(async {
                Err(anyhow::anyhow!("upstream timed out"))
            })),
            tags: vec![],
            stale: false,
            written_at: 0,
            ttl_seconds: 60,
            revalidate_seconds: 60,
        };
        let err = pending.materialize().await.unwrap_err();
        assert!(matches!(err, CacheError::Producer(_)));
    }

    proptest! {
        #[test]
        fn prop_round_trip_arbitrary_payload(payload in proptest::collection::vec(any::<u8>(), 0..4096)) {
            let entry = CacheEntry {
                payload,
                tags: vec!["t".to_string()],
                stale: true,
                written_at: 42,
                ttl_seconds: 10,
                revalidate_seconds: 5,
            };
            let decoded = decode(&encode(&entry).unwrap()).unwrap();
            prop_assert_eq!(decoded, entry);
        }
    }
}
