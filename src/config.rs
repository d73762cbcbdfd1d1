use crate::error::{CacheError, Result};

/// Runtime configuration for the cache layer.
///
/// Built with sensible defaults and optionally overridden from `TAGCACHE_*`
/// environment variables. The same Redis URL backs both logical connections
/// (reads and writes) unless a dedicated write URL is supplied.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Redis connection string for reads (and writes, absent `write_url`).
    pub redis_url: String,
    /// Optional dedicated connection string for writes.
    pub write_url: Option<String>,
    /// Prefix for entry record keys: `"<key_prefix>:<cache_key>"`.
    pub key_prefix: String,
    /// Prefix for tag member-set and tag timestamp keys.
    pub tag_prefix: String,
    /// Extra lifetime granted to tag member sets beyond their entries'
    /// TTL, so the tag index outlives entries it may need to invalidate.
    pub tag_grace_seconds: u64,
    /// Reconnect attempts before the connection manager reports failure.
    pub retry_attempts: u32,
    /// Cap on the reconnect backoff delay.
    pub backoff_max_ms: u64,
    /// Per-command response timeout.
    pub response_timeout_ms: u64,
    /// Initial connection establishment timeout.
    pub connect_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            write_url: None,
            key_prefix: "cache".to_string(),
            tag_prefix: "tag:".to_string(),
            tag_grace_seconds: 60,
            retry_attempts: 3,
            backoff_max_ms: 2000,
            response_timeout_ms: 5000,
            connect_timeout_ms: 5000,
        }
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TAGCACHE_REDIS_URL") {
            config.redis_url = url;
        }

        if let Ok(url) = std::env::var("TAGCACHE_WRITE_URL") {
            config.write_url = Some(url);
        }

        if let Ok(prefix) = std::env::var("TAGCACHE_KEY_PREFIX") {
            config.key_prefix = prefix;
        }

        if let Ok(prefix) = std::env::var("TAGCACHE_TAG_PREFIX") {
            config.tag_prefix = prefix;
        }

        if let Ok(grace) = std::env::var("TAGCACHE_TAG_GRACE_SECONDS") {
            config.tag_grace_seconds = grace.parse().map_err(|e| {
                CacheError::Configuration(format!("Invalid tag_grace_seconds: {e}"))
            })?;
        }

        if let Ok(retries) = std::env::var("TAGCACHE_RETRY_ATTEMPTS") {
            config.retry_attempts = retries
                .parse()
                .map_err(|e| CacheError::Configuration(format!("Invalid retry_attempts: {e}")))?;
        }

        if let Ok(backoff) = std::env::var("TAGCACHE_BACKOFF_MAX_MS") {
            config.backoff_max_ms = backoff
                .parse()
                .map_err(|e| CacheError::Configuration(format!("Invalid backoff_max_ms: {e}")))?;
        }

        Ok(config)
    }

    /// Entry record key for a caller-supplied cache key.
    pub fn entry_key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Member-set key for a tag.
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{}", self.tag_prefix, tag)
    }

    /// Durable invalidation-timestamp key for a tag.
    pub fn tag_timestamp_key(&self, tag: &str) -> String {
        format!("{}{}:timestamp", self.tag_prefix, tag)
    }

    /// SCAN pattern matching every tag timestamp key under this prefix.
    pub fn tag_timestamp_pattern(&self) -> String {
        format!("{}*:timestamp", self.tag_prefix)
    }
}
