//! # Redis Store Client
//!
//! Two logical connections to the remote store - one for reads, one for
//! writes - each a `ConnectionManager` opened lazily on first use and shared
//! for the process lifetime. Reconnect policy is bounded retry with capped
//! backoff; the cache layer itself never retries on top of this.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::store::{StoreBackend, StoreCommand};

pub struct RedisStore {
    read_client: Client,
    write_client: Client,
    read_conn: OnceCell<ConnectionManager>,
    write_conn: OnceCell<ConnectionManager>,
    retry_attempts: u32,
    backoff_max_ms: u64,
    response_timeout_ms: u64,
    connect_timeout_ms: u64,
}

impl RedisStore {
    pub fn new(config: &CacheConfig) -> Result<Self> {
        let read_client = Client::open(config.redis_url.as_str())?;
        let write_url = config.write_url.as_deref().unwrap_or(&config.redis_url);
        let write_client = Client::open(write_url)?;

        Ok(Self {
            read_client,
            write_client,
            read_conn: OnceCell::new(),
            write_conn: OnceCell::new(),
            retry_attempts: config.retry_attempts,
            backoff_max_ms: config.backoff_max_ms,
            response_timeout_ms: config.response_timeout_ms,
            connect_timeout_ms: config.connect_timeout_ms,
        })
    }

    fn manager_config(&self) -> ConnectionManagerConfig {
        ConnectionManagerConfig::new()
            .set_number_of_retries(self.retry_attempts as usize)
            .set_max_delay(self.backoff_max_ms)
            .set_response_timeout(Duration::from_millis(self.response_timeout_ms))
            .set_connection_timeout(Duration::from_millis(self.connect_timeout_ms))
    }

    async fn reads(&self) -> Result<ConnectionManager> {
        let conn = self
            .read_conn
            .get_or_try_init(|| async {
                info!("🚀 Opening read connection to cache store");
                let conn =
                    ConnectionManager::new_with_config(self.read_client.clone(), self.manager_config())
                        .await?;
                info!("✅ Read connection established");
                Ok::<_, redis::RedisError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }

    async fn writes(&self) -> Result<ConnectionManager> {
        let conn = self
            .write_conn
            .get_or_try_init(|| async {
                info!("🚀 Opening write connection to cache store");
                let conn = ConnectionManager::new_with_config(
                    self.write_client.clone(),
                    self.manager_config(),
                )
                .await?;
                info!("✅ Write connection established");
                Ok::<_, redis::RedisError>(conn)
            })
            .await?;
        Ok(conn.clone())
    }
}

#[async_trait]
impl StoreBackend for RedisStore {
    async fn connect(&self) -> Result<()> {
        self.reads().await?;
        self.writes().await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.reads().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.reads().await?;
        let members: Vec<String> = conn.smembers(key).await?;
        Ok(members)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.reads().await?;
        let values: Vec<Option<String>> = conn.mget(keys).await?;
        Ok(values)
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.reads().await?;
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        debug!(pattern = %pattern, count = keys.len(), "Scanned store keys");
        Ok(keys)
    }

    async fn execute_batch(&self, commands: Vec<StoreCommand>) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }

        let count = commands.len();
        let mut pipe = redis::pipe();
        for command in commands {
            match command {
                StoreCommand::SetWithExpiry {
                    key,
                    value,
                    ttl_seconds,
                } => {
                    pipe.set_ex(key, value, ttl_seconds).ignore();
                }
                StoreCommand::AddToSet {
                    key,
                    members,
                    ttl_seconds,
                } => {
                    pipe.sadd(&key, members).ignore();
                    pipe.expire(&key, ttl_seconds as i64).ignore();
                }
                StoreCommand::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                StoreCommand::Delete { keys } => {
                    if !keys.is_empty() {
                        pipe.del(keys).ignore();
                    }
                }
            }
        }

        let mut conn = self.writes().await?;
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(commands = count, "Executed pipelined store batch");
        Ok(())
    }
}
