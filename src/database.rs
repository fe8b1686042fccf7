//! # Redis
//!
//! Durable storage for the archive.
//!
//! Core purpose is to hold one JSON-serialized collection per key so uploads
//! survive redeploys. Every mutation rewrites the whole value.
//!
//! ## Requirements
//!
//! - Small number of keys (one per collection)
//! - Values up to a few MB (base64 image payloads, capped per record)
//! - Max 100 records in the uploads collection, so bounded total size
//! - Concurrent in-flight requests share one connection
//!
//! ## Implementation
//!
//! - Plain string GET/SET, no hashes; the collection is a JSON array
//! - `ConnectionManager` is cloned per call, it multiplexes safely
//! - No transactions: read-modify-write races resolve last-writer-wins,
//!   which is acceptable for a personal gallery
//! - Every round-trip is bounded by a timeout so a dead Redis surfaces
//!   as an InternalError instead of a hung request

use std::time::Duration;

use async_trait::async_trait;
use redis::{
    AsyncCommands, Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tokio::time::timeout;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation timed out")]
    Timeout,
}

/// Key-value seam between the handlers and Redis. `MemoryStore` stands in
/// for tests.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError>;
}

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).unwrap();
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await
        .unwrap();

    connection_manager
}

pub struct RedisStore {
    manager: ConnectionManager,
    op_timeout: Duration,
}

impl RedisStore {
    pub fn new(manager: ConnectionManager, op_timeout: Duration) -> Self {
        Self {
            manager,
            op_timeout,
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.manager.clone();
        let value: Option<String> = timeout(self.op_timeout, connection.get(key))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut connection = self.manager.clone();
        let _: () = timeout(self.op_timeout, connection.set(key, value))
            .await
            .map_err(|_| StoreError::Timeout)??;
        Ok(())
    }
}

/// In-memory stand-in used by the handler tests.
#[derive(Default)]
pub struct MemoryStore {
    values: tokio::sync::Mutex<std::collections::HashMap<String, String>>,
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}
