//! Store backend trait and error types

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

/// Store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Command error: {0}")]
    Command(String),

    #[error("Wrong type for key: {0}")]
    WrongType(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_connection_refusal() || e.is_connection_dropped() || e.is_io_error() {
            StoreError::Connection(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

/// Shared key-value store primitives (Object Safe).
///
/// Semantics follow Redis: lists, hashes and sorted sets that become empty
/// cease to exist, and keys carrying a TTL disappear once it elapses.
/// No queue semantics live here.
#[async_trait]
pub trait StoreBackend: Send + Sync + Debug {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Check if backend is healthy
    async fn is_healthy(&self) -> bool;

    /// Push at the head of a list, returning the new length
    async fn lpush(&self, key: &str, value: &str) -> Result<i64, StoreError>;

    /// Push at the tail of a list, returning the new length
    async fn rpush(&self, key: &str, value: &str) -> Result<i64, StoreError>;

    /// Pop from the tail of a list
    async fn rpop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Pop from the tail of the first non-empty list among `keys`, waiting up
    /// to `timeout`. Returns `(key, value)`.
    async fn brpop(
        &self,
        keys: &[String],
        timeout: Duration,
    ) -> Result<Option<(String, String)>, StoreError>;

    /// List length (0 when missing)
    async fn llen(&self, key: &str) -> Result<i64, StoreError>;

    /// Inclusive list slice; negative indexes count from the tail
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Set a hash field only if absent. Returns whether it was created.
    async fn hset_nx(&self, key: &str, field: &str, value: &str) -> Result<bool, StoreError>;

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// Remove hash fields, returning how many existed
    async fn hdel(&self, key: &str, fields: &[String]) -> Result<i64, StoreError>;

    async fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), StoreError>;

    /// Members with `min <= score <= max`, ascending by score
    async fn zrange_by_score(&self, key: &str, min: i64, max: i64) -> Result<Vec<String>, StoreError>;

    async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set a string key only if absent. Returns whether it was created.
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool, StoreError>;

    /// Set a string key with a TTL only if absent, in one step.
    /// Returns whether it was created.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Set a string key with a TTL, overwriting any previous value
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Set a key's TTL. Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Delete a string key only while it still holds `expected`
    async fn del_if_eq(&self, key: &str, expected: &str) -> Result<bool, StoreError>;

    /// Delete keys, returning how many existed
    async fn del(&self, keys: &[String]) -> Result<i64, StoreError>;
}
