//! Storage Engine Facade
//!
//! [`StorageEngine`] is the public entry point: it selects and connects the
//! backend, owns the sweeper lifecycle, and applies the key-prefix namespace.
//! Everything below it speaks the [`StorageBackend`] contract; everything
//! above it never learns which adapter is active.
//!
//! ## Key prefixing
//!
//! An optional namespace string is prepended to every key on the way in and
//! stripped from every key name on the way out, so multiple logical stores
//! can share one physical backend without seeing each other's keys. Adapters
//! never deal with unprefixed keys.
//!
//! ## Lifecycle
//!
//! `connect` validates configuration first (bad prefixes never reach a
//! backend), establishes the backend connection, and starts the sweeper when
//! the backend relies on one. `disconnect` stops the sweeper and releases
//! backend resources; dropping the engine stops the sweeper too.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::backend::memory::MemoryBackend;
use crate::backend::mongo::MongoBackend;
use crate::backend::postgres::PostgresBackend;
use crate::backend::redis::RedisBackend;
use crate::backend::StorageBackend;
use crate::config::{BackendConfig, StoreConfig};
use crate::error::StoreResult;
use crate::ops::{Op, OpResult, ScoreBound, ScoredMember};
use crate::sweeper::ExpirySweeper;
use crate::value::Value;

/// The polymorphic storage engine.
///
/// # Example
///
/// ```
/// use polystore::{StorageEngine, StoreConfig};
/// use serde_json::json;
///
/// # async fn example() -> polystore::StoreResult<()> {
/// let engine = StorageEngine::connect(StoreConfig::memory()).await?;
///
/// engine.set("greeting", &json!("hello"), None).await?;
/// assert_eq!(engine.get("greeting").await?, Some(json!("hello")));
///
/// engine.zadd("leaderboard", 100.0, "alice").await?;
/// engine.zadd("leaderboard", 200.0, "bob").await?;
/// assert_eq!(engine.zrevrange("leaderboard", 0, 0).await?, vec!["bob"]);
/// # Ok(())
/// # }
/// ```
pub struct StorageEngine {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
    sweeper: Option<ExpirySweeper>,
}

impl StorageEngine {
    /// Validate the configuration, connect the selected backend, and start
    /// the sweeper where the backend needs one.
    pub async fn connect(config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let table_prefix = config.effective_table_prefix().to_string();

        let backend: Arc<dyn StorageBackend> = match &config.backend {
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
            BackendConfig::Redis { url } => Arc::new(RedisBackend::connect(url).await?),
            BackendConfig::Mongo { url, database } => {
                Arc::new(MongoBackend::connect(url, database, &table_prefix).await?)
            }
            BackendConfig::Postgres { url } => {
                Arc::new(PostgresBackend::connect(url, &table_prefix).await?)
            }
        };

        let sweeper = backend
            .needs_sweeper()
            .then(|| ExpirySweeper::start(backend.clone(), config.sweep_interval));

        info!(backend = backend.name(), "storage engine connected");
        Ok(Self {
            backend,
            prefix: config.key_prefix.unwrap_or_default(),
            sweeper,
        })
    }

    /// Stop the sweeper and release backend resources.
    pub async fn disconnect(mut self) -> StoreResult<()> {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.stop();
        }
        info!(backend = self.backend.name(), "storage engine disconnected");
        self.backend.close().await
    }

    /// The active backend's name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    fn prefixed(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn strip(&self, key: String) -> String {
        key.strip_prefix(&self.prefix)
            .map(str::to_string)
            .unwrap_or(key)
    }

    // ── Scalar key-value ─────────────────────────────────────────

    /// Read a scalar key. Expired entries read as absent.
    pub async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        self.backend.get(&self.prefixed(key)).await
    }

    /// Write a scalar key, optionally with a TTL in seconds. A TTL replaces
    /// any existing expiry; omitting it clears one.
    pub async fn set(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<i64>,
    ) -> StoreResult<()> {
        self.backend.set(&self.prefixed(key), value, ttl_seconds).await
    }

    /// Delete a scalar key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.backend.delete(&self.prefixed(key)).await
    }

    /// Whether a scalar key exists.
    pub async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.backend.exists(&self.prefixed(key)).await
    }

    /// Add `amount` to a scalar integer, treating absent as 0.
    pub async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.backend.increment(&self.prefixed(key), amount).await
    }

    /// Subtract `amount` from a scalar integer.
    pub async fn decrement(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.backend.increment(&self.prefixed(key), -amount).await
    }

    /// Read several scalar keys; results align with the requested order.
    pub async fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<Value>>> {
        let prefixed: Vec<String> = keys.iter().map(|k| self.prefixed(k)).collect();
        let refs: Vec<&str> = prefixed.iter().map(String::as_str).collect();
        self.backend.mget(&refs).await
    }

    /// Write several scalar keys without TTLs.
    pub async fn mset(&self, entries: &[(&str, Value)]) -> StoreResult<()> {
        let prefixed: Vec<(String, Value)> = entries
            .iter()
            .map(|(k, v)| (self.prefixed(k), v.clone()))
            .collect();
        let refs: Vec<(&str, Value)> = prefixed
            .iter()
            .map(|(k, v)| (k.as_str(), v.clone()))
            .collect();
        self.backend.mset(&refs).await
    }

    /// Scalar keys matching a glob pattern, with the namespace stripped.
    pub async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let found = self.backend.keys(&self.prefixed(pattern)).await?;
        Ok(found.into_iter().map(|k| self.strip(k)).collect())
    }

    /// Delete scalar keys matching a glob pattern. Returns the count removed.
    pub async fn clear(&self, pattern: &str) -> StoreResult<u64> {
        self.backend.clear(&self.prefixed(pattern)).await
    }

    /// Set a TTL on an existing scalar key.
    pub async fn expire(&self, key: &str, seconds: i64) -> StoreResult<bool> {
        self.backend.expire(&self.prefixed(key), seconds).await
    }

    /// Remaining TTL in seconds, `-1` for no expiry, `-2` when absent.
    pub async fn ttl(&self, key: &str) -> StoreResult<i64> {
        self.backend.ttl(&self.prefixed(key)).await
    }

    // ── Sorted set ───────────────────────────────────────────────

    /// Add or update a member. Returns 1 for an insert, 0 for an update.
    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64> {
        self.backend.zadd(&self.prefixed(key), score, member).await
    }

    /// Remove a member. Returns the count removed.
    pub async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64> {
        self.backend.zrem(&self.prefixed(key), member).await
    }

    /// Members by ascending score (ties by member), inclusive index range.
    pub async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.backend.zrange(&self.prefixed(key), start, stop).await
    }

    /// Members by descending score, the exact reverse of [`zrange`](Self::zrange).
    pub async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.backend.zrevrange(&self.prefixed(key), start, stop).await
    }

    /// Like [`zrange`](Self::zrange), with scores.
    pub async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        self.backend
            .zrange_with_scores(&self.prefixed(key), start, stop)
            .await
    }

    /// Like [`zrevrange`](Self::zrevrange), with scores.
    pub async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        self.backend
            .zrevrange_with_scores(&self.prefixed(key), start, stop)
            .await
    }

    /// Zero-based ascending rank, `None` when absent.
    pub async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        self.backend.zrank(&self.prefixed(key), member).await
    }

    /// Zero-based descending rank, `None` when absent.
    pub async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        self.backend.zrevrank(&self.prefixed(key), member).await
    }

    /// A member's score, `None` when absent.
    pub async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        self.backend.zscore(&self.prefixed(key), member).await
    }

    /// Count members with scores inside the inclusive bounds.
    pub async fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<u64> {
        self.backend.zcount(&self.prefixed(key), min, max).await
    }

    /// Add `delta` to a member's score. Returns the new score.
    pub async fn zincrby(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64> {
        self.backend.zincrby(&self.prefixed(key), delta, member).await
    }

    /// Number of members in the set.
    pub async fn zcard(&self, key: &str) -> StoreResult<u64> {
        self.backend.zcard(&self.prefixed(key)).await
    }

    // ── List ─────────────────────────────────────────────────────

    /// Push values onto the head. Returns the new length.
    pub async fn lpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        self.backend.lpush(&self.prefixed(key), values).await
    }

    /// Push values onto the tail. Returns the new length.
    pub async fn rpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        self.backend.rpush(&self.prefixed(key), values).await
    }

    /// Pop from the head, `None` when empty.
    pub async fn lpop(&self, key: &str) -> StoreResult<Option<Value>> {
        self.backend.lpop(&self.prefixed(key)).await
    }

    /// Pop from the tail, `None` when empty.
    pub async fn rpop(&self, key: &str) -> StoreResult<Option<Value>> {
        self.backend.rpop(&self.prefixed(key)).await
    }

    /// Inclusive slice with negative-index support.
    pub async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        self.backend.lrange(&self.prefixed(key), start, stop).await
    }

    /// List length, 0 when absent.
    pub async fn llen(&self, key: &str) -> StoreResult<u64> {
        self.backend.llen(&self.prefixed(key)).await
    }

    // ── Set ──────────────────────────────────────────────────────

    /// Add members; re-adding is a no-op. Returns the count actually added.
    pub async fn sadd(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        self.backend.sadd(&self.prefixed(key), members).await
    }

    /// Remove members. Returns the count removed.
    pub async fn srem(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        self.backend.srem(&self.prefixed(key), members).await
    }

    /// All members, in no particular order.
    pub async fn smembers(&self, key: &str) -> StoreResult<Vec<Value>> {
        self.backend.smembers(&self.prefixed(key)).await
    }

    /// Membership test.
    pub async fn sismember(&self, key: &str, member: &Value) -> StoreResult<bool> {
        self.backend.sismember(&self.prefixed(key), member).await
    }

    /// Set cardinality, 0 when absent.
    pub async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.backend.scard(&self.prefixed(key)).await
    }

    // ── Hash ─────────────────────────────────────────────────────

    /// Set a field.
    pub async fn hset(&self, key: &str, field: &str, value: &Value) -> StoreResult<()> {
        self.backend.hset(&self.prefixed(key), field, value).await
    }

    /// Read a field, `None` when absent.
    pub async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Value>> {
        self.backend.hget(&self.prefixed(key), field).await
    }

    /// All fields and values, empty when absent.
    pub async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, Value>> {
        self.backend.hgetall(&self.prefixed(key)).await
    }

    /// Delete fields. Returns the count that existed.
    pub async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64> {
        self.backend.hdel(&self.prefixed(key), fields).await
    }

    /// Add `amount` to an integer field, treating absent as 0.
    pub async fn hincrby(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        self.backend.hincrby(&self.prefixed(key), field, amount).await
    }

    // ── Transactions ─────────────────────────────────────────────

    /// Execute an ordered batch as an all-or-nothing unit, to the strongest
    /// guarantee the active backend offers.
    pub async fn transaction(&self, mut ops: Vec<Op>) -> StoreResult<Vec<OpResult>> {
        for op in &mut ops {
            let key = op.key_mut();
            *key = format!("{}{}", self.prefix, key);
        }
        self.backend.transaction(&ops).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn engine_with_prefix(prefix: &str) -> StorageEngine {
        StorageEngine::connect(StoreConfig::memory().with_key_prefix(prefix))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_prefix() {
        let result = StorageEngine::connect(StoreConfig::memory().with_key_prefix("bad*")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_prefix_is_stripped_from_key_names() {
        let engine = engine_with_prefix("app:").await;
        engine.set("user:1", &json!(1), None).await.unwrap();
        assert_eq!(engine.keys("user:*").await.unwrap(), vec!["user:1"]);
    }

    #[tokio::test]
    async fn test_prefix_isolates_namespaces() {
        let first = engine_with_prefix("a:").await;
        first.set("shared", &json!("from-a"), None).await.unwrap();

        let second = engine_with_prefix("b:").await;
        // Separate memory backends here; the isolation that matters is that
        // the same engine never reports foreign keys through `keys`.
        second.set("shared", &json!("from-b"), None).await.unwrap();
        assert_eq!(second.get("shared").await.unwrap(), Some(json!("from-b")));
        assert_eq!(second.keys("*").await.unwrap(), vec!["shared"]);
    }

    #[tokio::test]
    async fn test_transaction_prefixes_ops() {
        let engine = engine_with_prefix("app:").await;
        engine
            .transaction(vec![Op::Set {
                key: "a".into(),
                value: json!(1),
                ttl_seconds: None,
            }])
            .await
            .unwrap();
        assert_eq!(engine.get("a").await.unwrap(), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_decrement() {
        let engine = engine_with_prefix("app:").await;
        engine.set("n", &json!(10), None).await.unwrap();
        assert_eq!(engine.decrement("n", 3).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_disconnect() {
        let engine = engine_with_prefix("app:").await;
        engine.disconnect().await.unwrap();
    }
}
