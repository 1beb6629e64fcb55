//! Backend Contract
//!
//! [`StorageBackend`] is the single contract all four adapters implement.
//! Callers above it (the [`crate::engine::StorageEngine`] facade and, through
//! it, the feature modules) never learn which adapter is active; every
//! operation returns a normalized result with identical observable semantics
//! across adapters.
//!
//! Adapters receive keys with the namespace prefix already applied and must
//! return them unstripped; prefix handling belongs to the facade alone.
//!
//! ## Semantics every adapter enforces
//!
//! - Expired scalar entries read as absent and are removed lazily.
//! - Sorted sets iterate in canonical order (score ascending, ties by member
//!   ascending); reverse queries return the exact reverse.
//! - Range bounds follow the negative-index convention with inclusive `stop`.
//! - `zadd` reports 1 for an insert and 0 for a score update, even where the
//!   native upsert cannot tell the difference without an existence check.
//! - Numeric operations fail with a type error on non-integral stored values,
//!   never coerce silently.
//! - Not-found is `None`/`false`/empty, never an error.

pub mod memory;
pub mod mongo;
pub mod postgres;
pub mod redis;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::ops::{Op, OpResult, ScoreBound, ScoredMember};
use crate::value::Value;

/// The storage contract implemented by every adapter.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Adapter name, for logging.
    fn name(&self) -> &'static str;

    /// Whether this adapter relies on the active sweeper for expiry.
    /// Backends with native TTL handling return `false`.
    fn needs_sweeper(&self) -> bool {
        true
    }

    // ── Scalar key-value ─────────────────────────────────────────

    /// Read a scalar key. Expired entries read as absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Write a scalar key. A TTL overwrites any existing expiry; no TTL
    /// clears it. A zero or negative TTL makes the key immediately absent.
    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<i64>) -> StoreResult<()>;

    /// Delete a scalar key. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Whether a scalar key exists (and has not expired).
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Add `amount` to a scalar integer, treating absent as 0.
    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64>;

    /// Read several scalar keys; the result aligns with the requested order.
    async fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<Value>>>;

    /// Write several scalar keys without TTLs.
    async fn mset(&self, entries: &[(&str, Value)]) -> StoreResult<()>;

    /// Scalar keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Delete scalar keys matching a glob pattern. Returns the count removed.
    async fn clear(&self, pattern: &str) -> StoreResult<u64>;

    /// Set a TTL on an existing scalar key. Returns whether the key existed.
    async fn expire(&self, key: &str, seconds: i64) -> StoreResult<bool>;

    /// Remaining TTL in seconds: `-1` when the key has no expiry, `-2` when
    /// the key is absent.
    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    // ── Sorted set ───────────────────────────────────────────────

    /// Add or update a member. Returns 1 for an insert, 0 for an update.
    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64>;

    /// Remove a member. Returns the count removed.
    async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64>;

    /// Members in canonical order, by inclusive index range.
    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Members in reverse canonical order, by inclusive index range.
    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;

    /// Like [`zrange`](Self::zrange), with scores.
    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>>;

    /// Like [`zrevrange`](Self::zrevrange), with scores.
    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>>;

    /// Zero-based rank in canonical order, `None` when absent.
    async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>>;

    /// Zero-based rank in reverse canonical order, `None` when absent.
    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>>;

    /// A member's score, `None` when absent.
    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>>;

    /// Count members with scores inside the inclusive bounds.
    async fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<u64>;

    /// Add `delta` to a member's score, creating it at `delta` when absent.
    /// Returns the new score.
    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64>;

    /// Number of members in the set.
    async fn zcard(&self, key: &str) -> StoreResult<u64>;

    // ── List ─────────────────────────────────────────────────────

    /// Push values onto the head. `lpush(k, [a, b])` yields `[b, a, ...]`.
    /// Returns the new length.
    async fn lpush(&self, key: &str, values: &[Value]) -> StoreResult<u64>;

    /// Push values onto the tail. `rpush(k, [a, b])` yields `[..., a, b]`.
    /// Returns the new length.
    async fn rpush(&self, key: &str, values: &[Value]) -> StoreResult<u64>;

    /// Pop from the head. `None` when empty.
    async fn lpop(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Pop from the tail. `None` when empty.
    async fn rpop(&self, key: &str) -> StoreResult<Option<Value>>;

    /// Inclusive slice with negative-index support.
    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>>;

    /// List length, 0 when absent.
    async fn llen(&self, key: &str) -> StoreResult<u64>;

    // ── Set ──────────────────────────────────────────────────────

    /// Add members. Re-adding an existing member is a no-op. Returns the
    /// count of members actually added.
    async fn sadd(&self, key: &str, members: &[Value]) -> StoreResult<u64>;

    /// Remove members. Returns the count removed.
    async fn srem(&self, key: &str, members: &[Value]) -> StoreResult<u64>;

    /// All members, in no particular order.
    async fn smembers(&self, key: &str) -> StoreResult<Vec<Value>>;

    /// Membership test.
    async fn sismember(&self, key: &str, member: &Value) -> StoreResult<bool>;

    /// Set cardinality, 0 when absent.
    async fn scard(&self, key: &str) -> StoreResult<u64>;

    // ── Hash ─────────────────────────────────────────────────────

    /// Set a field.
    async fn hset(&self, key: &str, field: &str, value: &Value) -> StoreResult<()>;

    /// Read a field, `None` when absent.
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Value>>;

    /// All fields and values, empty when absent.
    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, Value>>;

    /// Delete fields. Returns the count of fields that existed.
    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64>;

    /// Add `amount` to an integer field, treating absent as 0.
    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64>;

    // ── Transactions and lifecycle ───────────────────────────────

    /// Execute an ordered batch as an all-or-nothing unit, to the strongest
    /// guarantee the backend natively offers. On failure nothing from the
    /// batch remains observable (where rollback is supported) and the
    /// triggering error propagates wrapped in
    /// [`crate::StoreError::Transaction`].
    async fn transaction(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>>;

    /// Remove expired scalar entries. Returns the count removed. Called by
    /// the active sweeper; a no-op for backends with native TTL handling.
    async fn purge_expired(&self) -> StoreResult<u64>;

    /// Release backend resources. The engine calls this on disconnect.
    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
