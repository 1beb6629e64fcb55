//! In-Memory Adapter
//!
//! Five maps behind one `RwLock`, one per data structure. Every operation is
//! a synchronous mutation with no await point inside, so interleavings can
//! only occur between complete operations, never inside one. That property
//! is what makes the transaction path all-or-nothing: the whole batch runs
//! under a single write lock against a snapshot that is restored on failure.
//!
//! Values are held in their encoded textual form, the same form the Redis
//! and Postgres adapters store, so all four backends observe the same
//! serialization boundary.
//!
//! Expiry follows the two-path scheme: reads check `expires_at` against now
//! and drop expired entries on the spot, and [`purge_expired`] sweeps the
//! rest on the active interval.
//!
//! [`purge_expired`]: StorageBackend::purge_expired

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::ops::{cmp_score_member, slice_range, Op, OpResult, ScoreBound, ScoredMember};
use crate::pattern::GlobPattern;
use crate::value::{self, Value};

use super::StorageBackend;

/// A scalar entry with optional expiry.
#[derive(Debug, Clone)]
struct ScalarEntry {
    /// Encoded value
    value: String,
    /// Absolute expiry instant, `None` for no expiry
    expires_at: Option<Instant>,
}

impl ScalarEntry {
    fn new(value: String, ttl_seconds: Option<i64>) -> Self {
        Self {
            value,
            expires_at: ttl_seconds.map(expiry_instant),
        }
    }

    #[inline]
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() >= exp)
            .unwrap_or(false)
    }
}

/// A non-positive TTL maps to "already expired".
fn expiry_instant(ttl_seconds: i64) -> Instant {
    if ttl_seconds > 0 {
        Instant::now() + Duration::from_secs(ttl_seconds as u64)
    } else {
        Instant::now()
    }
}

/// All stored data. Cloneable so a transaction can snapshot it.
#[derive(Debug, Default, Clone)]
struct Inner {
    kv: HashMap<String, ScalarEntry>,
    zsets: HashMap<String, HashMap<String, f64>>,
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

impl Inner {
    // ── Scalar key-value ─────────────────────────────────────────

    fn get(&mut self, key: &str) -> Option<String> {
        match self.kv.get(key) {
            Some(entry) if entry.is_expired() => {
                self.kv.remove(key);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    fn set(&mut self, key: &str, raw: String, ttl_seconds: Option<i64>) {
        // An overwrite without a TTL clears any previous expiry.
        self.kv
            .insert(key.to_string(), ScalarEntry::new(raw, ttl_seconds));
    }

    fn delete(&mut self, key: &str) -> bool {
        match self.kv.remove(key) {
            Some(entry) => !entry.is_expired(),
            None => false,
        }
    }

    fn exists(&self, key: &str) -> bool {
        self.kv.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    fn increment(&mut self, key: &str, amount: i64) -> StoreResult<i64> {
        let (current, expires_at) = match self.kv.get(key) {
            Some(entry) if !entry.is_expired() => {
                (value::coerce_i64(&entry.value, key)?, entry.expires_at)
            }
            _ => (0, None),
        };
        let next = current
            .checked_add(amount)
            .ok_or_else(|| StoreError::backend(format!("increment overflow at {key}")))?;
        self.kv.insert(
            key.to_string(),
            ScalarEntry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    fn keys(&self, pattern: &GlobPattern) -> Vec<String> {
        self.kv
            .iter()
            .filter(|(k, e)| !e.is_expired() && pattern.matches(k))
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn clear(&mut self, pattern: &GlobPattern) -> u64 {
        let before = self.kv.len();
        self.kv
            .retain(|k, e| e.is_expired() || !pattern.matches(k));
        (before - self.kv.len()) as u64
    }

    fn expire(&mut self, key: &str, seconds: i64) -> bool {
        match self.kv.get_mut(key) {
            Some(entry) if !entry.is_expired() => {
                entry.expires_at = Some(expiry_instant(seconds));
                true
            }
            Some(_) => {
                self.kv.remove(key);
                false
            }
            None => false,
        }
    }

    fn ttl(&self, key: &str) -> i64 {
        match self.kv.get(key) {
            Some(entry) if !entry.is_expired() => match entry.expires_at {
                Some(exp) => exp
                    .saturating_duration_since(Instant::now())
                    .as_secs_f64()
                    .ceil() as i64,
                None => -1,
            },
            _ => -2,
        }
    }

    // ── Sorted set ───────────────────────────────────────────────

    fn zadd(&mut self, key: &str, score: f64, member: &str) -> u64 {
        let zs = self.zsets.entry(key.to_string()).or_default();
        match zs.insert(member.to_string(), score) {
            None => 1,
            Some(_) => 0,
        }
    }

    fn zrem(&mut self, key: &str, member: &str) -> u64 {
        let Some(zs) = self.zsets.get_mut(key) else {
            return 0;
        };
        let removed = zs.remove(member).is_some();
        if zs.is_empty() {
            self.zsets.remove(key);
        }
        removed as u64
    }

    /// Members with scores in canonical order.
    fn zsorted(&self, key: &str) -> Vec<ScoredMember> {
        let Some(zs) = self.zsets.get(key) else {
            return Vec::new();
        };
        let mut pairs: Vec<ScoredMember> = zs
            .iter()
            .map(|(m, &s)| ScoredMember {
                member: m.clone(),
                score: s,
            })
            .collect();
        pairs.sort_by(|a, b| cmp_score_member(a.score, &a.member, b.score, &b.member));
        pairs
    }

    fn zrange_scored(&self, key: &str, start: i64, stop: i64, rev: bool) -> Vec<ScoredMember> {
        let mut sorted = self.zsorted(key);
        if rev {
            sorted.reverse();
        }
        slice_range(&sorted, start, stop)
    }

    fn zrank(&self, key: &str, member: &str, rev: bool) -> Option<u64> {
        let Some(zs) = self.zsets.get(key) else {
            return None;
        };
        let score = *zs.get(member)?;
        let ahead = zs
            .iter()
            .filter(|(m, &s)| {
                if rev {
                    cmp_score_member(s, m, score, member).is_gt()
                } else {
                    cmp_score_member(s, m, score, member).is_lt()
                }
            })
            .count();
        Some(ahead as u64)
    }

    fn zscore(&self, key: &str, member: &str) -> Option<f64> {
        self.zsets.get(key)?.get(member).copied()
    }

    fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> u64 {
        let Some(zs) = self.zsets.get(key) else {
            return 0;
        };
        zs.values()
            .filter(|&&s| min.admits_as_min(s) && max.admits_as_max(s))
            .count() as u64
    }

    fn zincrby(&mut self, key: &str, delta: f64, member: &str) -> f64 {
        let zs = self.zsets.entry(key.to_string()).or_default();
        let score = zs.get(member).copied().unwrap_or(0.0) + delta;
        zs.insert(member.to_string(), score);
        score
    }

    fn zcard(&self, key: &str) -> u64 {
        self.zsets.get(key).map(|zs| zs.len() as u64).unwrap_or(0)
    }

    // ── List ─────────────────────────────────────────────────────

    fn lpush(&mut self, key: &str, raws: Vec<String>) -> u64 {
        let list = self.lists.entry(key.to_string()).or_default();
        // Each value goes to the head in call order, so the first argument
        // ends up closest to the head after the multi-value reversal.
        for raw in raws {
            list.push_front(raw);
        }
        list.len() as u64
    }

    fn rpush(&mut self, key: &str, raws: Vec<String>) -> u64 {
        let list = self.lists.entry(key.to_string()).or_default();
        for raw in raws {
            list.push_back(raw);
        }
        list.len() as u64
    }

    fn lpop(&mut self, key: &str) -> Option<String> {
        let list = self.lists.get_mut(key)?;
        let popped = list.pop_front();
        if list.is_empty() {
            self.lists.remove(key);
        }
        popped
    }

    fn rpop(&mut self, key: &str) -> Option<String> {
        let list = self.lists.get_mut(key)?;
        let popped = list.pop_back();
        if list.is_empty() {
            self.lists.remove(key);
        }
        popped
    }

    fn lrange(&self, key: &str, start: i64, stop: i64) -> Vec<String> {
        let Some(list) = self.lists.get(key) else {
            return Vec::new();
        };
        let items: Vec<String> = list.iter().cloned().collect();
        slice_range(&items, start, stop)
    }

    fn llen(&self, key: &str) -> u64 {
        self.lists.get(key).map(|l| l.len() as u64).unwrap_or(0)
    }

    // ── Set ──────────────────────────────────────────────────────

    fn sadd(&mut self, key: &str, raws: Vec<String>) -> u64 {
        let set = self.sets.entry(key.to_string()).or_default();
        raws.into_iter().filter(|raw| set.insert(raw.clone())).count() as u64
    }

    fn srem(&mut self, key: &str, raws: Vec<String>) -> u64 {
        let Some(set) = self.sets.get_mut(key) else {
            return 0;
        };
        let removed = raws.iter().filter(|raw| set.remove(raw.as_str())).count();
        if set.is_empty() {
            self.sets.remove(key);
        }
        removed as u64
    }

    fn smembers(&self, key: &str) -> Vec<String> {
        self.sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn sismember(&self, key: &str, raw: &str) -> bool {
        self.sets.get(key).map(|s| s.contains(raw)).unwrap_or(false)
    }

    fn scard(&self, key: &str) -> u64 {
        self.sets.get(key).map(|s| s.len() as u64).unwrap_or(0)
    }

    // ── Hash ─────────────────────────────────────────────────────

    fn hset(&mut self, key: &str, field: &str, raw: String) {
        self.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), raw);
    }

    fn hget(&self, key: &str, field: &str) -> Option<String> {
        self.hashes.get(key)?.get(field).cloned()
    }

    fn hgetall(&self, key: &str) -> HashMap<String, String> {
        self.hashes.get(key).cloned().unwrap_or_default()
    }

    fn hdel(&mut self, key: &str, fields: &[&str]) -> u64 {
        let Some(hash) = self.hashes.get_mut(key) else {
            return 0;
        };
        let removed = fields.iter().filter(|f| hash.remove(**f).is_some()).count();
        if hash.is_empty() {
            self.hashes.remove(key);
        }
        removed as u64
    }

    fn hincrby(&mut self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        let hash = self.hashes.entry(key.to_string()).or_default();
        let current = match hash.get(field) {
            Some(raw) => value::coerce_i64(raw, &format!("{key}.{field}"))?,
            None => 0,
        };
        let next = current.checked_add(amount).ok_or_else(|| {
            StoreError::backend(format!("increment overflow at {key}.{field}"))
        })?;
        hash.insert(field.to_string(), next.to_string());
        Ok(next)
    }

    // ── Transaction dispatch ─────────────────────────────────────

    fn apply(&mut self, op: &Op) -> StoreResult<OpResult> {
        Ok(match op {
            Op::Set {
                key,
                value,
                ttl_seconds,
            } => {
                self.set(key, value::encode(value)?, *ttl_seconds);
                OpResult::None
            }
            Op::Get { key } => OpResult::Value(self.get(key).map(|raw| value::decode(&raw))),
            Op::Delete { key } => OpResult::Bool(self.delete(key)),
            Op::Incr { key, amount } => OpResult::Int(self.increment(key, *amount)?),
            Op::Expire { key, seconds } => OpResult::Bool(self.expire(key, *seconds)),
            Op::Zadd { key, score, member } => OpResult::Int(self.zadd(key, *score, member) as i64),
            Op::Zrem { key, member } => OpResult::Int(self.zrem(key, member) as i64),
            Op::Zincrby { key, delta, member } => {
                OpResult::Float(self.zincrby(key, *delta, member))
            }
            Op::Lpush { key, values } => OpResult::Int(self.lpush(key, encode_all(values)?) as i64),
            Op::Rpush { key, values } => OpResult::Int(self.rpush(key, encode_all(values)?) as i64),
            Op::Sadd { key, members } => OpResult::Int(self.sadd(key, encode_all(members)?) as i64),
            Op::Srem { key, members } => OpResult::Int(self.srem(key, encode_all(members)?) as i64),
            Op::Hset { key, field, value } => {
                self.hset(key, field, value::encode(value)?);
                OpResult::None
            }
            Op::Hdel { key, fields } => {
                let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
                OpResult::Int(self.hdel(key, &refs) as i64)
            }
            Op::Hincrby { key, field, amount } => {
                OpResult::Int(self.hincrby(key, field, *amount)?)
            }
        })
    }
}

fn encode_all(values: &[Value]) -> StoreResult<Vec<String>> {
    values.iter().map(value::encode).collect()
}

/// The in-memory adapter.
pub struct MemoryBackend {
    inner: RwLock<Inner>,
}

impl MemoryBackend {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.write().get(key).map(|raw| value::decode(&raw)))
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<i64>) -> StoreResult<()> {
        let raw = value::encode(value)?;
        self.write().set(key, raw, ttl_seconds);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self.write().delete(key))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.read().exists(key))
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.write().increment(key, amount)
    }

    async fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<Value>>> {
        let mut inner = self.write();
        Ok(keys
            .iter()
            .map(|k| inner.get(k).map(|raw| value::decode(&raw)))
            .collect())
    }

    async fn mset(&self, entries: &[(&str, Value)]) -> StoreResult<()> {
        let mut inner = self.write();
        for (key, value) in entries {
            let raw = value::encode(value)?;
            inner.set(key, raw, None);
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        Ok(self.read().keys(&GlobPattern::new(pattern)))
    }

    async fn clear(&self, pattern: &str) -> StoreResult<u64> {
        Ok(self.write().clear(&GlobPattern::new(pattern)))
    }

    async fn expire(&self, key: &str, seconds: i64) -> StoreResult<bool> {
        Ok(self.write().expire(key, seconds))
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        Ok(self.read().ttl(key))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64> {
        Ok(self.write().zadd(key, score, member))
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64> {
        Ok(self.write().zrem(key, member))
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        Ok(self
            .read()
            .zrange_scored(key, start, stop, false)
            .into_iter()
            .map(|sm| sm.member)
            .collect())
    }

    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        Ok(self
            .read()
            .zrange_scored(key, start, stop, true)
            .into_iter()
            .map(|sm| sm.member)
            .collect())
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        Ok(self.read().zrange_scored(key, start, stop, false))
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        Ok(self.read().zrange_scored(key, start, stop, true))
    }

    async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        Ok(self.read().zrank(key, member, false))
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        Ok(self.read().zrank(key, member, true))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        Ok(self.read().zscore(key, member))
    }

    async fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<u64> {
        Ok(self.read().zcount(key, min, max))
    }

    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64> {
        Ok(self.write().zincrby(key, delta, member))
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.read().zcard(key))
    }

    async fn lpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        let raws = encode_all(values)?;
        Ok(self.write().lpush(key, raws))
    }

    async fn rpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        let raws = encode_all(values)?;
        Ok(self.write().rpush(key, raws))
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.write().lpop(key).map(|raw| value::decode(&raw)))
    }

    async fn rpop(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.write().rpop(key).map(|raw| value::decode(&raw)))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        Ok(self
            .read()
            .lrange(key, start, stop)
            .iter()
            .map(|raw| value::decode(raw))
            .collect())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        Ok(self.read().llen(key))
    }

    async fn sadd(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        let raws = encode_all(members)?;
        Ok(self.write().sadd(key, raws))
    }

    async fn srem(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        let raws = encode_all(members)?;
        Ok(self.write().srem(key, raws))
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Value>> {
        Ok(self
            .read()
            .smembers(key)
            .iter()
            .map(|raw| value::decode(raw))
            .collect())
    }

    async fn sismember(&self, key: &str, member: &Value) -> StoreResult<bool> {
        let raw = value::encode(member)?;
        Ok(self.read().sismember(key, &raw))
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.read().scard(key))
    }

    async fn hset(&self, key: &str, field: &str, value: &Value) -> StoreResult<()> {
        let raw = value::encode(value)?;
        self.write().hset(key, field, raw);
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Value>> {
        Ok(self.read().hget(key, field).map(|raw| value::decode(&raw)))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, Value>> {
        Ok(self
            .read()
            .hgetall(key)
            .into_iter()
            .map(|(f, raw)| (f, value::decode(&raw)))
            .collect())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64> {
        Ok(self.write().hdel(key, fields))
    }

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        self.write().hincrby(key, field, amount)
    }

    async fn transaction(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
        let mut inner = self.write();
        let snapshot = inner.clone();
        let mut results = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            match inner.apply(op) {
                Ok(result) => results.push(result),
                Err(err) => {
                    *inner = snapshot;
                    return Err(StoreError::transaction(index, err));
                }
            }
        }
        Ok(results)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let mut inner = self.write();
        let before = inner.kv.len();
        inner.kv.retain(|_, entry| !entry.is_expired());
        Ok((before - inner.kv.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryBackend::new();
        store.set("key", &json!("value"), None).await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), Some(json!("value")));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = MemoryBackend::new();
        assert_eq!(store.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryBackend::new();
        store.set("key", &json!(1), None).await.unwrap();
        assert!(store.delete("key").await.unwrap());
        assert_eq!(store.get("key").await.unwrap(), None);
        assert!(!store.delete("key").await.unwrap());
    }

    #[tokio::test]
    async fn test_immediate_expiry() {
        let store = MemoryBackend::new();
        store.set("key", &json!("v"), Some(0)).await.unwrap();
        assert_eq!(store.get("key").await.unwrap(), None);
        assert!(!store.exists("key").await.unwrap());
        assert_eq!(store.ttl("key").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_set_without_ttl_clears_expiry() {
        let store = MemoryBackend::new();
        store.set("key", &json!("v"), Some(100)).await.unwrap();
        assert!(store.ttl("key").await.unwrap() > 0);
        store.set("key", &json!("v2"), None).await.unwrap();
        assert_eq!(store.ttl("key").await.unwrap(), -1);
    }

    #[tokio::test]
    async fn test_increment() {
        let store = MemoryBackend::new();
        assert_eq!(store.increment("counter", 1).await.unwrap(), 1);
        assert_eq!(store.increment("counter", 5).await.unwrap(), 6);

        store.set("text", &json!("hello"), None).await.unwrap();
        assert!(matches!(
            store.increment("text", 1).await,
            Err(StoreError::NotNumeric { .. })
        ));
    }

    #[tokio::test]
    async fn test_increment_preserves_ttl() {
        let store = MemoryBackend::new();
        store.set("counter", &json!(10), Some(100)).await.unwrap();
        store.increment("counter", 1).await.unwrap();
        assert!(store.ttl("counter").await.unwrap() > 0);
    }

    #[tokio::test]
    async fn test_mget_alignment() {
        let store = MemoryBackend::new();
        store.set("a", &json!(1), None).await.unwrap();
        store.set("c", &json!(3), None).await.unwrap();
        let values = store.mget(&["a", "b", "c"]).await.unwrap();
        assert_eq!(values, vec![Some(json!(1)), None, Some(json!(3))]);
    }

    #[tokio::test]
    async fn test_keys_and_clear() {
        let store = MemoryBackend::new();
        store.set("user:1", &json!(1), None).await.unwrap();
        store.set("user:2", &json!(2), None).await.unwrap();
        store.set("other", &json!(3), None).await.unwrap();

        let mut keys = store.keys("user:*").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["user:1", "user:2"]);

        assert_eq!(store.clear("user:*").await.unwrap(), 2);
        assert!(store.exists("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_zset_ordering_and_ties() {
        let store = MemoryBackend::new();
        store.zadd("lb", 2.0, "b").await.unwrap();
        store.zadd("lb", 1.0, "c").await.unwrap();
        store.zadd("lb", 2.0, "a").await.unwrap();

        // Ties break by ascending member; reverse is the exact reverse.
        assert_eq!(store.zrange("lb", 0, -1).await.unwrap(), vec!["c", "a", "b"]);
        assert_eq!(
            store.zrevrange("lb", 0, -1).await.unwrap(),
            vec!["b", "a", "c"]
        );
    }

    #[tokio::test]
    async fn test_zadd_reports_new_vs_update() {
        let store = MemoryBackend::new();
        assert_eq!(store.zadd("lb", 1.0, "u").await.unwrap(), 1);
        assert_eq!(store.zadd("lb", 9.0, "u").await.unwrap(), 0);
        assert_eq!(store.zscore("lb", "u").await.unwrap(), Some(9.0));
        assert_eq!(store.zcard("lb").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_zrank_and_zrevrank() {
        let store = MemoryBackend::new();
        store.zadd("lb", 100.0, "u1").await.unwrap();
        store.zadd("lb", 200.0, "u2").await.unwrap();
        store.zadd("lb", 150.0, "u3").await.unwrap();

        assert_eq!(store.zrank("lb", "u1").await.unwrap(), Some(0));
        assert_eq!(store.zrevrank("lb", "u1").await.unwrap(), Some(2));
        assert_eq!(store.zrank("lb", "missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_zcount_bounds() {
        let store = MemoryBackend::new();
        for (score, member) in [(10.0, "a"), (20.0, "b"), (30.0, "c")] {
            store.zadd("z", score, member).await.unwrap();
        }
        assert_eq!(
            store
                .zcount("z", ScoreBound::NegInf, ScoreBound::PosInf)
                .await
                .unwrap(),
            3
        );
        assert_eq!(
            store
                .zcount("z", ScoreBound::Value(15.0), ScoreBound::Value(30.0))
                .await
                .unwrap(),
            2
        );
    }

    #[tokio::test]
    async fn test_list_push_order() {
        let store = MemoryBackend::new();
        store.lpush("l", &[json!("c")]).await.unwrap();
        store.lpush("l", &[json!("b")]).await.unwrap();
        store.lpush("l", &[json!("a")]).await.unwrap();
        assert_eq!(
            store.lrange("l", 0, -1).await.unwrap(),
            vec![json!("a"), json!("b"), json!("c")]
        );

        store.rpush("l", &[json!("d"), json!("e")]).await.unwrap();
        assert_eq!(store.llen("l").await.unwrap(), 5);
        assert_eq!(store.rpop("l").await.unwrap(), Some(json!("e")));
        assert_eq!(store.lpop("l").await.unwrap(), Some(json!("a")));
    }

    #[tokio::test]
    async fn test_lpush_multi_value_reversal() {
        let store = MemoryBackend::new();
        store.lpush("l", &[json!("a"), json!("b")]).await.unwrap();
        assert_eq!(
            store.lrange("l", 0, -1).await.unwrap(),
            vec![json!("b"), json!("a")]
        );
    }

    #[tokio::test]
    async fn test_set_idempotence() {
        let store = MemoryBackend::new();
        assert_eq!(store.sadd("s", &[json!("m")]).await.unwrap(), 1);
        assert_eq!(store.sadd("s", &[json!("m")]).await.unwrap(), 0);
        assert_eq!(store.scard("s").await.unwrap(), 1);
        assert!(store.sismember("s", &json!("m")).await.unwrap());
        assert_eq!(store.srem("s", &[json!("m")]).await.unwrap(), 1);
        assert_eq!(store.scard("s").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_hash_operations() {
        let store = MemoryBackend::new();
        store.hset("h", "pts", &json!(100)).await.unwrap();
        assert_eq!(store.hincrby("h", "pts", -30).await.unwrap(), 70);

        store.hset("h", "name", &json!("alice")).await.unwrap();
        assert!(matches!(
            store.hincrby("h", "name", 1).await,
            Err(StoreError::NotNumeric { .. })
        ));

        let all = store.hgetall("h").await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all["pts"], json!(70));

        assert_eq!(store.hdel("h", &["pts", "missing"]).await.unwrap(), 1);
        assert_eq!(store.hget("h", "pts").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_transaction_rolls_back() {
        let store = MemoryBackend::new();
        store.set("text", &json!("oops"), None).await.unwrap();

        let ops = vec![
            Op::Set {
                key: "a".into(),
                value: json!(1),
                ttl_seconds: None,
            },
            Op::Incr {
                key: "text".into(),
                amount: 1,
            },
        ];
        let err = store.transaction(&ops).await.unwrap_err();
        assert!(matches!(err, StoreError::Transaction { index: 1, .. }));

        // Nothing from the batch is observable.
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("text").await.unwrap(), Some(json!("oops")));
    }

    #[tokio::test]
    async fn test_transaction_commits() {
        let store = MemoryBackend::new();
        let ops = vec![
            Op::Set {
                key: "a".into(),
                value: json!(1),
                ttl_seconds: None,
            },
            Op::Zadd {
                key: "lb".into(),
                score: 5.0,
                member: "u".into(),
            },
            Op::Get { key: "a".into() },
        ];
        let results = store.transaction(&ops).await.unwrap();
        assert_eq!(
            results,
            vec![
                OpResult::None,
                OpResult::Int(1),
                OpResult::Value(Some(json!(1)))
            ]
        );
        assert_eq!(store.zscore("lb", "u").await.unwrap(), Some(5.0));
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = MemoryBackend::new();
        store.set("gone", &json!(1), Some(0)).await.unwrap();
        store.set("kept", &json!(2), None).await.unwrap();
        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert!(store.exists("kept").await.unwrap());
    }
}
