//! Redis Adapter
//!
//! The contract maps one-to-one onto native commands, which is also where the
//! canonical semantics come from: ascending score order with ascending-member
//! tie-break, negative index ranges, TTL sentinels (`-1`/`-2`), and
//! new-vs-update reporting from `ZADD` are all Redis behaviors the other
//! adapters reproduce.
//!
//! The only translations this adapter performs itself:
//!
//! - non-positive TTLs become `DEL` (the server rejects `SET ... EX 0`)
//! - score bounds become the `-inf`/`+inf` tokens `ZCOUNT` understands
//! - transactions become one `MULTI`/`EXEC` pipeline; results materialize
//!   only on full success, and there is no rollback of commands that
//!   executed before a runtime failure inside `EXEC` (documented best-effort)

use std::collections::HashMap;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{from_redis_value, RedisError};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::ops::{Op, OpResult, ScoreBound, ScoredMember};
use crate::value::{self, Value};

use super::StorageBackend;

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        StoreError::backend(err.to_string())
    }
}

/// Map a driver error on a numeric operation to the contract's type error.
fn numeric_err(target: &str, err: RedisError) -> StoreError {
    if err.to_string().contains("not an integer") {
        StoreError::not_numeric(target)
    } else {
        err.into()
    }
}

fn bound_arg(bound: ScoreBound) -> String {
    match bound {
        ScoreBound::NegInf => "-inf".to_string(),
        ScoreBound::PosInf => "+inf".to_string(),
        ScoreBound::Value(v) => v.to_string(),
    }
}

/// The Redis adapter.
pub struct RedisBackend {
    conn: ConnectionManager,
}

impl RedisBackend {
    /// Connect to the given URL. Fails fast when the server is unreachable.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::connection(e.to_string()))?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;
        debug!(url, "connected to redis");
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    /// Redis expires keys natively.
    fn needs_sweeper(&self) -> bool {
        false
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.conn();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(raw.map(|r| value::decode(&r)))
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<i64>) -> StoreResult<()> {
        let raw = value::encode(value)?;
        let mut conn = self.conn();
        match ttl_seconds {
            Some(ttl) if ttl <= 0 => {
                let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            }
            Some(ttl) => {
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(raw)
                    .arg("EX")
                    .arg(ttl)
                    .query_async(&mut conn)
                    .await?;
            }
            None => {
                // A plain SET clears any previous expiry.
                let _: () = redis::cmd("SET")
                    .arg(key)
                    .arg(raw)
                    .query_async(&mut conn)
                    .await?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn();
        let found: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(found > 0)
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.conn();
        redis::cmd("INCRBY")
            .arg(key)
            .arg(amount)
            .query_async(&mut conn)
            .await
            .map_err(|e| numeric_err(key, e))
    }

    async fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(raws
            .into_iter()
            .map(|raw| raw.map(|r| value::decode(&r)))
            .collect())
    }

    async fn mset(&self, entries: &[(&str, Value)]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut cmd = redis::cmd("MSET");
        for (key, value) in entries {
            cmd.arg(*key).arg(value::encode(value)?);
        }
        let mut conn = self.conn();
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;
        Ok(keys)
    }

    async fn clear(&self, pattern: &str) -> StoreResult<u64> {
        let keys = self.keys(pattern).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
        Ok(removed as u64)
    }

    async fn expire(&self, key: &str, seconds: i64) -> StoreResult<bool> {
        let mut conn = self.conn();
        if seconds <= 0 {
            let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            return Ok(removed > 0);
        }
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(seconds)
            .query_async(&mut conn)
            .await?;
        Ok(applied > 0)
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn();
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(ttl)
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let added: i64 = redis::cmd("ZADD")
            .arg(key)
            .arg(score)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(added as u64)
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("ZREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(removed as u64)
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("ZRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    async fn zrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        let mut conn = self.conn();
        let pairs: Vec<(String, f64)> = redis::cmd("ZRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(pairs
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        let mut conn = self.conn();
        let pairs: Vec<(String, f64)> = redis::cmd("ZREVRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .arg("WITHSCORES")
            .query_async(&mut conn)
            .await?;
        Ok(pairs
            .into_iter()
            .map(|(member, score)| ScoredMember { member, score })
            .collect())
    }

    async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn();
        let rank: Option<i64> = redis::cmd("ZRANK")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(rank.map(|r| r as u64))
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn();
        let rank: Option<i64> = redis::cmd("ZREVRANK")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(rank.map(|r| r as u64))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let mut conn = self.conn();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<u64> {
        let mut conn = self.conn();
        let count: i64 = redis::cmd("ZCOUNT")
            .arg(key)
            .arg(bound_arg(min))
            .arg(bound_arg(max))
            .query_async(&mut conn)
            .await?;
        Ok(count as u64)
    }

    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64> {
        let mut conn = self.conn();
        let score: f64 = redis::cmd("ZINCRBY")
            .arg(key)
            .arg(delta)
            .arg(member)
            .query_async(&mut conn)
            .await?;
        Ok(score)
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let card: i64 = redis::cmd("ZCARD").arg(key).query_async(&mut conn).await?;
        Ok(card as u64)
    }

    async fn lpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        let mut cmd = redis::cmd("LPUSH");
        cmd.arg(key);
        for v in values {
            cmd.arg(value::encode(v)?);
        }
        let mut conn = self.conn();
        let len: i64 = cmd.query_async(&mut conn).await?;
        Ok(len as u64)
    }

    async fn rpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        let mut cmd = redis::cmd("RPUSH");
        cmd.arg(key);
        for v in values {
            cmd.arg(value::encode(v)?);
        }
        let mut conn = self.conn();
        let len: i64 = cmd.query_async(&mut conn).await?;
        Ok(len as u64)
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.conn();
        let raw: Option<String> = redis::cmd("LPOP").arg(key).query_async(&mut conn).await?;
        Ok(raw.map(|r| value::decode(&r)))
    }

    async fn rpop(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.conn();
        let raw: Option<String> = redis::cmd("RPOP").arg(key).query_async(&mut conn).await?;
        Ok(raw.map(|r| value::decode(&r)))
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        let mut conn = self.conn();
        let raws: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut conn)
            .await?;
        Ok(raws.iter().map(|r| value::decode(r)).collect())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let len: i64 = redis::cmd("LLEN").arg(key).query_async(&mut conn).await?;
        Ok(len as u64)
    }

    async fn sadd(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        let mut cmd = redis::cmd("SADD");
        cmd.arg(key);
        for m in members {
            cmd.arg(value::encode(m)?);
        }
        let mut conn = self.conn();
        let added: i64 = cmd.query_async(&mut conn).await?;
        Ok(added as u64)
    }

    async fn srem(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        let mut cmd = redis::cmd("SREM");
        cmd.arg(key);
        for m in members {
            cmd.arg(value::encode(m)?);
        }
        let mut conn = self.conn();
        let removed: i64 = cmd.query_async(&mut conn).await?;
        Ok(removed as u64)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Value>> {
        let mut conn = self.conn();
        let raws: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(raws.iter().map(|r| value::decode(r)).collect())
    }

    async fn sismember(&self, key: &str, member: &Value) -> StoreResult<bool> {
        let raw = value::encode(member)?;
        let mut conn = self.conn();
        let found: i64 = redis::cmd("SISMEMBER")
            .arg(key)
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(found > 0)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn();
        let card: i64 = redis::cmd("SCARD").arg(key).query_async(&mut conn).await?;
        Ok(card as u64)
    }

    async fn hset(&self, key: &str, field: &str, value: &Value) -> StoreResult<()> {
        let raw = value::encode(value)?;
        let mut conn = self.conn();
        let _: i64 = redis::cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(raw)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.conn();
        let raw: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await?;
        Ok(raw.map(|r| value::decode(&r)))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, Value>> {
        let mut conn = self.conn();
        let raws: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await?;
        Ok(raws
            .into_iter()
            .map(|(f, r)| (f, value::decode(&r)))
            .collect())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("HDEL")
            .arg(key)
            .arg(fields)
            .query_async(&mut conn)
            .await?;
        Ok(removed as u64)
    }

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.conn();
        redis::cmd("HINCRBY")
            .arg(key)
            .arg(field)
            .arg(amount)
            .query_async(&mut conn)
            .await
            .map_err(|e| numeric_err(&format!("{key}.{field}"), e))
    }

    async fn transaction(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
        let mut pipe = redis::pipe();
        pipe.atomic();
        for op in ops {
            queue_op(&mut pipe, op)?;
        }

        let mut conn = self.conn();
        let replies: Vec<redis::Value> = pipe
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::transaction(0, map_exec_err(ops, e)))?;

        ops.iter()
            .zip(replies.iter())
            .enumerate()
            .map(|(index, (op, reply))| {
                convert_reply(op, reply).map_err(|e| StoreError::transaction(index, e))
            })
            .collect()
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        Ok(0)
    }
}

/// Queue one batch operation onto the MULTI pipeline.
fn queue_op(pipe: &mut redis::Pipeline, op: &Op) -> StoreResult<()> {
    match op {
        Op::Set {
            key,
            value,
            ttl_seconds,
        } => {
            let raw = value::encode(value)?;
            match ttl_seconds {
                Some(ttl) if *ttl <= 0 => {
                    pipe.cmd("DEL").arg(key);
                }
                Some(ttl) => {
                    pipe.cmd("SET").arg(key).arg(raw).arg("EX").arg(*ttl);
                }
                None => {
                    pipe.cmd("SET").arg(key).arg(raw);
                }
            }
        }
        Op::Get { key } => {
            pipe.cmd("GET").arg(key);
        }
        Op::Delete { key } => {
            pipe.cmd("DEL").arg(key);
        }
        Op::Incr { key, amount } => {
            pipe.cmd("INCRBY").arg(key).arg(*amount);
        }
        Op::Expire { key, seconds } => {
            if *seconds <= 0 {
                pipe.cmd("DEL").arg(key);
            } else {
                pipe.cmd("EXPIRE").arg(key).arg(*seconds);
            }
        }
        Op::Zadd { key, score, member } => {
            pipe.cmd("ZADD").arg(key).arg(*score).arg(member);
        }
        Op::Zrem { key, member } => {
            pipe.cmd("ZREM").arg(key).arg(member);
        }
        Op::Zincrby { key, delta, member } => {
            pipe.cmd("ZINCRBY").arg(key).arg(*delta).arg(member);
        }
        Op::Lpush { key, values } => {
            pipe.cmd("LPUSH").arg(key);
            for v in values {
                pipe.arg(value::encode(v)?);
            }
        }
        Op::Rpush { key, values } => {
            pipe.cmd("RPUSH").arg(key);
            for v in values {
                pipe.arg(value::encode(v)?);
            }
        }
        Op::Sadd { key, members } => {
            pipe.cmd("SADD").arg(key);
            for m in members {
                pipe.arg(value::encode(m)?);
            }
        }
        Op::Srem { key, members } => {
            pipe.cmd("SREM").arg(key);
            for m in members {
                pipe.arg(value::encode(m)?);
            }
        }
        Op::Hset { key, field, value } => {
            pipe.cmd("HSET").arg(key).arg(field).arg(value::encode(value)?);
        }
        Op::Hdel { key, fields } => {
            pipe.cmd("HDEL").arg(key);
            for f in fields {
                pipe.arg(f);
            }
        }
        Op::Hincrby { key, field, amount } => {
            pipe.cmd("HINCRBY").arg(key).arg(field).arg(*amount);
        }
    }
    Ok(())
}

/// Convert one EXEC reply into the operation's normalized result.
fn convert_reply(op: &Op, reply: &redis::Value) -> StoreResult<OpResult> {
    Ok(match op {
        Op::Set { .. } | Op::Hset { .. } => OpResult::None,
        Op::Get { .. } => {
            let raw: Option<String> = from_redis_value(reply)?;
            OpResult::Value(raw.map(|r| value::decode(&r)))
        }
        Op::Delete { .. } | Op::Expire { .. } => {
            let n: i64 = from_redis_value(reply)?;
            OpResult::Bool(n > 0)
        }
        Op::Incr { .. }
        | Op::Zadd { .. }
        | Op::Zrem { .. }
        | Op::Lpush { .. }
        | Op::Rpush { .. }
        | Op::Sadd { .. }
        | Op::Srem { .. }
        | Op::Hdel { .. }
        | Op::Hincrby { .. } => {
            let n: i64 = from_redis_value(reply)?;
            OpResult::Int(n)
        }
        Op::Zincrby { .. } => {
            let score: f64 = from_redis_value(reply)?;
            OpResult::Float(score)
        }
    })
}

/// Attribute an EXEC failure to the contract's error classes.
fn map_exec_err(ops: &[Op], err: RedisError) -> StoreError {
    let message = err.to_string();
    if message.contains("not an integer") {
        // Best attribution available: the first numeric op in the batch.
        let target = ops
            .iter()
            .find_map(|op| match op {
                Op::Incr { key, .. } => Some(key.clone()),
                Op::Hincrby { key, field, .. } => Some(format!("{key}.{field}")),
                _ => None,
            })
            .unwrap_or_default();
        StoreError::not_numeric(target)
    } else {
        err.into()
    }
}
