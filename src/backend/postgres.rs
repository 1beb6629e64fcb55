//! Relational Adapter (PostgreSQL)
//!
//! Five tables created at connect, named from the validated table prefix
//! (identifier characters only, so interpolation into DDL is safe):
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS {p}_kv (
//!     key        TEXT PRIMARY KEY,
//!     value      TEXT NOT NULL,
//!     expires_at TIMESTAMPTZ
//! );
//! CREATE TABLE IF NOT EXISTS {p}_zset (
//!     key    TEXT NOT NULL,
//!     member TEXT NOT NULL,
//!     score  DOUBLE PRECISION NOT NULL,
//!     PRIMARY KEY (key, member)
//! );
//! CREATE TABLE IF NOT EXISTS {p}_list (
//!     key   TEXT PRIMARY KEY,
//!     items JSONB NOT NULL DEFAULT '[]'
//! );
//! CREATE TABLE IF NOT EXISTS {p}_set (
//!     key    TEXT NOT NULL,
//!     member TEXT NOT NULL,
//!     PRIMARY KEY (key, member)
//! );
//! CREATE TABLE IF NOT EXISTS {p}_hash (
//!     key   TEXT NOT NULL,
//!     field TEXT NOT NULL,
//!     value TEXT NOT NULL,
//!     PRIMARY KEY (key, field)
//! );
//! ```
//!
//! plus indexes on `kv.expires_at` and `zset (key, score)`.
//!
//! Values are stored in encoded textual form; lists live as one JSONB array
//! per key. Everything but the DDL goes through bound parameters.
//!
//! Every row-level helper takes `&mut PgConnection`, so the transaction path
//! hands the transaction-bound connection down the call chain explicitly
//! instead of rebinding shared state. `Transaction` and `PoolConnection`
//! return the connection to the pool when dropped, on every exit path.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{PgConnection, Row};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::ops::{slice_range, Op, OpResult, ScoreBound, ScoredMember};
use crate::pattern::GlobPattern;
use crate::value::{self, Value};

use super::StorageBackend;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::backend(err.to_string())
    }
}

/// The PostgreSQL adapter.
pub struct PostgresBackend {
    pool: PgPool,
    kv: String,
    zset: String,
    list: String,
    set: String,
    hash: String,
}

impl PostgresBackend {
    /// Connect, then create tables and indexes.
    pub async fn connect(url: &str, table_prefix: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let backend = Self {
            kv: format!("{table_prefix}_kv"),
            zset: format!("{table_prefix}_zset"),
            list: format!("{table_prefix}_list"),
            set: format!("{table_prefix}_set"),
            hash: format!("{table_prefix}_hash"),
            pool,
        };
        backend.ensure_schema().await?;
        debug!(url, "connected to postgres");
        Ok(backend)
    }

    async fn ensure_schema(&self) -> StoreResult<()> {
        let statements = [
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                     key        TEXT PRIMARY KEY,
                     value      TEXT NOT NULL,
                     expires_at TIMESTAMPTZ
                 )",
                self.kv
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_expires_idx ON {} (expires_at)
                 WHERE expires_at IS NOT NULL",
                self.kv, self.kv
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                     key    TEXT NOT NULL,
                     member TEXT NOT NULL,
                     score  DOUBLE PRECISION NOT NULL,
                     PRIMARY KEY (key, member)
                 )",
                self.zset
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS {}_score_idx ON {} (key, score)",
                self.zset, self.zset
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                     key   TEXT PRIMARY KEY,
                     items JSONB NOT NULL DEFAULT '[]'
                 )",
                self.list
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                     key    TEXT NOT NULL,
                     member TEXT NOT NULL,
                     PRIMARY KEY (key, member)
                 )",
                self.set
            ),
            format!(
                "CREATE TABLE IF NOT EXISTS {} (
                     key   TEXT NOT NULL,
                     field TEXT NOT NULL,
                     value TEXT NOT NULL,
                     PRIMARY KEY (key, field)
                 )",
                self.hash
            ),
        ];
        let mut conn = self.pool.acquire().await?;
        for sql in &statements {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        Ok(())
    }

    // ── Row-level helpers, shared by standalone and transaction paths ──

    /// Live scalar value, deleting the row lazily when expired.
    async fn kv_get_raw(
        &self,
        conn: &mut PgConnection,
        key: &str,
    ) -> StoreResult<Option<String>> {
        let sql = format!(
            "SELECT value, (expires_at IS NOT NULL AND expires_at <= now()) AS expired
             FROM {} WHERE key = $1",
            self.kv
        );
        let Some(row) = sqlx::query(&sql).bind(key).fetch_optional(&mut *conn).await? else {
            return Ok(None);
        };
        if row.get::<bool, _>("expired") {
            let sql = format!("DELETE FROM {} WHERE key = $1 AND expires_at <= now()", self.kv);
            sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
            return Ok(None);
        }
        Ok(Some(row.get::<String, _>("value")))
    }

    async fn kv_set(
        &self,
        conn: &mut PgConnection,
        key: &str,
        value: &Value,
        ttl_seconds: Option<i64>,
    ) -> StoreResult<()> {
        let raw = value::encode(value)?;
        let sql = format!(
            "INSERT INTO {} (key, value, expires_at)
             VALUES ($1, $2, CASE
                 WHEN $3::bigint IS NULL THEN NULL::timestamptz
                 WHEN $3 <= 0 THEN now()
                 ELSE now() + make_interval(secs => $3::double precision)
             END)
             ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at",
            self.kv
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(raw)
            .bind(ttl_seconds)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn kv_delete(&self, conn: &mut PgConnection, key: &str) -> StoreResult<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let result = sqlx::query(&sql).bind(key).execute(&mut *conn).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn kv_increment(
        &self,
        conn: &mut PgConnection,
        key: &str,
        amount: i64,
    ) -> StoreResult<i64> {
        let base = match self.kv_get_raw(&mut *conn, key).await? {
            Some(raw) => value::coerce_i64(&raw, key)?,
            None => 0,
        };
        let next = base
            .checked_add(amount)
            .ok_or_else(|| StoreError::backend(format!("increment overflow at {key}")))?;
        // The expired row, if any, was deleted by the live read above, so an
        // update here only ever touches a live row and keeps its expiry.
        let sql = format!(
            "INSERT INTO {} (key, value, expires_at) VALUES ($1, $2, NULL)
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
            self.kv
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(next.to_string())
            .execute(&mut *conn)
            .await?;
        Ok(next)
    }

    async fn kv_expire(
        &self,
        conn: &mut PgConnection,
        key: &str,
        seconds: i64,
    ) -> StoreResult<bool> {
        let sql = format!(
            "UPDATE {} SET expires_at = CASE
                 WHEN $2 <= 0 THEN now()
                 ELSE now() + make_interval(secs => $2::double precision)
             END
             WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(seconds)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn zset_add(
        &self,
        conn: &mut PgConnection,
        key: &str,
        score: f64,
        member: &str,
    ) -> StoreResult<u64> {
        // Explicit existence check: the upsert alone cannot report
        // insert-vs-update, and the contract requires the distinction.
        let check = format!("SELECT 1 FROM {} WHERE key = $1 AND member = $2", self.zset);
        let existed = sqlx::query(&check)
            .bind(key)
            .bind(member)
            .fetch_optional(&mut *conn)
            .await?
            .is_some();

        let sql = format!(
            "INSERT INTO {} (key, member, score) VALUES ($1, $2, $3)
             ON CONFLICT (key, member) DO UPDATE SET score = EXCLUDED.score",
            self.zset
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(member)
            .bind(score)
            .execute(&mut *conn)
            .await?;
        Ok(u64::from(!existed))
    }

    async fn zset_rem(
        &self,
        conn: &mut PgConnection,
        key: &str,
        member: &str,
    ) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE key = $1 AND member = $2", self.zset);
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(member)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn zset_incrby(
        &self,
        conn: &mut PgConnection,
        key: &str,
        delta: f64,
        member: &str,
    ) -> StoreResult<f64> {
        let sql = format!(
            "INSERT INTO {z} (key, member, score) VALUES ($1, $2, $3)
             ON CONFLICT (key, member) DO UPDATE SET score = {z}.score + EXCLUDED.score
             RETURNING score",
            z = self.zset
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(member)
            .bind(delta)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.get::<f64, _>("score"))
    }

    async fn list_push(
        &self,
        conn: &mut PgConnection,
        key: &str,
        values: &[Value],
        front: bool,
    ) -> StoreResult<u64> {
        let mut raws: Vec<String> = values.iter().map(value::encode).collect::<StoreResult<_>>()?;
        if front {
            // Reversed so the first argument lands closest to the head.
            raws.reverse();
        }
        let block = Value::Array(raws.into_iter().map(Value::String).collect());
        let concat = if front {
            format!("EXCLUDED.items || {}.items", self.list)
        } else {
            format!("{}.items || EXCLUDED.items", self.list)
        };
        let sql = format!(
            "INSERT INTO {l} (key, items) VALUES ($1, $2)
             ON CONFLICT (key) DO UPDATE SET items = {concat}
             RETURNING jsonb_array_length(items)::bigint AS len",
            l = self.list
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(block)
            .fetch_one(&mut *conn)
            .await?;
        Ok(row.get::<i64, _>("len") as u64)
    }

    async fn list_pop(
        &self,
        conn: &mut PgConnection,
        key: &str,
        front: bool,
    ) -> StoreResult<Option<Value>> {
        let (extract, remove) = if front {
            ("items ->> 0", "l.items - 0")
        } else {
            ("items ->> -1", "l.items - (-1)")
        };
        let sql = format!(
            "WITH head AS (
                 SELECT key, {extract} AS popped FROM {l}
                 WHERE key = $1 AND jsonb_array_length(items) > 0
             )
             UPDATE {l} l SET items = {remove}
             FROM head h WHERE l.key = h.key
             RETURNING h.popped",
            l = self.list
        );
        let row = sqlx::query(&sql).bind(key).fetch_optional(&mut *conn).await?;
        Ok(row.map(|r| value::decode(&r.get::<String, _>("popped"))))
    }

    async fn set_add(
        &self,
        conn: &mut PgConnection,
        key: &str,
        members: &[Value],
    ) -> StoreResult<u64> {
        let raws: Vec<String> = members.iter().map(value::encode).collect::<StoreResult<_>>()?;
        if raws.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "INSERT INTO {} (key, member) SELECT $1, u.m FROM UNNEST($2::text[]) AS u(m)
             ON CONFLICT DO NOTHING",
            self.set
        );
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(raws)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn set_rem(
        &self,
        conn: &mut PgConnection,
        key: &str,
        members: &[Value],
    ) -> StoreResult<u64> {
        let raws: Vec<String> = members.iter().map(value::encode).collect::<StoreResult<_>>()?;
        let sql = format!("DELETE FROM {} WHERE key = $1 AND member = ANY($2)", self.set);
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(raws)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn hash_set(
        &self,
        conn: &mut PgConnection,
        key: &str,
        field: &str,
        value: &Value,
    ) -> StoreResult<()> {
        let raw = value::encode(value)?;
        let sql = format!(
            "INSERT INTO {} (key, field, value) VALUES ($1, $2, $3)
             ON CONFLICT (key, field) DO UPDATE SET value = EXCLUDED.value",
            self.hash
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(field)
            .bind(raw)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    async fn hash_del(
        &self,
        conn: &mut PgConnection,
        key: &str,
        fields: &[&str],
    ) -> StoreResult<u64> {
        let owned: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let sql = format!("DELETE FROM {} WHERE key = $1 AND field = ANY($2)", self.hash);
        let result = sqlx::query(&sql)
            .bind(key)
            .bind(owned)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }

    async fn hash_incrby(
        &self,
        conn: &mut PgConnection,
        key: &str,
        field: &str,
        amount: i64,
    ) -> StoreResult<i64> {
        let target = format!("{key}.{field}");
        let select = format!("SELECT value FROM {} WHERE key = $1 AND field = $2", self.hash);
        let base = sqlx::query(&select)
            .bind(key)
            .bind(field)
            .fetch_optional(&mut *conn)
            .await?
            .map(|r| value::coerce_i64(&r.get::<String, _>("value"), &target))
            .transpose()?
            .unwrap_or(0);
        let next = base
            .checked_add(amount)
            .ok_or_else(|| StoreError::backend(format!("increment overflow at {target}")))?;
        self.hash_set(conn, key, field, &Value::from(next)).await?;
        Ok(next)
    }

    /// Sorted members with scores, already sliced by the shared range rules.
    async fn zset_range(
        &self,
        conn: &mut PgConnection,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> StoreResult<Vec<ScoredMember>> {
        let order = if rev {
            "score DESC, member DESC"
        } else {
            "score ASC, member ASC"
        };
        let sql = format!(
            "SELECT member, score FROM {} WHERE key = $1 ORDER BY {order}",
            self.zset
        );
        let rows = sqlx::query(&sql).bind(key).fetch_all(&mut *conn).await?;
        let members: Vec<ScoredMember> = rows
            .iter()
            .map(|r| ScoredMember {
                member: r.get::<String, _>("member"),
                score: r.get::<f64, _>("score"),
            })
            .collect();
        Ok(slice_range(&members, start, stop))
    }

    async fn apply_op(&self, conn: &mut PgConnection, op: &Op) -> StoreResult<OpResult> {
        Ok(match op {
            Op::Set {
                key,
                value,
                ttl_seconds,
            } => {
                self.kv_set(conn, key, value, *ttl_seconds).await?;
                OpResult::None
            }
            Op::Get { key } => OpResult::Value(
                self.kv_get_raw(conn, key)
                    .await?
                    .map(|raw| value::decode(&raw)),
            ),
            Op::Delete { key } => OpResult::Bool(self.kv_delete(conn, key).await?),
            Op::Incr { key, amount } => OpResult::Int(self.kv_increment(conn, key, *amount).await?),
            Op::Expire { key, seconds } => {
                OpResult::Bool(self.kv_expire(conn, key, *seconds).await?)
            }
            Op::Zadd { key, score, member } => {
                OpResult::Int(self.zset_add(conn, key, *score, member).await? as i64)
            }
            Op::Zrem { key, member } => {
                OpResult::Int(self.zset_rem(conn, key, member).await? as i64)
            }
            Op::Zincrby { key, delta, member } => {
                OpResult::Float(self.zset_incrby(conn, key, *delta, member).await?)
            }
            Op::Lpush { key, values } => {
                OpResult::Int(self.list_push(conn, key, values, true).await? as i64)
            }
            Op::Rpush { key, values } => {
                OpResult::Int(self.list_push(conn, key, values, false).await? as i64)
            }
            Op::Sadd { key, members } => {
                OpResult::Int(self.set_add(conn, key, members).await? as i64)
            }
            Op::Srem { key, members } => {
                OpResult::Int(self.set_rem(conn, key, members).await? as i64)
            }
            Op::Hset { key, field, value } => {
                self.hash_set(conn, key, field, value).await?;
                OpResult::None
            }
            Op::Hdel { key, fields } => {
                let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
                OpResult::Int(self.hash_del(conn, key, &refs).await? as i64)
            }
            Op::Hincrby { key, field, amount } => {
                OpResult::Int(self.hash_incrby(conn, key, field, *amount).await?)
            }
        })
    }
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.pool.acquire().await?;
        Ok(self
            .kv_get_raw(&mut conn, key)
            .await?
            .map(|raw| value::decode(&raw)))
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<i64>) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.kv_set(&mut conn, key, value, ttl_seconds).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.pool.acquire().await?;
        self.kv_delete(&mut conn, key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE key = $1 AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.is_some())
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.pool.acquire().await?;
        self.kv_increment(&mut conn, key, amount).await
    }

    async fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let owned: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        let sql = format!(
            "SELECT key, value FROM {} WHERE key = ANY($1)
             AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let rows = sqlx::query(&sql).bind(owned).fetch_all(&self.pool).await?;
        let mut by_key: HashMap<String, Value> = rows
            .iter()
            .map(|r| {
                (
                    r.get::<String, _>("key"),
                    value::decode(&r.get::<String, _>("value")),
                )
            })
            .collect();
        Ok(keys.iter().map(|k| by_key.remove(*k)).collect())
    }

    async fn mset(&self, entries: &[(&str, Value)]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = entries.iter().map(|(k, _)| k.to_string()).collect();
        let raws: Vec<String> = entries
            .iter()
            .map(|(_, v)| value::encode(v))
            .collect::<StoreResult<_>>()?;
        let sql = format!(
            "INSERT INTO {} (key, value, expires_at)
             SELECT u.k, u.v, NULL FROM UNNEST($1::text[], $2::text[]) AS u(k, v)
             ON CONFLICT (key) DO UPDATE
                 SET value = EXCLUDED.value, expires_at = NULL",
            self.kv
        );
        sqlx::query(&sql)
            .bind(keys)
            .bind(raws)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let like = GlobPattern::new(pattern).to_like();
        let sql = format!(
            "SELECT key FROM {} WHERE key LIKE $1 ESCAPE '\\'
             AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let rows = sqlx::query(&sql).bind(like).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(|r| r.get::<String, _>("key")).collect())
    }

    async fn clear(&self, pattern: &str) -> StoreResult<u64> {
        let like = GlobPattern::new(pattern).to_like();
        let sql = format!(
            "DELETE FROM {} WHERE key LIKE $1 ESCAPE '\\'
             AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let result = sqlx::query(&sql).bind(like).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn expire(&self, key: &str, seconds: i64) -> StoreResult<bool> {
        let mut conn = self.pool.acquire().await?;
        self.kv_expire(&mut conn, key, seconds).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let sql = format!(
            "SELECT CASE
                 WHEN expires_at IS NULL THEN -1
                 ELSE CEIL(EXTRACT(EPOCH FROM (expires_at - now())))::bigint
             END AS ttl
             FROM {} WHERE key = $1
             AND (expires_at IS NULL OR expires_at > now())",
            self.kv
        );
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get::<i64, _>("ttl")).unwrap_or(-2))
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.zset_add(&mut conn, key, score, member).await
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.zset_rem(&mut conn, key, member).await
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        Ok(self
            .zset_range(&mut conn, key, start, stop, false)
            .await?
            .into_iter()
            .map(|sm| sm.member)
            .collect())
    }

    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        Ok(self
            .zset_range(&mut conn, key, start, stop, true)
            .await?
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
        let mut conn = self.pool.acquire().await?;
        self.zset_range(&mut conn, key, start, stop, false).await
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        let mut conn = self.pool.acquire().await?;
        self.zset_range(&mut conn, key, start, stop, true).await
    }

    async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let Some(score) = self.zscore(key, member).await? else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT COUNT(*) AS ahead FROM {}
             WHERE key = $1 AND (score < $2 OR (score = $2 AND member < $3))",
            self.zset
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(score)
            .bind(member)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(row.get::<i64, _>("ahead") as u64))
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let Some(score) = self.zscore(key, member).await? else {
            return Ok(None);
        };
        let sql = format!(
            "SELECT COUNT(*) AS ahead FROM {}
             WHERE key = $1 AND (score > $2 OR (score = $2 AND member > $3))",
            self.zset
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(score)
            .bind(member)
            .fetch_one(&self.pool)
            .await?;
        Ok(Some(row.get::<i64, _>("ahead") as u64))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let sql = format!(
            "SELECT score FROM {} WHERE key = $1 AND member = $2",
            self.zset
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(member)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<f64, _>("score")))
    }

    async fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<u64> {
        if matches!(min, ScoreBound::PosInf) || matches!(max, ScoreBound::NegInf) {
            return Ok(0);
        }
        // Unbounded sides are omitted from the WHERE clause entirely.
        let mut sql = format!("SELECT COUNT(*) AS n FROM {} WHERE key = $1", self.zset);
        let mut next_param = 2;
        if matches!(min, ScoreBound::Value(_)) {
            sql.push_str(&format!(" AND score >= ${next_param}"));
            next_param += 1;
        }
        if matches!(max, ScoreBound::Value(_)) {
            sql.push_str(&format!(" AND score <= ${next_param}"));
        }
        let mut query = sqlx::query(&sql).bind(key);
        if let ScoreBound::Value(v) = min {
            query = query.bind(v);
        }
        if let ScoreBound::Value(v) = max {
            query = query.bind(v);
        }
        let row = query.fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64> {
        let mut conn = self.pool.acquire().await?;
        self.zset_incrby(&mut conn, key, delta, member).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {} WHERE key = $1", self.zset);
        let row = sqlx::query(&sql).bind(key).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn lpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.list_push(&mut conn, key, values, true).await
    }

    async fn rpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.list_push(&mut conn, key, values, false).await
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.pool.acquire().await?;
        self.list_pop(&mut conn, key, true).await
    }

    async fn rpop(&self, key: &str) -> StoreResult<Option<Value>> {
        let mut conn = self.pool.acquire().await?;
        self.list_pop(&mut conn, key, false).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        let sql = format!("SELECT items FROM {} WHERE key = $1", self.list);
        let Some(row) = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await? else {
            return Ok(Vec::new());
        };
        let items = row.get::<Value, _>("items");
        let Value::Array(items) = items else {
            return Err(StoreError::backend(format!("list {key} is not an array")));
        };
        Ok(slice_range(&items, start, stop)
            .into_iter()
            .map(|item| match item {
                Value::String(raw) => value::decode(&raw),
                other => other,
            })
            .collect())
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let sql = format!(
            "SELECT jsonb_array_length(items)::bigint AS len FROM {} WHERE key = $1",
            self.list
        );
        let row = sqlx::query(&sql).bind(key).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| r.get::<i64, _>("len") as u64).unwrap_or(0))
    }

    async fn sadd(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.set_add(&mut conn, key, members).await
    }

    async fn srem(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.set_rem(&mut conn, key, members).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Value>> {
        let sql = format!("SELECT member FROM {} WHERE key = $1", self.set);
        let rows = sqlx::query(&sql).bind(key).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| value::decode(&r.get::<String, _>("member")))
            .collect())
    }

    async fn sismember(&self, key: &str, member: &Value) -> StoreResult<bool> {
        let raw = value::encode(member)?;
        let sql = format!("SELECT 1 FROM {} WHERE key = $1 AND member = $2", self.set);
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(raw)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let sql = format!("SELECT COUNT(*) AS n FROM {} WHERE key = $1", self.set);
        let row = sqlx::query(&sql).bind(key).fetch_one(&self.pool).await?;
        Ok(row.get::<i64, _>("n") as u64)
    }

    async fn hset(&self, key: &str, field: &str, value: &Value) -> StoreResult<()> {
        let mut conn = self.pool.acquire().await?;
        self.hash_set(&mut conn, key, field, value).await
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Value>> {
        let sql = format!(
            "SELECT value FROM {} WHERE key = $1 AND field = $2",
            self.hash
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .bind(field)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| value::decode(&r.get::<String, _>("value"))))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, Value>> {
        let sql = format!("SELECT field, value FROM {} WHERE key = $1", self.hash);
        let rows = sqlx::query(&sql).bind(key).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| {
                (
                    r.get::<String, _>("field"),
                    value::decode(&r.get::<String, _>("value")),
                )
            })
            .collect())
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64> {
        let mut conn = self.pool.acquire().await?;
        self.hash_del(&mut conn, key, fields).await
    }

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.pool.acquire().await?;
        self.hash_incrby(&mut conn, key, field, amount).await
    }

    async fn transaction(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
        let mut tx = self.pool.begin().await?;

        let mut results = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            match self.apply_op(&mut tx, op).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    // The connection goes back to the pool when `tx` drops,
                    // whether or not the rollback itself succeeds.
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(error = %rollback_err, "failed to roll back postgres transaction");
                    }
                    return Err(StoreError::transaction(index, err));
                }
            }
        }

        tx.commit().await?;
        Ok(results)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let sql = format!("DELETE FROM {} WHERE expires_at <= now()", self.kv);
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn close(&self) -> StoreResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
