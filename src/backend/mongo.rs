//! Document-Store Adapter (MongoDB)
//!
//! Five collections mirror the five data structures:
//!
//! | collection     | shape                                            |
//! |----------------|--------------------------------------------------|
//! | `{p}_kv`       | `{ _id, value, expires_at }`                     |
//! | `{p}_zset`     | `{ key, member, score }`                         |
//! | `{p}_list`     | `{ _id, items: [...] }` (list as one document)   |
//! | `{p}_set`      | `{ key, member }`                                |
//! | `{p}_hash`     | `{ _id, fields: { ... } }`                       |
//!
//! Indexes created at connect: unique `(key, member)` and `(key, score)` on
//! the sorted-set collection, unique `(key, member)` on the set collection,
//! and `expires_at` on the scalar collection for the sweep.
//!
//! Scalar and hash values are stored as native BSON through the codec; set
//! members are stored in encoded textual form so membership identity matches
//! the other adapters exactly.
//!
//! The server has no sorted-set or tie-break notion of its own, so every
//! ranked query carries an explicit two-column sort, and `zrank` counts
//! documents ahead of the member with an explicit `(score, member)`
//! comparison. `zadd` learns insert-vs-update from the upsert result.
//!
//! Transactions are session-scoped and aborted on the first failing
//! operation. They require a replica set; on a standalone server the batch
//! fails with the driver's error. This is the contract's documented
//! best-effort guarantee for document stores.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, DateTime, Document};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{Client, ClientSession, Collection, IndexModel};
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::ops::{slice_range, Op, OpResult, ScoreBound, ScoredMember};
use crate::value::{self, Value};

use super::StorageBackend;

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::backend(err.to_string())
    }
}

fn to_bson(value: &Value) -> StoreResult<Bson> {
    mongodb::bson::to_bson(value).map_err(|e| StoreError::codec(e.to_string()))
}

fn from_bson(bson: Bson) -> StoreResult<Value> {
    mongodb::bson::from_bson(bson).map_err(|e| StoreError::codec(e.to_string()))
}

/// Integer coercion over BSON, aligned with the textual rule: integers and
/// integral text increment, everything else is a type error.
fn coerce_bson_i64(bson: &Bson, target: &str) -> StoreResult<i64> {
    match bson {
        Bson::Int32(n) => Ok(*n as i64),
        Bson::Int64(n) => Ok(*n),
        Bson::String(s) => value::coerce_i64(s, target),
        _ => Err(StoreError::not_numeric(target)),
    }
}

/// Filter fragment selecting live (non-expired) scalar documents.
fn live_filter() -> Document {
    doc! {
        "$or": [
            { "expires_at": Bson::Null },
            { "expires_at": { "$gt": DateTime::now() } },
        ]
    }
}

fn expiry_bson(ttl_seconds: Option<i64>) -> Bson {
    match ttl_seconds {
        None => Bson::Null,
        Some(ttl) => {
            let millis = DateTime::now().timestamp_millis() + ttl.max(0) * 1000;
            Bson::DateTime(DateTime::from_millis(millis))
        }
    }
}

/// The MongoDB adapter.
pub struct MongoBackend {
    client: Client,
    kv: Collection<Document>,
    zsets: Collection<Document>,
    lists: Collection<Document>,
    sets: Collection<Document>,
    hashes: Collection<Document>,
}

impl MongoBackend {
    /// Connect, verify the server is reachable, and ensure indexes.
    pub async fn connect(url: &str, database: &str, table_prefix: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(url)
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;
        let db = client.database(database);

        // The driver connects lazily; a ping surfaces unreachable servers now.
        db.run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StoreError::connection(e.to_string()))?;

        let backend = Self {
            kv: db.collection(&format!("{table_prefix}_kv")),
            zsets: db.collection(&format!("{table_prefix}_zset")),
            lists: db.collection(&format!("{table_prefix}_list")),
            sets: db.collection(&format!("{table_prefix}_set")),
            hashes: db.collection(&format!("{table_prefix}_hash")),
            client,
        };
        backend.ensure_indexes().await?;
        debug!(url, database, "connected to mongodb");
        Ok(backend)
    }

    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique = IndexOptions::builder().unique(true).build();
        self.zsets
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "key": 1, "member": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.zsets
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "key": 1, "score": 1 })
                    .build(),
            )
            .await?;
        self.sets
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "key": 1, "member": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;
        self.kv
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "expires_at": 1 })
                    .build(),
            )
            .await?;
        Ok(())
    }

    // ── Session-aware primitive operations ───────────────────────
    //
    // Each helper serves both the standalone path (no session) and the
    // transaction path (session bound); the trait methods pass `None`.

    async fn kv_fetch(
        &self,
        key: &str,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Option<Document>> {
        let filter = doc! { "_id": key };
        let found = match session {
            Some(s) => self.kv.find_one(filter).session(s).await?,
            None => self.kv.find_one(filter).await?,
        };
        Ok(found)
    }

    /// Read a live scalar document, deleting it lazily when expired.
    async fn kv_fetch_live(
        &self,
        key: &str,
        mut session: Option<&mut ClientSession>,
    ) -> StoreResult<Option<Document>> {
        let Some(found) = self.kv_fetch(key, session.as_deref_mut()).await? else {
            return Ok(None);
        };
        if doc_expired(&found) {
            let filter = doc! { "_id": key, "expires_at": { "$lte": DateTime::now() } };
            match session {
                Some(s) => self.kv.delete_one(filter).session(s).await?,
                None => self.kv.delete_one(filter).await?,
            };
            return Ok(None);
        }
        Ok(Some(found))
    }

    async fn kv_set(
        &self,
        key: &str,
        value: &Value,
        ttl_seconds: Option<i64>,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<()> {
        let update = doc! {
            "$set": { "value": to_bson(value)?, "expires_at": expiry_bson(ttl_seconds) }
        };
        let query = self.kv.update_one(doc! { "_id": key }, update).upsert(true);
        match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(())
    }

    async fn kv_delete(
        &self,
        key: &str,
        mut session: Option<&mut ClientSession>,
    ) -> StoreResult<bool> {
        let existed = self
            .kv_fetch_live(key, session.as_deref_mut())
            .await?
            .is_some();
        if existed {
            let filter = doc! { "_id": key };
            match session {
                Some(s) => self.kv.delete_one(filter).session(s).await?,
                None => self.kv.delete_one(filter).await?,
            };
        }
        Ok(existed)
    }

    async fn kv_increment(
        &self,
        key: &str,
        amount: i64,
        mut session: Option<&mut ClientSession>,
    ) -> StoreResult<i64> {
        let current = self.kv_fetch_live(key, session.as_deref_mut()).await?;
        let base = match &current {
            Some(found) => coerce_bson_i64(found.get("value").unwrap_or(&Bson::Null), key)?,
            None => 0,
        };
        let next = base
            .checked_add(amount)
            .ok_or_else(|| StoreError::backend(format!("increment overflow at {key}")))?;
        let update = doc! {
            "$set": { "value": Bson::Int64(next) },
            "$setOnInsert": { "expires_at": Bson::Null },
        };
        let query = self.kv.update_one(doc! { "_id": key }, update).upsert(true);
        match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(next)
    }

    async fn kv_expire(
        &self,
        key: &str,
        seconds: i64,
        mut session: Option<&mut ClientSession>,
    ) -> StoreResult<bool> {
        if self
            .kv_fetch_live(key, session.as_deref_mut())
            .await?
            .is_none()
        {
            return Ok(false);
        }
        let update = doc! { "$set": { "expires_at": expiry_bson(Some(seconds)) } };
        let query = self.kv.update_one(doc! { "_id": key }, update);
        match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(true)
    }

    async fn zset_add(
        &self,
        key: &str,
        score: f64,
        member: &str,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let filter = doc! { "key": key, "member": member };
        let update = doc! { "$set": { "score": score } };
        let query = self.zsets.update_one(filter, update).upsert(true);
        let result = match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(u64::from(result.upserted_id.is_some()))
    }

    async fn zset_rem(
        &self,
        key: &str,
        member: &str,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let filter = doc! { "key": key, "member": member };
        let result = match session {
            Some(s) => self.zsets.delete_many(filter).session(s).await?,
            None => self.zsets.delete_many(filter).await?,
        };
        Ok(result.deleted_count)
    }

    async fn zset_incrby(
        &self,
        key: &str,
        delta: f64,
        member: &str,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<f64> {
        let filter = doc! { "key": key, "member": member };
        let update = doc! { "$inc": { "score": delta } };
        let query = self
            .zsets
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After);
        let found = match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        let found = found.ok_or_else(|| StoreError::backend("zincrby upsert returned nothing"))?;
        found
            .get_f64("score")
            .map_err(|e| StoreError::backend(e.to_string()))
    }

    async fn list_push(
        &self,
        key: &str,
        values: &[Value],
        front: bool,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let mut items: Vec<Bson> = values.iter().map(to_bson).collect::<StoreResult<_>>()?;
        let push = if front {
            // Reversed so the first argument lands closest to the head.
            items.reverse();
            doc! { "$each": items, "$position": 0 }
        } else {
            doc! { "$each": items }
        };
        let update = doc! { "$push": { "items": push } };
        let query = self
            .lists
            .find_one_and_update(doc! { "_id": key }, update)
            .upsert(true)
            .return_document(ReturnDocument::After);
        let found = match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        let found = found.ok_or_else(|| StoreError::backend("list upsert returned nothing"))?;
        Ok(found.get_array("items").map(|a| a.len() as u64).unwrap_or(0))
    }

    async fn list_pop(
        &self,
        key: &str,
        front: bool,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Option<Value>> {
        let direction = if front { -1 } else { 1 };
        let update = doc! { "$pop": { "items": direction } };
        let query = self
            .lists
            .find_one_and_update(doc! { "_id": key }, update)
            .return_document(ReturnDocument::Before);
        let found = match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        let Some(before) = found else {
            return Ok(None);
        };
        let items = before
            .get_array("items")
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let popped = if front {
            items.first()
        } else {
            items.last()
        };
        popped.cloned().map(from_bson).transpose()
    }

    async fn set_add(
        &self,
        key: &str,
        members: &[Value],
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let mut added = 0;
        let mut session = session;
        for member in members {
            let raw = value::encode(member)?;
            let filter = doc! { "key": key, "member": &raw };
            let update = doc! { "$setOnInsert": { "key": key, "member": &raw } };
            let query = self.sets.update_one(filter, update).upsert(true);
            let result = match session.as_deref_mut() {
                Some(s) => query.session(s).await?,
                None => query.await?,
            };
            if result.upserted_id.is_some() {
                added += 1;
            }
        }
        Ok(added)
    }

    async fn set_rem(
        &self,
        key: &str,
        members: &[Value],
        session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let raws: Vec<String> = members.iter().map(value::encode).collect::<StoreResult<_>>()?;
        let filter = doc! { "key": key, "member": { "$in": raws } };
        let result = match session {
            Some(s) => self.sets.delete_many(filter).session(s).await?,
            None => self.sets.delete_many(filter).await?,
        };
        Ok(result.deleted_count)
    }

    async fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &Value,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<()> {
        let mut set = Document::new();
        set.insert(format!("fields.{field}"), to_bson(value)?);
        let query = self
            .hashes
            .update_one(doc! { "_id": key }, doc! { "$set": set })
            .upsert(true);
        match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(())
    }

    async fn hash_fetch(
        &self,
        key: &str,
        session: Option<&mut ClientSession>,
    ) -> StoreResult<Option<Document>> {
        let filter = doc! { "_id": key };
        let found = match session {
            Some(s) => self.hashes.find_one(filter).session(s).await?,
            None => self.hashes.find_one(filter).await?,
        };
        Ok(found)
    }

    async fn hash_del(
        &self,
        key: &str,
        fields: &[&str],
        mut session: Option<&mut ClientSession>,
    ) -> StoreResult<u64> {
        let Some(found) = self.hash_fetch(key, session.as_deref_mut()).await? else {
            return Ok(0);
        };
        let stored = found.get_document("fields").cloned().unwrap_or_default();
        let present: Vec<&str> = fields
            .iter()
            .copied()
            .filter(|f| stored.contains_key(*f))
            .collect();
        if present.is_empty() {
            return Ok(0);
        }
        let mut unset = Document::new();
        for field in &present {
            unset.insert(format!("fields.{field}"), Bson::Null);
        }
        let query = self.hashes.update_one(doc! { "_id": key }, doc! { "$unset": unset });
        match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(present.len() as u64)
    }

    async fn hash_incrby(
        &self,
        key: &str,
        field: &str,
        amount: i64,
        mut session: Option<&mut ClientSession>,
    ) -> StoreResult<i64> {
        let target = format!("{key}.{field}");
        let current = self
            .hash_fetch(key, session.as_deref_mut())
            .await?
            .and_then(|d| {
                d.get_document("fields")
                    .ok()
                    .and_then(|f| f.get(field).cloned())
            });
        let base = match &current {
            Some(bson) => coerce_bson_i64(bson, &target)?,
            None => 0,
        };
        let next = base
            .checked_add(amount)
            .ok_or_else(|| StoreError::backend(format!("increment overflow at {target}")))?;
        let mut set = Document::new();
        set.insert(format!("fields.{field}"), Bson::Int64(next));
        let query = self
            .hashes
            .update_one(doc! { "_id": key }, doc! { "$set": set })
            .upsert(true);
        match session {
            Some(s) => query.session(s).await?,
            None => query.await?,
        };
        Ok(next)
    }

    /// Sorted members with scores, already sliced by the shared range rules.
    async fn zset_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
        rev: bool,
    ) -> StoreResult<Vec<ScoredMember>> {
        let direction = if rev { -1 } else { 1 };
        let cursor = self
            .zsets
            .find(doc! { "key": key })
            .sort(doc! { "score": direction, "member": direction })
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        let members: Vec<ScoredMember> = docs
            .iter()
            .map(|d| {
                Ok(ScoredMember {
                    member: d
                        .get_str("member")
                        .map_err(|e| StoreError::backend(e.to_string()))?
                        .to_string(),
                    score: d
                        .get_f64("score")
                        .map_err(|e| StoreError::backend(e.to_string()))?,
                })
            })
            .collect::<StoreResult<_>>()?;
        Ok(slice_range(&members, start, stop))
    }

    async fn apply_op(&self, op: &Op, session: &mut ClientSession) -> StoreResult<OpResult> {
        Ok(match op {
            Op::Set {
                key,
                value,
                ttl_seconds,
            } => {
                self.kv_set(key, value, *ttl_seconds, Some(session)).await?;
                OpResult::None
            }
            Op::Get { key } => {
                let found = self.kv_fetch_live(key, Some(session)).await?;
                OpResult::Value(
                    found
                        .and_then(|d| d.get("value").cloned())
                        .map(from_bson)
                        .transpose()?,
                )
            }
            Op::Delete { key } => OpResult::Bool(self.kv_delete(key, Some(session)).await?),
            Op::Incr { key, amount } => {
                OpResult::Int(self.kv_increment(key, *amount, Some(session)).await?)
            }
            Op::Expire { key, seconds } => {
                OpResult::Bool(self.kv_expire(key, *seconds, Some(session)).await?)
            }
            Op::Zadd { key, score, member } => {
                OpResult::Int(self.zset_add(key, *score, member, Some(session)).await? as i64)
            }
            Op::Zrem { key, member } => {
                OpResult::Int(self.zset_rem(key, member, Some(session)).await? as i64)
            }
            Op::Zincrby { key, delta, member } => {
                OpResult::Float(self.zset_incrby(key, *delta, member, Some(session)).await?)
            }
            Op::Lpush { key, values } => {
                OpResult::Int(self.list_push(key, values, true, Some(session)).await? as i64)
            }
            Op::Rpush { key, values } => {
                OpResult::Int(self.list_push(key, values, false, Some(session)).await? as i64)
            }
            Op::Sadd { key, members } => {
                OpResult::Int(self.set_add(key, members, Some(session)).await? as i64)
            }
            Op::Srem { key, members } => {
                OpResult::Int(self.set_rem(key, members, Some(session)).await? as i64)
            }
            Op::Hset { key, field, value } => {
                self.hash_set(key, field, value, Some(session)).await?;
                OpResult::None
            }
            Op::Hdel { key, fields } => {
                let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
                OpResult::Int(self.hash_del(key, &refs, Some(session)).await? as i64)
            }
            Op::Hincrby { key, field, amount } => {
                OpResult::Int(self.hash_incrby(key, field, *amount, Some(session)).await?)
            }
        })
    }
}

fn doc_expired(found: &Document) -> bool {
    match found.get("expires_at") {
        Some(Bson::DateTime(exp)) => exp.timestamp_millis() <= DateTime::now().timestamp_millis(),
        _ => false,
    }
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongo"
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Value>> {
        let found = self.kv_fetch_live(key, None).await?;
        found
            .and_then(|d| d.get("value").cloned())
            .map(from_bson)
            .transpose()
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: Option<i64>) -> StoreResult<()> {
        self.kv_set(key, value, ttl_seconds, None).await
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        self.kv_delete(key, None).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.kv_fetch_live(key, None).await?.is_some())
    }

    async fn increment(&self, key: &str, amount: i64) -> StoreResult<i64> {
        self.kv_increment(key, amount, None).await
    }

    async fn mget(&self, keys: &[&str]) -> StoreResult<Vec<Option<Value>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let key_list: Vec<&str> = keys.to_vec();
        let mut filter = doc! { "_id": { "$in": key_list } };
        filter.extend(live_filter());
        let cursor = self.kv.find(filter).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;

        let mut by_key: HashMap<String, Value> = HashMap::new();
        for d in docs {
            let key = d
                .get_str("_id")
                .map_err(|e| StoreError::backend(e.to_string()))?
                .to_string();
            if let Some(bson) = d.get("value").cloned() {
                by_key.insert(key, from_bson(bson)?);
            }
        }
        Ok(keys.iter().map(|k| by_key.remove(*k)).collect())
    }

    async fn mset(&self, entries: &[(&str, Value)]) -> StoreResult<()> {
        for (key, value) in entries {
            self.kv_set(key, value, None, None).await?;
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let regex = crate::pattern::GlobPattern::new(pattern).to_regex();
        let mut filter = doc! { "_id": { "$regex": regex } };
        filter.extend(live_filter());
        let cursor = self.kv.find(filter).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        docs.iter()
            .map(|d| {
                d.get_str("_id")
                    .map(str::to_string)
                    .map_err(|e| StoreError::backend(e.to_string()))
            })
            .collect()
    }

    async fn clear(&self, pattern: &str) -> StoreResult<u64> {
        let regex = crate::pattern::GlobPattern::new(pattern).to_regex();
        let mut filter = doc! { "_id": { "$regex": regex } };
        filter.extend(live_filter());
        let result = self.kv.delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn expire(&self, key: &str, seconds: i64) -> StoreResult<bool> {
        self.kv_expire(key, seconds, None).await
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let Some(found) = self.kv_fetch_live(key, None).await? else {
            return Ok(-2);
        };
        Ok(match found.get("expires_at") {
            Some(Bson::DateTime(exp)) => {
                let remaining_ms = exp.timestamp_millis() - DateTime::now().timestamp_millis();
                ((remaining_ms as f64) / 1000.0).ceil() as i64
            }
            _ => -1,
        })
    }

    async fn zadd(&self, key: &str, score: f64, member: &str) -> StoreResult<u64> {
        self.zset_add(key, score, member, None).await
    }

    async fn zrem(&self, key: &str, member: &str) -> StoreResult<u64> {
        self.zset_rem(key, member, None).await
    }

    async fn zrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        Ok(self
            .zset_range(key, start, stop, false)
            .await?
            .into_iter()
            .map(|sm| sm.member)
            .collect())
    }

    async fn zrevrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        Ok(self
            .zset_range(key, start, stop, true)
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
        self.zset_range(key, start, stop, false).await
    }

    async fn zrevrange_with_scores(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> StoreResult<Vec<ScoredMember>> {
        self.zset_range(key, start, stop, true).await
    }

    async fn zrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let Some(score) = self.zscore(key, member).await? else {
            return Ok(None);
        };
        let ahead = self
            .zsets
            .count_documents(doc! {
                "key": key,
                "$or": [
                    { "score": { "$lt": score } },
                    { "score": score, "member": { "$lt": member } },
                ]
            })
            .await?;
        Ok(Some(ahead))
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let Some(score) = self.zscore(key, member).await? else {
            return Ok(None);
        };
        let ahead = self
            .zsets
            .count_documents(doc! {
                "key": key,
                "$or": [
                    { "score": { "$gt": score } },
                    { "score": score, "member": { "$gt": member } },
                ]
            })
            .await?;
        Ok(Some(ahead))
    }

    async fn zscore(&self, key: &str, member: &str) -> StoreResult<Option<f64>> {
        let found = self
            .zsets
            .find_one(doc! { "key": key, "member": member })
            .await?;
        found
            .map(|d| {
                d.get_f64("score")
                    .map_err(|e| StoreError::backend(e.to_string()))
            })
            .transpose()
    }

    async fn zcount(&self, key: &str, min: ScoreBound, max: ScoreBound) -> StoreResult<u64> {
        let mut score = Document::new();
        if let ScoreBound::Value(v) = min {
            score.insert("$gte", v);
        }
        if let ScoreBound::Value(v) = max {
            score.insert("$lte", v);
        }
        if matches!(min, ScoreBound::PosInf) || matches!(max, ScoreBound::NegInf) {
            return Ok(0);
        }
        let mut filter = doc! { "key": key };
        if !score.is_empty() {
            filter.insert("score", score);
        }
        Ok(self.zsets.count_documents(filter).await?)
    }

    async fn zincrby(&self, key: &str, delta: f64, member: &str) -> StoreResult<f64> {
        self.zset_incrby(key, delta, member, None).await
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.zsets.count_documents(doc! { "key": key }).await?)
    }

    async fn lpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        self.list_push(key, values, true, None).await
    }

    async fn rpush(&self, key: &str, values: &[Value]) -> StoreResult<u64> {
        self.list_push(key, values, false, None).await
    }

    async fn lpop(&self, key: &str) -> StoreResult<Option<Value>> {
        self.list_pop(key, true, None).await
    }

    async fn rpop(&self, key: &str) -> StoreResult<Option<Value>> {
        self.list_pop(key, false, None).await
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<Value>> {
        let Some(found) = self.lists.find_one(doc! { "_id": key }).await? else {
            return Ok(Vec::new());
        };
        let items = found
            .get_array("items")
            .map_err(|e| StoreError::backend(e.to_string()))?;
        slice_range(items, start, stop)
            .into_iter()
            .map(from_bson)
            .collect()
    }

    async fn llen(&self, key: &str) -> StoreResult<u64> {
        let Some(found) = self.lists.find_one(doc! { "_id": key }).await? else {
            return Ok(0);
        };
        Ok(found.get_array("items").map(|a| a.len() as u64).unwrap_or(0))
    }

    async fn sadd(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        self.set_add(key, members, None).await
    }

    async fn srem(&self, key: &str, members: &[Value]) -> StoreResult<u64> {
        self.set_rem(key, members, None).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<Value>> {
        let cursor = self.sets.find(doc! { "key": key }).await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        docs.iter()
            .map(|d| {
                d.get_str("member")
                    .map(value::decode)
                    .map_err(|e| StoreError::backend(e.to_string()))
            })
            .collect()
    }

    async fn sismember(&self, key: &str, member: &Value) -> StoreResult<bool> {
        let raw = value::encode(member)?;
        let found = self
            .sets
            .find_one(doc! { "key": key, "member": raw })
            .await?;
        Ok(found.is_some())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        Ok(self.sets.count_documents(doc! { "key": key }).await?)
    }

    async fn hset(&self, key: &str, field: &str, value: &Value) -> StoreResult<()> {
        self.hash_set(key, field, value, None).await
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Value>> {
        let found = self.hash_fetch(key, None).await?;
        found
            .and_then(|d| {
                d.get_document("fields")
                    .ok()
                    .and_then(|f| f.get(field).cloned())
            })
            .map(from_bson)
            .transpose()
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, Value>> {
        let Some(found) = self.hash_fetch(key, None).await? else {
            return Ok(HashMap::new());
        };
        let fields = found.get_document("fields").cloned().unwrap_or_default();
        fields
            .into_iter()
            .map(|(f, bson)| Ok((f, from_bson(bson)?)))
            .collect()
    }

    async fn hdel(&self, key: &str, fields: &[&str]) -> StoreResult<u64> {
        self.hash_del(key, fields, None).await
    }

    async fn hincrby(&self, key: &str, field: &str, amount: i64) -> StoreResult<i64> {
        self.hash_incrby(key, field, amount, None).await
    }

    async fn transaction(&self, ops: &[Op]) -> StoreResult<Vec<OpResult>> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;

        let mut results = Vec::with_capacity(ops.len());
        for (index, op) in ops.iter().enumerate() {
            match self.apply_op(op, &mut session).await {
                Ok(result) => results.push(result),
                Err(err) => {
                    if let Err(abort_err) = session.abort_transaction().await {
                        warn!(error = %abort_err, "failed to abort mongodb transaction");
                    }
                    return Err(StoreError::transaction(index, err));
                }
            }
        }

        session.commit_transaction().await?;
        Ok(results)
    }

    async fn purge_expired(&self) -> StoreResult<u64> {
        let result = self
            .kv
            .delete_many(doc! { "expires_at": { "$lte": DateTime::now() } })
            .await?;
        Ok(result.deleted_count)
    }

    async fn close(&self) -> StoreResult<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}
