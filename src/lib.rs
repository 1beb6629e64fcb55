//! # polystore - Polymorphic Structured Storage Engine
//!
//! One storage contract over four backends: process memory, Redis, MongoDB,
//! and PostgreSQL. Callers get primitive data structures - scalar key/value
//! with expiry, sorted sets, lists, sets, and hashes - plus best-effort
//! atomic transactions, with identical observable semantics no matter which
//! backend is active.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        StorageEngine                             │
//! │        (key prefixing, sweeper lifecycle, backend selection)     │
//! │                              │                                   │
//! │                              ▼                                   │
//! │                     StorageBackend trait                         │
//! │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐    │
//! │   │  Memory   │  │   Redis   │  │   Mongo   │  │ Postgres  │    │
//! │   │  RwLock   │  │ MULTI/    │  │ sessions  │  │ sqlx tx   │    │
//! │   │ snapshot  │  │   EXEC    │  │           │  │           │    │
//! │   └───────────┘  └───────────┘  └───────────┘  └───────────┘    │
//! │                              ▲                                   │
//! │                ┌─────────────┴─────────────┐                     │
//! │                │       ExpirySweeper       │                     │
//! │                │  (background tokio task)  │                     │
//! │                └───────────────────────────┘                     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Data flows one direction: a caller issues an operation against the
//! contract, the active adapter translates it into backend-native calls and
//! returns a normalized result.
//!
//! ## Quick Start
//!
//! ```ignore
//! use polystore::{StorageEngine, StoreConfig, BackendConfig};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> polystore::StoreResult<()> {
//!     let config = StoreConfig::new(BackendConfig::Redis {
//!         url: "redis://127.0.0.1:6379/0".into(),
//!     })
//!     .with_key_prefix("app:");
//!
//!     let engine = StorageEngine::connect(config).await?;
//!
//!     // Leaderboard
//!     engine.zadd("lb", 100.0, "u1").await?;
//!     engine.zadd("lb", 200.0, "u2").await?;
//!     engine.zadd("lb", 150.0, "u3").await?;
//!     assert_eq!(engine.zrevrange("lb", 0, 1).await?, vec!["u2", "u3"]);
//!
//!     // Session with TTL
//!     engine.set("session:abc", &json!({"user": 1}), Some(3600)).await?;
//!
//!     engine.disconnect().await
//! }
//! ```
//!
//! ## Semantics shared by every backend
//!
//! - **Sorted order**: score ascending with ties broken by ascending member;
//!   reverse queries are the exact reverse.
//! - **Negative indexing**: `-1` is the last element, `stop` is inclusive,
//!   for lists and sorted sets alike.
//! - **Expiry**: lazy on read plus an active background sweep; an expired
//!   key reads as absent immediately.
//! - **Numeric coercion**: increments accept only integral stored values and
//!   fail with a type error otherwise.
//! - **Not-found is not an error**: absent keys, members, and fields come
//!   back as `None`/`false`/empty.
//!
//! ## Module Overview
//!
//! - [`engine`]: the public facade
//! - [`backend`]: the contract and the four adapters
//! - [`config`]: construction-time configuration and validation
//! - [`ops`]: shared operation vocabulary (transactions, bounds, ranges)
//! - [`value`]: the value codec
//! - [`pattern`]: glob patterns and their per-backend translations
//! - [`sweeper`]: the background expiry sweeper
//! - [`error`]: the error taxonomy

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod ops;
pub mod pattern;
pub mod sweeper;
pub mod value;

// Re-export the types a caller normally touches.
pub use backend::StorageBackend;
pub use config::{BackendConfig, StoreConfig};
pub use engine::StorageEngine;
pub use error::{StoreError, StoreResult};
pub use ops::{Op, OpResult, ScoreBound, ScoredMember};
pub use sweeper::ExpirySweeper;
pub use value::Value;

/// Version of polystore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
