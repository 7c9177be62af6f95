//! # Shared Store
//!
//! The one piece of shared mutable state behind session tokens, one-time codes
//! and rate-limit counters. Components never cache store state between
//! requests; every decision re-reads the store.
//!
//! ## Modules
//! - `backend`: the [`SharedStore`] trait and [`KeyTtl`]
//! - `error`: [`StoreError`]
//! - `keys`: disjoint key namespaces
//! - `memory`: in-memory backend (tests, local development)
//! - `redis_store`: Redis backend over a reconnecting connection manager
//!
//! Check-then-act sequences are only ever expressed through primitives the
//! backend executes atomically (`incr`, `increment_in_window`,
//! `delete_if_equals`, unconditional `set_ex`).

pub mod backend;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_store;

pub use backend::{KeyTtl, SharedStore};
pub use error::{StoreError, StoreResult};
pub use keys::{KeyNamespace, KeyScheme};
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, RedisStoreConfig};
