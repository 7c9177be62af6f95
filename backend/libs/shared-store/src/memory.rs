//! In-memory store backend.
//!
//! Every operation runs under one mutex, which makes each primitive atomic the
//! same way a single-threaded Redis server does. Expiry is evaluated lazily
//! against [`tokio::time::Instant`], so tests can drive the clock with
//! `tokio::time::pause()` and `tokio::time::advance()`.
//!
//! Data is not persisted and not shared across processes.

use crate::backend::{KeyTtl, SharedStore};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Cheaply cloneable; all clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with [`StoreError::Unavailable`]
    /// until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable(
                "memory store switched off".to_string(),
            ))
        } else {
            Ok(())
        }
    }

    /// Run `f` against the map after dropping `key` if it has expired.
    fn with_key<T>(&self, key: &str, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        f(&mut entries)
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_available()?;
        Ok(self.with_key(key, |entries| entries.get(key).map(|e| e.value.clone())))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        self.check_available()?;
        let expires_at = Some(Instant::now() + ttl);
        self.with_key(key, |entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at,
                },
            );
        });
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.with_key(key, |entries| entries.remove(key).is_some()))
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.check_available()?;
        self.with_key(key, |entries| -> StoreResult<i64> {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: None,
            });
            let current: i64 = entry.value.parse().map_err(|_| {
                StoreError::Protocol(format!("value at {key} is not an integer"))
            })?;
            let next = current + 1;
            entry.value = next.to_string();
            Ok(next)
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.check_available()?;
        let expires_at = Instant::now() + ttl;
        Ok(self.with_key(key, |entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(expires_at);
                true
            }
            None => false,
        }))
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.check_available()?;
        let now = Instant::now();
        Ok(self.with_key(key, |entries| match entries.get(key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => {
                // Whole seconds, rounded up like a key that has not yet expired.
                let remaining = at.saturating_duration_since(now);
                let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
                KeyTtl::Expires(Duration::from_secs(secs))
            }
        }))
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.with_key(key, |entries| {
            let matched = entries.get(key).is_some_and(|entry| entry.value == expected);
            if matched {
                entries.remove(key);
            }
            matched
        }))
    }

    async fn increment_in_window(&self, key: &str, window: Duration) -> StoreResult<i64> {
        self.check_available()?;
        let now = Instant::now();
        self.with_key(key, |entries| -> StoreResult<i64> {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: "0".to_string(),
                expires_at: None,
            });
            let current: i64 = entry.value.parse().map_err(|_| {
                StoreError::Protocol(format!("value at {key} is not an integer"))
            })?;
            let next = current + 1;
            entry.value = next.to_string();
            if next == 1 {
                entry.expires_at = Some(now + window);
            }
            Ok(next)
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}
