use crate::error::StoreResult;
use async_trait::async_trait;
use std::time::Duration;

/// Remaining lifetime of a key, mirroring the three answers of Redis `TTL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (`-2`).
    Missing,
    /// The key exists without an expiry (`-1`).
    Persistent,
    /// The key expires after the given duration.
    Expires(Duration),
}

impl KeyTtl {
    /// Decode the integer reply of `TTL`.
    pub fn from_redis_reply(reply: i64) -> Self {
        match reply {
            -2 => KeyTtl::Missing,
            r if r < 0 => KeyTtl::Persistent,
            secs => KeyTtl::Expires(Duration::from_secs(secs as u64)),
        }
    }
}

/// Store handle shared by the token store, the OTP store and the rate limiter.
///
/// Constructed once at startup and passed around as `Arc<dyn SharedStore>`.
/// Operations on the same key are serialized by the backend; nothing here
/// relies on two separate calls being atomic together.
#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Unconditionally replace the value and its expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Returns `true` when a key was removed.
    async fn del(&self, key: &str) -> StoreResult<bool>;

    /// Atomic increment. A missing key counts from zero and an existing expiry
    /// is left untouched.
    async fn incr(&self, key: &str) -> StoreResult<i64>;

    /// Returns `true` when the key existed and now carries the expiry.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Delete `key` only if it currently holds `expected`, as one atomic step.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Increment a fixed-window counter.
    ///
    /// The expiry is attached only on the absent-to-1 transition; later
    /// increments in the same window never touch it. Backends that can run
    /// both steps server-side should override this.
    async fn increment_in_window(&self, key: &str, window: Duration) -> StoreResult<i64> {
        let count = self.incr(key).await?;
        if count == 1 {
            self.expire(key, window).await?;
        }
        Ok(count)
    }

    async fn ping(&self) -> StoreResult<()>;
}
