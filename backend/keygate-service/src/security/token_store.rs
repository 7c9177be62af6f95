/// Single-active-session token store
///
/// Keeps exactly one current token per user under `session:<user id>`.
///
/// ## Lifecycle
///
/// - Login: `issue` mints a token and overwrites the stored one in a single
///   `SET ... EX`, so the previous token stops validating at the same instant
///   the new one starts
/// - Password change or reset: `revoke` deletes the entry
/// - Otherwise the entry expires with the token's own lifetime
///
/// ## Validation
///
/// A token is accepted only if it equals the stored value *and* passes codec
/// verification. Store failures come back as [`TokenError::Store`] and are never
/// reported as an invalid or expired session.
use shared_store::{KeyNamespace, KeyScheme, SharedStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use super::token_codec::{Claims, CodecError, TokenCodec};

#[derive(Debug, Error, PartialEq)]
pub enum TokenError {
    /// No current session for this user.
    #[error("session expired")]
    Expired,

    /// A session exists but the presented token is not it.
    #[error("token does not match the active session")]
    Mismatch,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct TokenStore {
    store: Arc<dyn SharedStore>,
    keys: KeyScheme,
    codec: Arc<TokenCodec>,
}

impl TokenStore {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeyScheme, codec: Arc<TokenCodec>) -> Self {
        Self { store, keys, codec }
    }

    fn key(&self, user_id: Uuid) -> String {
        self.keys.key(KeyNamespace::Session, &user_id.to_string())
    }

    /// Mint a token for `user_id` and make it the only valid one.
    pub async fn issue(&self, user_id: Uuid) -> Result<String, TokenError> {
        let token = self.codec.encode(user_id).map_err(|e| {
            tracing::error!(%user_id, error = %e, "Failed to mint session token");
            TokenError::Invalid(e.to_string())
        })?;

        self.store
            .set_ex(&self.key(user_id), &token, self.codec.ttl())
            .await?;

        tracing::info!(%user_id, ttl_secs = self.codec.ttl().as_secs(), "Session issued");
        Ok(token)
    }

    /// Check `presented` against the current session of `user_id`.
    ///
    /// ## Errors
    ///
    /// * `Expired` - no session stored
    /// * `Mismatch` - a different token is current (superseded or forged)
    /// * `Invalid` - signature, claims (including `exp`) or subject do not check out
    /// * `Store` - the store could not answer
    pub async fn validate(&self, user_id: Uuid, presented: &str) -> Result<Claims, TokenError> {
        let stored = self
            .store
            .get(&self.key(user_id))
            .await?
            .ok_or(TokenError::Expired)?;

        if !constant_time_eq(stored.as_bytes(), presented.as_bytes()) {
            return Err(TokenError::Mismatch);
        }

        // `Expired` means no stored session; a stale stored token is invalid.
        let claims = self
            .codec
            .decode(presented)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        if claims.subject() != Some(user_id) {
            return Err(TokenError::Invalid("subject does not match".to_string()));
        }

        Ok(claims)
    }

    /// Drop the current session. Revoking an absent session is not an error.
    pub async fn revoke(&self, user_id: Uuid) -> Result<(), TokenError> {
        let removed = self.store.del(&self.key(user_id)).await?;
        tracing::info!(%user_id, removed, "Session revoked");
        Ok(())
    }

    /// Resolve a bearer token to its user, then [`validate`](Self::validate) it.
    pub async fn authenticate(&self, presented: &str) -> Result<(Uuid, Claims), TokenError> {
        let claims = self.codec.decode(presented).map_err(|e| match e {
            CodecError::Expired => TokenError::Expired,
            other => TokenError::Invalid(other.to_string()),
        })?;
        let user_id = claims
            .subject()
            .ok_or_else(|| TokenError::Invalid("subject is not a user id".to_string()))?;

        let claims = self.validate(user_id, presented).await?;
        Ok((user_id, claims))
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_store::MemoryStore;
    use std::time::Duration;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"unit-test-secret-with-enough-length!!",
            "keygate",
            "keygate-api",
            Duration::from_secs(3600),
        )
        .unwrap()
    }

    fn token_store(store: &MemoryStore) -> TokenStore {
        TokenStore::new(Arc::new(store.clone()), KeyScheme::default(), Arc::new(codec()))
    }

    #[tokio::test]
    async fn test_issue_then_validate() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        let user_id = Uuid::new_v4();

        let token = tokens.issue(user_id).await.unwrap();
        let claims = tokens.validate(user_id, &token).await.unwrap();
        assert_eq!(claims.subject(), Some(user_id));

        let key = format!("keygate:session:{user_id}");
        assert_eq!(store.get(&key).await.unwrap(), Some(token));
    }

    #[tokio::test]
    async fn test_validate_without_session() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id).await.unwrap();

        assert_eq!(
            tokens.validate(Uuid::new_v4(), &token).await,
            Err(TokenError::Expired)
        );
    }

    #[tokio::test]
    async fn test_token_for_other_user_is_rejected() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let alice_token = tokens.issue(alice).await.unwrap();

        // Plant Alice's token as Bob's session.
        store
            .set_ex(
                &format!("keygate:session:{bob}"),
                &alice_token,
                Duration::from_secs(60),
            )
            .await
            .unwrap();
        assert!(matches!(
            tokens.validate(bob, &alice_token).await,
            Err(TokenError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_stored_token_past_exp_is_invalid() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        let user_id = Uuid::new_v4();
        let stale = codec()
            .encode_at(user_id, chrono::Utc::now().timestamp() - 7200)
            .unwrap();
        store
            .set_ex(
                &format!("keygate:session:{user_id}"),
                &stale,
                Duration::from_secs(3600),
            )
            .await
            .unwrap();

        assert!(matches!(
            tokens.validate(user_id, &stale).await,
            Err(TokenError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_authenticate_garbage() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        assert!(matches!(
            tokens.authenticate("garbage").await,
            Err(TokenError::Invalid(_))
        ));
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        let user_id = Uuid::new_v4();
        tokens.issue(user_id).await.unwrap();

        tokens.revoke(user_id).await.unwrap();
        tokens.revoke(user_id).await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_not_a_session_verdict() {
        let store = MemoryStore::new();
        let tokens = token_store(&store);
        let user_id = Uuid::new_v4();
        let token = tokens.issue(user_id).await.unwrap();

        store.set_unavailable(true);
        assert!(matches!(
            tokens.validate(user_id, &token).await,
            Err(TokenError::Store(_))
        ));
        assert!(matches!(tokens.issue(user_id).await, Err(TokenError::Store(_))));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }
}
