//! One-time codes.
//!
//! A code proves control of an email address for one purpose. Only the latest
//! code per (purpose, address) is live; it verifies at most once and never
//! after its TTL.

use rand::{rngs::OsRng, Rng};
use shared_store::{KeyNamespace, KeyScheme, SharedStore, StoreError};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::validators::{mask_email, normalize_email};

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// What a code may be used for. A signup code cannot complete a reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    Signup,
    PasswordChange,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::Signup => "signup",
            OtpPurpose::PasswordChange => "password-change",
            OtpPurpose::PasswordReset => "password-reset",
        }
    }
}

impl fmt::Display for OtpPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Codes are compared trimmed and upper-cased, on both the stored and the
/// presented side.
fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// Uniform draw from `A-Z0-9` using the OS CSPRNG.
pub fn generate_code(length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[derive(Clone)]
pub struct OtpStore {
    store: Arc<dyn SharedStore>,
    keys: KeyScheme,
    length: usize,
    ttl: Duration,
}

impl OtpStore {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeyScheme, length: usize, ttl: Duration) -> Self {
        Self {
            store,
            keys,
            length,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn key(&self, purpose: OtpPurpose, destination: &str) -> String {
        let suffix = format!("{}:{}", purpose, normalize_email(destination));
        self.keys.key(KeyNamespace::Otp, &suffix)
    }

    pub fn generate(&self) -> String {
        generate_code(self.length)
    }

    /// Replace any pending code for `destination` with `code`.
    pub async fn store(
        &self,
        purpose: OtpPurpose,
        destination: &str,
        code: &str,
    ) -> Result<(), StoreError> {
        self.store_with_ttl(purpose, destination, code, self.ttl).await
    }

    pub async fn store_with_ttl(
        &self,
        purpose: OtpPurpose,
        destination: &str,
        code: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        self.store
            .set_ex(&self.key(purpose, destination), &normalize_code(code), ttl)
            .await?;
        tracing::info!(
            %purpose,
            destination = %mask_email(destination),
            ttl_secs = ttl.as_secs(),
            "OTP stored"
        );
        Ok(())
    }

    /// Generate and store a fresh code, returning it for delivery.
    pub async fn issue(
        &self,
        purpose: OtpPurpose,
        destination: &str,
    ) -> Result<String, StoreError> {
        let code = self.generate();
        self.store(purpose, destination, &code).await?;
        Ok(code)
    }

    /// Consume the pending code if `candidate` matches it.
    ///
    /// Comparison and deletion happen in one store operation, so concurrent
    /// verifications of the right code yield exactly one `true`. A wrong
    /// candidate leaves the pending code in place.
    pub async fn verify(
        &self,
        purpose: OtpPurpose,
        destination: &str,
        candidate: &str,
    ) -> Result<bool, StoreError> {
        let candidate = normalize_code(candidate);
        if candidate.is_empty() {
            return Ok(false);
        }

        let consumed = self
            .store
            .delete_if_equals(&self.key(purpose, destination), &candidate)
            .await?;

        tracing::info!(
            %purpose,
            destination = %mask_email(destination),
            consumed,
            "OTP verification"
        );
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_store::MemoryStore;
    use std::collections::HashSet;

    fn otp_store(store: &MemoryStore) -> OtpStore {
        OtpStore::new(
            Arc::new(store.clone()),
            KeyScheme::default(),
            6,
            Duration::from_secs(300),
        )
    }

    #[test]
    fn test_generated_code_shape() {
        for length in [4, 6, 32] {
            let code = generate_code(length);
            assert_eq!(code.len(), length);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)), "{code}");
        }
    }

    #[test]
    fn test_generated_codes_vary() {
        let codes: HashSet<String> = (0..200).map(|_| generate_code(8)).collect();
        assert!(codes.len() > 190);
    }

    #[tokio::test]
    async fn test_key_layout() {
        let store = MemoryStore::new();
        let otps = otp_store(&store);
        otps.store(OtpPurpose::Signup, " A@B.com ", "ABC123")
            .await
            .unwrap();
        assert_eq!(
            store.get("keygate:otp:signup:a@b.com").await.unwrap().as_deref(),
            Some("ABC123")
        );
    }

    #[tokio::test]
    async fn test_purposes_are_isolated() {
        let store = MemoryStore::new();
        let otps = otp_store(&store);
        otps.store(OtpPurpose::Signup, "a@b.com", "ABC123")
            .await
            .unwrap();

        assert!(!otps
            .verify(OtpPurpose::PasswordReset, "a@b.com", "ABC123")
            .await
            .unwrap());
        assert!(otps
            .verify(OtpPurpose::Signup, "a@b.com", "ABC123")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_wrong_candidate_keeps_code() {
        let store = MemoryStore::new();
        let otps = otp_store(&store);
        otps.store(OtpPurpose::Signup, "a@b.com", "ABC123")
            .await
            .unwrap();

        assert!(!otps.verify(OtpPurpose::Signup, "a@b.com", "ZZZ999").await.unwrap());
        assert!(!otps.verify(OtpPurpose::Signup, "a@b.com", "").await.unwrap());
        assert!(otps.verify(OtpPurpose::Signup, "a@b.com", " abc123 ").await.unwrap());
    }

    #[tokio::test]
    async fn test_lowercase_stored_code_verifies() {
        let store = MemoryStore::new();
        let otps = otp_store(&store);
        otps.store(OtpPurpose::Signup, "a@b.com", "abc123")
            .await
            .unwrap();

        assert!(otps.verify(OtpPurpose::Signup, "a@b.com", "abc123").await.unwrap());
        assert!(!otps.verify(OtpPurpose::Signup, "a@b.com", "abc123").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let store = MemoryStore::new();
        let otps = otp_store(&store);
        store.set_unavailable(true);
        assert!(otps.verify(OtpPurpose::Signup, "a@b.com", "ABC123").await.is_err());
        assert!(otps.issue(OtpPurpose::Signup, "a@b.com").await.is_err());
    }
}
