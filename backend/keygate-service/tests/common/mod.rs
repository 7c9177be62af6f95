//! Test fixtures and helpers shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use keygate_service::db::{MemoryUserRepository, UserRepository};
use keygate_service::services::{AllowAllDomains, EmailError, EmailSender, OtpPurpose};
use keygate_service::{AppState, Config};
use parking_lot::Mutex;
use shared_store::{MemoryStore, SharedStore};
use std::sync::Arc;

pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const TEST_EMAIL: &str = "a@b.com";
pub const TEST_NAME: &str = "Test User";
pub const TEST_USERNAME: &str = "testuser";
pub const TEST_PASSWORD: &str = "SecurePass123!";
pub const NEW_PASSWORD: &str = "EvenBetter456$";

/// Weak passwords for testing validation
pub fn weak_passwords() -> Vec<&'static str> {
    vec![
        "Sh0rt!",          // Too short
        "nouppercase123!", // No uppercase
        "NOLOWERCASE123!", // No lowercase
        "NoDigitsHere!",   // No digits
        "NoSpecial123",    // No special characters
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentCode {
    pub destination: String,
    pub code: String,
    pub purpose: OtpPurpose,
}

/// Records every send attempt; can be switched to fail.
#[derive(Default)]
pub struct RecordingEmailSender {
    sent: Mutex<Vec<SentCode>>,
    failing: Mutex<bool>,
}

impl RecordingEmailSender {
    pub fn sent(&self) -> Vec<SentCode> {
        self.sent.lock().clone()
    }

    pub fn last_code(&self) -> Option<String> {
        self.sent.lock().last().map(|s| s.code.clone())
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }
}

#[async_trait]
impl EmailSender for RecordingEmailSender {
    async fn send_otp(
        &self,
        destination: &str,
        code: &str,
        purpose: OtpPurpose,
    ) -> Result<(), EmailError> {
        self.sent.lock().push(SentCode {
            destination: destination.to_string(),
            code: code.to_string(),
            purpose,
        });
        if *self.failing.lock() {
            return Err(EmailError::Transport("smtp relay unreachable".into()));
        }
        Ok(())
    }
}

pub fn test_config(extra: &[(&str, &str)]) -> Config {
    let mut vars = vec![("JWT_SECRET".to_string(), TEST_SECRET.to_string())];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));
    Config::from_vars(vars).expect("test config")
}

pub struct Harness {
    pub state: AppState,
    pub store: MemoryStore,
    pub users: MemoryUserRepository,
    pub email: Arc<RecordingEmailSender>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config(&[]))
    }

    pub fn with_config(config: Config) -> Self {
        let store = MemoryStore::new();
        let users = MemoryUserRepository::new();
        let email = Arc::new(RecordingEmailSender::default());

        let shared: Arc<dyn SharedStore> = Arc::new(store.clone());
        let repo: Arc<dyn UserRepository> = Arc::new(users.clone());
        let sender: Arc<dyn EmailSender> = email.clone();
        let state = AppState::new(&config, shared, repo, sender, Arc::new(AllowAllDomains))
            .expect("app state");

        Self {
            state,
            store,
            users,
            email,
        }
    }
}
