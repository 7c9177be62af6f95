//! Key namespaces.
//!
//! Every component writes under its own namespace so session tokens, one-time
//! codes and rate-limit counters can never collide, whatever the caller-supplied
//! suffix looks like.

use std::fmt;

const DEFAULT_PREFIX: &str = "keygate";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyNamespace {
    Session,
    Otp,
    RateLimit,
}

impl KeyNamespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyNamespace::Session => "session",
            KeyNamespace::Otp => "otp",
            KeyNamespace::RateLimit => "ratelimit",
        }
    }
}

impl fmt::Display for KeyNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders `<prefix>:<namespace>:<suffix>` keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyScheme {
    prefix: String,
}

impl KeyScheme {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim().trim_end_matches(':').to_string();
        if prefix.is_empty() {
            Self::default()
        } else {
            Self { prefix }
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn key(&self, namespace: KeyNamespace, suffix: &str) -> String {
        format!("{}:{}:{}", self.prefix, namespace, suffix)
    }
}

impl Default for KeyScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}
