/// Configuration management
///
/// Loaded from the process environment (after `.env`, see `main.rs`) with envy.
/// Every variable is the upper-case form of the field name.
use actix_middleware::{FailureMode, RateLimitPolicy};
use anyhow::{bail, Context};
use serde::Deserialize;
use shared_store::RedisStoreConfig;
use std::time::Duration;

pub const MIN_JWT_SECRET_LEN: usize = 32;
pub const OTP_LENGTH_RANGE: std::ops::RangeInclusive<usize> = 4..=32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_server_host")]
    pub server_host: String,
    #[serde(default = "default_server_port")]
    pub server_port: u16,

    /// Postgres URL; users live in memory when unset.
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_database_max_connections")]
    pub database_max_connections: u32,

    #[serde(default = "default_redis_url")]
    pub redis_url: String,
    #[serde(default = "default_redis_timeout_ms")]
    pub redis_timeout_ms: u64,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    pub jwt_secret: String,
    #[serde(default = "default_jwt_issuer")]
    pub jwt_issuer: String,
    #[serde(default = "default_jwt_audience")]
    pub jwt_audience: String,
    #[serde(default = "default_jwt_ttl_secs")]
    pub jwt_ttl_secs: u64,

    #[serde(default = "default_otp_length")]
    pub otp_length: usize,
    #[serde(default = "default_otp_ttl_secs")]
    pub otp_ttl_secs: u64,

    #[serde(default)]
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub smtp_from: String,
    #[serde(default = "default_true")]
    pub smtp_starttls: bool,

    /// Require an MX record for the signup address's domain.
    #[serde(default = "default_true")]
    pub email_domain_check: bool,

    #[serde(default = "default_request_otp_max")]
    pub rate_limit_request_otp_max: u64,
    #[serde(default = "default_verify_max")]
    pub rate_limit_verify_max: u64,
    #[serde(default = "default_login_max")]
    pub rate_limit_login_max: u64,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
    #[serde(default)]
    pub rate_limit_fail_open: bool,
    #[serde(default)]
    pub trust_forwarded_for: bool,

    #[serde(default)]
    pub log_format: LogFormat,
}

// Secrets stay out of Debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("database", &self.database_url.as_ref().map(|_| "<set>"))
            .field("redis_url", &self.redis_url)
            .field("redis_timeout_ms", &self.redis_timeout_ms)
            .field("key_prefix", &self.key_prefix)
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("jwt_ttl_secs", &self.jwt_ttl_secs)
            .field("otp_length", &self.otp_length)
            .field("otp_ttl_secs", &self.otp_ttl_secs)
            .field("smtp_host", &self.smtp_host)
            .field("email_domain_check", &self.email_domain_check)
            .field("log_format", &self.log_format)
            .finish_non_exhaustive()
    }
}

fn default_server_host() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u16 {
    8080
}

fn default_database_max_connections() -> u32 {
    5
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_timeout_ms() -> u64 {
    250
}

fn default_key_prefix() -> String {
    "keygate".to_string()
}

fn default_jwt_issuer() -> String {
    "keygate".to_string()
}

fn default_jwt_audience() -> String {
    "keygate-api".to_string()
}

fn default_jwt_ttl_secs() -> u64 {
    3600
}

fn default_otp_length() -> usize {
    6
}

fn default_otp_ttl_secs() -> u64 {
    300
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_from() -> String {
    "no-reply@keygate.local".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_otp_max() -> u64 {
    3
}

fn default_verify_max() -> u64 {
    6
}

fn default_login_max() -> u64 {
    6
}

fn default_rate_limit_window_secs() -> u64 {
    30
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config: Config =
            envy::from_env().context("Failed to load configuration from environment")?;
        config.normalized().validate()
    }

    /// Build from explicit key/value pairs (upper-case names, as in the environment).
    pub fn from_vars<I>(vars: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Config = envy::from_iter(vars).context("Failed to parse configuration")?;
        config.normalized().validate()
    }

    // Empty strings in `.env` files mean "unset".
    fn normalized(mut self) -> Self {
        for field in [
            &mut self.database_url,
            &mut self.smtp_host,
            &mut self.smtp_username,
            &mut self.smtp_password,
        ] {
            if field.as_deref().is_some_and(|v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self
    }

    pub fn validate(self) -> anyhow::Result<Self> {
        if self.jwt_secret.len() < MIN_JWT_SECRET_LEN {
            bail!("JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes");
        }
        if !OTP_LENGTH_RANGE.contains(&self.otp_length) {
            bail!(
                "OTP_LENGTH must be between {} and {}",
                OTP_LENGTH_RANGE.start(),
                OTP_LENGTH_RANGE.end()
            );
        }
        for (name, value) in [
            ("JWT_TTL_SECS", self.jwt_ttl_secs),
            ("OTP_TTL_SECS", self.otp_ttl_secs),
            ("REDIS_TIMEOUT_MS", self.redis_timeout_ms),
            ("RATE_LIMIT_WINDOW_SECS", self.rate_limit_window_secs),
            ("RATE_LIMIT_REQUEST_OTP_MAX", self.rate_limit_request_otp_max),
            ("RATE_LIMIT_VERIFY_MAX", self.rate_limit_verify_max),
            ("RATE_LIMIT_LOGIN_MAX", self.rate_limit_login_max),
        ] {
            if value == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(self)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn jwt_ttl(&self) -> Duration {
        Duration::from_secs(self.jwt_ttl_secs)
    }

    pub fn otp_ttl(&self) -> Duration {
        Duration::from_secs(self.otp_ttl_secs)
    }

    pub fn redis_store_config(&self) -> RedisStoreConfig {
        let mut store = RedisStoreConfig::new(self.redis_url.clone());
        store.command_timeout = Duration::from_millis(self.redis_timeout_ms);
        store
    }

    pub fn rate_limits(&self) -> RateLimits {
        let window = Duration::from_secs(self.rate_limit_window_secs);
        let failure_mode = if self.rate_limit_fail_open {
            FailureMode::FailOpen
        } else {
            FailureMode::FailClosed
        };
        let tune = |policy: RateLimitPolicy, max: u64| {
            policy
                .with_limit(max, window)
                .with_failure_mode(failure_mode)
                .with_trust_forwarded(self.trust_forwarded_for)
        };

        RateLimits {
            login: tune(RateLimitPolicy::login("login"), self.rate_limit_login_max),
            signup_request: tune(
                RateLimitPolicy::request_otp("signup-request-otp"),
                self.rate_limit_request_otp_max,
            ),
            signup_verify: tune(
                RateLimitPolicy::verify_otp("signup-verify-otp"),
                self.rate_limit_verify_max,
            ),
            password_request: tune(
                RateLimitPolicy::request_otp("password-request-otp"),
                self.rate_limit_request_otp_max,
            ),
            password_verify: tune(
                RateLimitPolicy::verify_otp("password-verify-otp"),
                self.rate_limit_verify_max,
            ),
            reset_request: tune(
                RateLimitPolicy::request_otp("reset-request-otp"),
                self.rate_limit_request_otp_max,
            ),
            reset_verify: tune(
                RateLimitPolicy::verify_otp("reset-verify-otp"),
                self.rate_limit_verify_max,
            ),
        }
    }
}

/// One policy per rate-limited route.
#[derive(Debug, Clone)]
pub struct RateLimits {
    pub login: RateLimitPolicy,
    pub signup_request: RateLimitPolicy,
    pub signup_verify: RateLimitPolicy,
    pub password_request: RateLimitPolicy,
    pub password_verify: RateLimitPolicy,
    pub reset_request: RateLimitPolicy,
    pub reset_verify: RateLimitPolicy,
}

impl RateLimits {
    /// Presets with the default window, failing closed.
    pub fn presets() -> Self {
        RateLimits {
            login: RateLimitPolicy::login("login"),
            signup_request: RateLimitPolicy::request_otp("signup-request-otp"),
            signup_verify: RateLimitPolicy::verify_otp("signup-verify-otp"),
            password_request: RateLimitPolicy::request_otp("password-request-otp"),
            password_verify: RateLimitPolicy::verify_otp("password-verify-otp"),
            reset_request: RateLimitPolicy::request_otp("reset-request-otp"),
            reset_verify: RateLimitPolicy::verify_otp("reset-verify-otp"),
        }
    }
}
