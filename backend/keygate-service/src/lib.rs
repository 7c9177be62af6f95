//! Keygate service library
//!
//! Login, signup and password flows gated by emailed one-time codes, with one
//! active session per user and fixed-window rate limits on every entry point.
//! Session tokens, codes and counters all live in one [`SharedStore`].

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod security;
pub mod services;
pub mod validators;

use actix_middleware::RateLimiter;
use anyhow::Context;
use shared_store::{KeyScheme, SharedStore};
use std::sync::Arc;

pub use config::{Config, RateLimits};
pub use error::{AuthFailure, Result, ServiceError};

use db::UserRepository;
use security::{Argon2Hasher, TokenCodec, TokenStore};
use services::{
    AccountService, AllowAllDomains, DomainValidator, EmailSender, MxDomainValidator,
    NoopEmailSender, OtpStore, SmtpEmailSender, SmtpSettings,
};

/// Everything the HTTP layer needs, built once at startup.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub store: Arc<dyn SharedStore>,
    pub limiter: RateLimiter,
    pub limits: RateLimits,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn SharedStore>,
        users: Arc<dyn UserRepository>,
        email: Arc<dyn EmailSender>,
        domains: Arc<dyn DomainValidator>,
    ) -> anyhow::Result<Self> {
        let keys = KeyScheme::new(config.key_prefix.clone());
        let codec = TokenCodec::new(
            config.jwt_secret.as_bytes(),
            config.jwt_issuer.clone(),
            config.jwt_audience.clone(),
            config.jwt_ttl(),
        )
        .context("invalid JWT settings")?;

        let tokens = TokenStore::new(store.clone(), keys.clone(), Arc::new(codec));
        let otps = OtpStore::new(store.clone(), keys.clone(), config.otp_length, config.otp_ttl());
        let accounts = AccountService::new(
            users,
            Arc::new(Argon2Hasher),
            email,
            domains,
            tokens,
            otps,
            config.jwt_ttl_secs,
        );

        Ok(Self {
            accounts,
            limiter: RateLimiter::new(store.clone(), keys),
            store,
            limits: config.rate_limits(),
        })
    }
}

/// SMTP when `SMTP_HOST` is set, otherwise a sender that only logs.
pub fn email_sender_from_config(config: &Config) -> anyhow::Result<Arc<dyn EmailSender>> {
    match &config.smtp_host {
        Some(host) => {
            let settings = SmtpSettings {
                host: host.clone(),
                port: config.smtp_port,
                username: config.smtp_username.clone(),
                password: config.smtp_password.clone(),
                from: config.smtp_from.clone(),
                starttls: config.smtp_starttls,
            };
            let sender = SmtpEmailSender::new(&settings, config.otp_ttl())
                .context("failed to configure SMTP email sender")?;
            Ok(Arc::new(sender))
        }
        None => {
            tracing::warn!("SMTP_HOST not configured; codes will not be delivered");
            Ok(Arc::new(NoopEmailSender))
        }
    }
}

/// MX lookups through the system resolver unless `EMAIL_DOMAIN_CHECK=false`.
pub fn domain_validator_from_config(config: &Config) -> anyhow::Result<Arc<dyn DomainValidator>> {
    if config.email_domain_check {
        let validator =
            MxDomainValidator::from_system_conf().context("failed to configure DNS resolver")?;
        Ok(Arc::new(validator))
    } else {
        tracing::warn!("EMAIL_DOMAIN_CHECK disabled; signup domains are not checked");
        Ok(Arc::new(AllowAllDomains))
    }
}
