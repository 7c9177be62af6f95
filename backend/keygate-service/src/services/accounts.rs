//! Account flows.
//!
//! Each flow runs its steps in order and stops at the first failure. Nothing
//! is retried and nothing is rolled back: a password update that fails after
//! its code was consumed leaves the code consumed.

use std::sync::Arc;
use uuid::Uuid;

use super::domain::{email_domain, DomainValidator};
use super::email::EmailSender;
use super::otp::{OtpPurpose, OtpStore};
use crate::db::UserRepository;
use crate::error::{AuthFailure, Result, ServiceError};
use crate::models::{NewUser, User};
use crate::security::{PasswordHasher, TokenStore};
use crate::validators::{
    mask_email, normalize_email, validate_email, validate_password, validate_username,
};

const INVALID_EMAIL: &str = "Invalid email format";
const INVALID_DOMAIN: &str = "Invalid email domain";
const WEAK_PASSWORD: &str = "Password must be at least 8 characters long and contain an uppercase letter, a lowercase letter, a digit and a special character";
const INVALID_USERNAME: &str =
    "Username must be 3-32 characters of letters, digits, '_' or '-'";
const USER_NOT_FOUND: &str = "User not found";

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: Uuid,
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone)]
pub struct SignupInput {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub otp: String,
}

#[derive(Clone)]
pub struct AccountService {
    users: Arc<dyn UserRepository>,
    hasher: Arc<dyn PasswordHasher>,
    email: Arc<dyn EmailSender>,
    domains: Arc<dyn DomainValidator>,
    tokens: TokenStore,
    otps: OtpStore,
    session_ttl_secs: u64,
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(ServiceError::validation(format!("{field} cannot be empty")))
    } else {
        Ok(())
    }
}

fn checked_email(email: &str) -> Result<String> {
    require("email", email)?;
    let email = normalize_email(email);
    if validate_email(&email) {
        Ok(email)
    } else {
        Err(ServiceError::validation(INVALID_EMAIL))
    }
}

fn check_password_policy(password: &str) -> Result<()> {
    if validate_password(password) {
        Ok(())
    } else {
        Err(ServiceError::validation(WEAK_PASSWORD))
    }
}

impl AccountService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        hasher: Arc<dyn PasswordHasher>,
        email: Arc<dyn EmailSender>,
        domains: Arc<dyn DomainValidator>,
        tokens: TokenStore,
        otps: OtpStore,
        session_ttl_secs: u64,
    ) -> Self {
        Self {
            users,
            hasher,
            email,
            domains,
            tokens,
            otps,
            session_ttl_secs,
        }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn users(&self) -> &Arc<dyn UserRepository> {
        &self.users
    }

    async fn user_by_email(&self, email: &str) -> Result<User> {
        self.users
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(USER_NOT_FOUND.to_string()))
    }

    async fn send_code(&self, purpose: OtpPurpose, email: &str) -> Result<()> {
        let code = self.otps.issue(purpose, email).await?;
        self.email.send_otp(email, &code, purpose).await?;
        Ok(())
    }

    async fn consume_code(&self, purpose: OtpPurpose, email: &str, otp: &str) -> Result<()> {
        if self.otps.verify(purpose, email, otp).await? {
            Ok(())
        } else {
            Err(ServiceError::Auth(AuthFailure::OtpRejected))
        }
    }

    /// Revoke the session first, so the old token is dead even if the update fails.
    async fn replace_password(&self, user: &User, new_password: &str) -> Result<()> {
        let hash = self.hasher.hash(new_password)?;
        self.tokens.revoke(user.id).await?;
        if !self.users.update_password(user.id, &hash).await? {
            return Err(ServiceError::NotFound(USER_NOT_FOUND.to_string()));
        }
        Ok(())
    }

    /// Log in with an email address or a username.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session> {
        require("email", identifier)?;
        require("password", password)?;

        let user = self
            .users
            .find_by_email_or_username(identifier)
            .await?
            .ok_or_else(|| ServiceError::NotFound(USER_NOT_FOUND.to_string()))?;

        if !self.hasher.verify(password, &user.password_hash)? {
            tracing::info!(user_id = %user.id, "Login rejected: wrong password");
            return Err(ServiceError::Auth(AuthFailure::InvalidCredentials));
        }

        let token = self.tokens.issue(user.id).await?;
        tracing::info!(user_id = %user.id, "Login succeeded");
        Ok(Session {
            user_id: user.id,
            token,
            expires_in: self.session_ttl_secs,
        })
    }

    pub async fn logout(&self, user_id: Uuid) -> Result<()> {
        self.tokens.revoke(user_id).await?;
        Ok(())
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(USER_NOT_FOUND.to_string()))
    }

    pub async fn request_signup_otp(&self, email: &str) -> Result<()> {
        let email = checked_email(email)?;
        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(
                "User already exists. Please login.".to_string(),
            ));
        }

        let domain = email_domain(&email).ok_or_else(|| ServiceError::validation(INVALID_EMAIL))?;
        if !self.domains.has_mail_exchanger(domain).await? {
            tracing::info!(%domain, "Signup rejected: no MX records");
            return Err(ServiceError::validation(INVALID_DOMAIN));
        }

        self.send_code(OtpPurpose::Signup, &email).await?;
        tracing::info!(email = %mask_email(&email), "Signup code sent");
        Ok(())
    }

    /// Consume the signup code and create the account.
    pub async fn complete_signup(&self, input: SignupInput) -> Result<User> {
        require("name", &input.name)?;
        require("username", &input.username)?;
        require("password", &input.password)?;
        require("otp", &input.otp)?;
        let email = checked_email(&input.email)?;
        let username = input.username.trim().to_string();
        if !validate_username(&username) {
            return Err(ServiceError::validation(INVALID_USERNAME));
        }
        check_password_policy(&input.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict(
                "User already exists. Please login.".to_string(),
            ));
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Username already exists, choose a different one".to_string(),
            ));
        }

        self.consume_code(OtpPurpose::Signup, &email, &input.otp)
            .await?;

        let password_hash = self.hasher.hash(&input.password)?;
        let user = self
            .users
            .create_user(NewUser {
                name: input.name.trim().to_string(),
                username,
                email,
                password_hash,
            })
            .await?;

        tracing::info!(user_id = %user.id, email = %mask_email(&user.email), "Account created");
        Ok(user)
    }

    /// Check the current password, then send a code for the change.
    pub async fn request_password_change_otp(&self, email: &str, old_password: &str) -> Result<()> {
        let email = checked_email(email)?;
        require("oldpassword", old_password)?;
        let user = self.user_by_email(&email).await?;

        if !self.hasher.verify(old_password, &user.password_hash)? {
            return Err(ServiceError::Auth(AuthFailure::InvalidCredentials));
        }

        self.send_code(OtpPurpose::PasswordChange, &email).await?;
        tracing::info!(user_id = %user.id, "Password change code sent");
        Ok(())
    }

    pub async fn complete_password_change(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<()> {
        let email = checked_email(email)?;
        require("otp", otp)?;
        require("newpassword", new_password)?;
        let user = self.user_by_email(&email).await?;

        if self.hasher.verify(new_password, &user.password_hash)? {
            return Err(ServiceError::validation(
                "New password cannot be the same as the old one",
            ));
        }
        check_password_policy(new_password)?;

        self.consume_code(OtpPurpose::PasswordChange, &email, otp)
            .await?;
        self.replace_password(&user, new_password).await?;

        tracing::info!(user_id = %user.id, "Password changed");
        Ok(())
    }

    pub async fn request_password_reset_otp(&self, email: &str) -> Result<()> {
        let email = checked_email(email)?;
        let user = self.user_by_email(&email).await?;

        self.send_code(OtpPurpose::PasswordReset, &email).await?;
        tracing::info!(user_id = %user.id, "Password reset code sent");
        Ok(())
    }

    pub async fn complete_password_reset(
        &self,
        email: &str,
        otp: &str,
        new_password: &str,
    ) -> Result<()> {
        let email = checked_email(email)?;
        require("otp", otp)?;
        require("newpassword", new_password)?;
        let user = self.user_by_email(&email).await?;
        check_password_policy(new_password)?;

        self.consume_code(OtpPurpose::PasswordReset, &email, otp)
            .await?;
        self.replace_password(&user, new_password).await?;

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(())
    }
}
