//! User model and request/response bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::validators::validate_not_blank;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload; the repository assigns id and timestamps.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: user.email.clone(),
            created_at: user.created_at,
        }
    }
}

// Missing fields deserialize as empty strings so they surface as
// "<field> cannot be empty" rather than a JSON error.

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct LoginRequest {
    /// Email address or username.
    #[serde(alias = "username", alias = "identifier")]
    #[validate(custom(function = "validate_not_blank", message = "email cannot be empty"))]
    pub email: String,
    #[validate(custom(function = "validate_not_blank", message = "password cannot be empty"))]
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct EmailRequest {
    #[validate(custom(function = "validate_not_blank", message = "email cannot be empty"))]
    pub email: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct SignupRequest {
    #[validate(custom(function = "validate_not_blank", message = "name cannot be empty"))]
    pub name: String,
    #[validate(custom(function = "validate_not_blank", message = "username cannot be empty"))]
    pub username: String,
    #[validate(custom(function = "validate_not_blank", message = "email cannot be empty"))]
    pub email: String,
    #[validate(custom(function = "validate_not_blank", message = "password cannot be empty"))]
    pub password: String,
    #[validate(custom(function = "validate_not_blank", message = "otp cannot be empty"))]
    pub otp: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PasswordChangeOtpRequest {
    #[validate(custom(function = "validate_not_blank", message = "email cannot be empty"))]
    pub email: String,
    #[serde(rename = "oldpassword", alias = "oldPassword")]
    #[validate(custom(function = "validate_not_blank", message = "oldpassword cannot be empty"))]
    pub old_password: String,
}

/// Completes both password change and password reset.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
pub struct PasswordOtpRequest {
    #[validate(custom(function = "validate_not_blank", message = "email cannot be empty"))]
    pub email: String,
    #[validate(custom(function = "validate_not_blank", message = "otp cannot be empty"))]
    pub otp: String,
    #[serde(rename = "newpassword", alias = "newPassword")]
    #[validate(custom(function = "validate_not_blank", message = "newpassword cannot be empty"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
