use actix_web::{
    http::{header, StatusCode},
    HttpResponse, ResponseError,
};
use actix_middleware::RateLimitError;
use serde_json::json;
use shared_store::StoreError;
use std::time::Duration;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::security::{PasswordError, TokenError};
use crate::services::{DomainError, EmailError};

/// Why an authentication step was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Authorization token missing")]
    MissingToken,

    #[error("Session expired, please log in again")]
    TokenExpired,

    #[error("Session is no longer active")]
    TokenSuperseded,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Invalid or expired OTP")]
    OtpRejected,
}

/// Service-level outcome taxonomy.
///
/// Everything except `Dependency` is an expected business result and goes back
/// to the caller as-is. `Dependency` covers the store, the user database, the
/// password hasher and the email sender; its details are logged, never returned.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Auth(AuthFailure),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Too many requests, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Dependency failure: {0}")]
    Dependency(String),
}

pub type Result<T> = std::result::Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ServiceError::Validation(msg.into())
    }

    pub fn is_dependency(&self) -> bool {
        matches!(self, ServiceError::Dependency(_))
    }

    fn public_message(&self) -> String {
        match self {
            ServiceError::Dependency(_) => "Service temporarily unavailable".to_string(),
            other => other.to_string(),
        }
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut builder = HttpResponse::build(status);

        if let ServiceError::RateLimited { retry_after } = self {
            let secs = retry_after.as_secs().max(1);
            builder.insert_header((header::RETRY_AFTER, secs.to_string()));
            return builder.json(json!({
                "error": self.public_message(),
                "retryAfter": secs,
                "status": status.as_u16(),
            }));
        }

        builder.json(json!({
            "error": self.public_message(),
            "status": status.as_u16(),
        }))
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Shared store failure");
        ServiceError::Dependency(err.to_string())
    }
}

impl From<TokenError> for ServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ServiceError::Auth(AuthFailure::TokenExpired),
            TokenError::Mismatch => ServiceError::Auth(AuthFailure::TokenSuperseded),
            TokenError::Invalid(reason) => {
                tracing::debug!(%reason, "Token rejected");
                ServiceError::Auth(AuthFailure::TokenInvalid)
            }
            TokenError::Store(e) => e.into(),
        }
    }
}

impl From<RateLimitError> for ServiceError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Limited { retry_after } => ServiceError::RateLimited { retry_after },
            RateLimitError::Store(e) => e.into(),
        }
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(what) => {
                ServiceError::Conflict(format!("{what} already exists"))
            }
            RepositoryError::Database(msg) => {
                tracing::error!(error = %msg, "User database failure");
                ServiceError::Dependency(msg)
            }
        }
    }
}

impl From<PasswordError> for ServiceError {
    fn from(err: PasswordError) -> Self {
        tracing::error!(error = %err, "Password hasher failure");
        ServiceError::Dependency(err.to_string())
    }
}

impl From<EmailError> for ServiceError {
    fn from(err: EmailError) -> Self {
        tracing::error!(error = %err, "Email delivery failure");
        ServiceError::Dependency(err.to_string())
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        tracing::error!(error = %err, "Email domain lookup failure");
        ServiceError::Dependency(err.to_string())
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("{field} is invalid"))
                })
            })
            .collect();
        messages.sort();
        ServiceError::Validation(messages.join("; "))
    }
}
