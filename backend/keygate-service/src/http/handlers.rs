/// HTTP handlers
///
/// Thin adapters: check required fields, call the account flow, shape the body.
use actix_web::{web, HttpResponse};
use serde_json::json;
use shared_store::SharedStore;
use std::sync::Arc;
use validator::Validate;

use super::session_auth::AuthenticatedUser;
use crate::error::Result;
use crate::models::user::{
    EmailRequest, LoginRequest, LoginResponse, MessageResponse, PasswordChangeOtpRequest,
    PasswordOtpRequest, SignupRequest,
};
use crate::models::UserProfile;
use crate::services::{AccountService, SignupInput};

const OTP_SENT: &str = "Verification OTP sent to your email";

pub async fn home(user: AuthenticatedUser) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "message": "You are authenticated",
        "user": UserProfile::from(&user.0),
    }))
}

pub async fn login(
    accounts: web::Data<AccountService>,
    payload: web::Json<LoginRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    let session = accounts.login(&payload.email, &payload.password).await?;

    Ok(HttpResponse::Ok().json(LoginResponse {
        message: format!(
            "Login successful, token is valid for {} seconds",
            session.expires_in
        ),
        token: session.token,
        expires_in: session.expires_in,
    }))
}

pub async fn logout(
    accounts: web::Data<AccountService>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    accounts.logout(user.0.id).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Logged out successfully")))
}

pub async fn signup_request_otp(
    accounts: web::Data<AccountService>,
    payload: web::Json<EmailRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    accounts.request_signup_otp(&payload.email).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(OTP_SENT)))
}

pub async fn signup_verify_otp(
    accounts: web::Data<AccountService>,
    payload: web::Json<SignupRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    let SignupRequest {
        name,
        username,
        email,
        password,
        otp,
    } = payload.into_inner();

    let user = accounts
        .complete_signup(SignupInput {
            name,
            username,
            email,
            password,
            otp,
        })
        .await?;

    Ok(HttpResponse::Created().json(json!({
        "message": "Email verified. Account created successfully.",
        "user": UserProfile::from(&user),
    })))
}

pub async fn password_request_otp(
    accounts: web::Data<AccountService>,
    payload: web::Json<PasswordChangeOtpRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    accounts
        .request_password_change_otp(&payload.email, &payload.old_password)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(OTP_SENT)))
}

pub async fn password_verify_otp(
    accounts: web::Data<AccountService>,
    payload: web::Json<PasswordOtpRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    accounts
        .complete_password_change(&payload.email, &payload.otp, &payload.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed successfully")))
}

pub async fn reset_request_otp(
    accounts: web::Data<AccountService>,
    payload: web::Json<EmailRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    accounts.request_password_reset_otp(&payload.email).await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new(OTP_SENT)))
}

pub async fn reset_verify_otp(
    accounts: web::Data<AccountService>,
    payload: web::Json<PasswordOtpRequest>,
) -> Result<HttpResponse> {
    payload.validate()?;
    accounts
        .complete_password_reset(&payload.email, &payload.otp, &payload.new_password)
        .await?;
    Ok(HttpResponse::Ok().json(MessageResponse::new("Password updated successfully")))
}

/// Liveness check endpoint
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

/// Readiness check endpoint; ready when the shared store answers.
pub async fn readiness(store: web::Data<Arc<dyn SharedStore>>) -> HttpResponse {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "ready" })),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unavailable",
                "error": "Shared store unreachable",
            }))
        }
    }
}
