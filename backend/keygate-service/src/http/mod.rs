//! HTTP surface.
//!
//! ```text
//! GET  /health
//! GET  /readiness
//! GET  /api/v1/home                               session
//! POST /api/v1/auth/login                         rate: login
//! POST /api/v1/auth/logout                        session
//! POST /api/v1/auth/signup/request-otp            rate: request otp
//! POST /api/v1/auth/signup/verify-otp             rate: verify otp
//! POST /api/v1/users/password/request-otp         rate: request otp
//! POST /api/v1/users/password/verify-otp          rate: verify otp
//! POST /api/v1/users/password/reset/request-otp   rate: request otp
//! POST /api/v1/users/password/reset/verify-otp    rate: verify otp
//! ```

use actix_middleware::{RateLimitMiddleware, RateLimitPolicy};
use actix_web::{error::JsonPayloadError, web, HttpRequest};

use crate::error::ServiceError;
use crate::AppState;

pub mod handlers;
pub mod session_auth;

pub use session_auth::{AuthenticatedUser, SessionAuth};

/// Malformed bodies answer 400 in the usual error shape.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(16 * 1024)
        .error_handler(|err: JsonPayloadError, _req: &HttpRequest| {
            let message = match &err {
                JsonPayloadError::ContentType => "Content-Type must be application/json",
                JsonPayloadError::Overflow { .. }
                | JsonPayloadError::OverflowKnownLength { .. } => "Request body too large",
                _ => "Invalid JSON syntax",
            };
            tracing::debug!(error = %err, "Rejected request body");
            ServiceError::validation(message).into()
        })
}

pub fn configure(cfg: &mut web::ServiceConfig, state: &AppState) {
    let limited = |policy: &RateLimitPolicy| {
        RateLimitMiddleware::new(state.limiter.clone(), policy.clone())
    };
    let session = || SessionAuth::new(state.accounts.clone());
    let limits = &state.limits;

    cfg.app_data(json_config())
        .app_data(web::Data::new(state.accounts.clone()))
        .app_data(web::Data::new(state.store.clone()))
        .route("/health", web::get().to(handlers::health))
        .route("/readiness", web::get().to(handlers::readiness))
        .service(
            web::scope("/api/v1")
                .service(
                    web::resource("/home")
                        .wrap(session())
                        .route(web::get().to(handlers::home)),
                )
                .service(
                    web::resource("/auth/login")
                        .wrap(limited(&limits.login))
                        .route(web::post().to(handlers::login)),
                )
                .service(
                    web::resource("/auth/logout")
                        .wrap(session())
                        .route(web::post().to(handlers::logout)),
                )
                .service(
                    web::resource("/auth/signup/request-otp")
                        .wrap(limited(&limits.signup_request))
                        .route(web::post().to(handlers::signup_request_otp)),
                )
                .service(
                    web::resource("/auth/signup/verify-otp")
                        .wrap(limited(&limits.signup_verify))
                        .route(web::post().to(handlers::signup_verify_otp)),
                )
                .service(
                    web::resource("/users/password/request-otp")
                        .wrap(limited(&limits.password_request))
                        .route(web::post().to(handlers::password_request_otp)),
                )
                .service(
                    web::resource("/users/password/verify-otp")
                        .wrap(limited(&limits.password_verify))
                        .route(web::post().to(handlers::password_verify_otp)),
                )
                .service(
                    web::resource("/users/password/reset/request-otp")
                        .wrap(limited(&limits.reset_request))
                        .route(web::post().to(handlers::reset_request_otp)),
                )
                .service(
                    web::resource("/users/password/reset/verify-otp")
                        .wrap(limited(&limits.reset_verify))
                        .route(web::post().to(handlers::reset_verify_otp)),
                ),
        );
}
