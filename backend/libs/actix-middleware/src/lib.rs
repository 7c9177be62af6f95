//! # Actix Middleware Library
//!
//! Middleware shared by Keygate HTTP services
//!
//! ## Modules
//! - `rate_limit`: fixed-window rate limiter on the shared store, and its middleware
//! - `correlation_id`: request correlation ids
//! - `logging`: request/response logging

pub mod correlation_id;
pub mod logging;
pub mod rate_limit;

pub use correlation_id::{get_correlation_id, CorrelationId, CorrelationIdMiddleware};
pub use logging::Logging;
pub use rate_limit::{
    FailureMode, RateLimitError, RateLimitKey, RateLimitMiddleware, RateLimitPolicy, RateLimiter,
};
