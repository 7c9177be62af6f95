//! Fixed-window rate limiting on the shared store.
//!
//! [`RateLimiter`] is the decision core and can be called directly.
//! [`RateLimitMiddleware`] wraps one route with a [`RateLimitPolicy`].

use actix_web::{
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform},
    http::{header, StatusCode},
    Error, HttpResponse,
};
use futures::future::{ready, Ready};
use serde_json::json;
use shared_store::{KeyNamespace, KeyScheme, KeyTtl, SharedStore, StoreError};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Counter identity: a stable route name plus a per-client identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    pub fn new(route: &str, client: &str) -> Self {
        Self(format!("{route}:{client}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum RateLimitError {
    #[error("rate limited, retry after {}s", .retry_after.as_secs())]
    Limited { retry_after: Duration },

    #[error("rate limit store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    keys: KeyScheme,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, keys: KeyScheme) -> Self {
        Self { store, keys }
    }

    /// Count one request against `key` and decide.
    ///
    /// The window opens on the first request and closes when its counter
    /// expires; later requests never move the boundary. Requests beyond
    /// `limit` get [`RateLimitError::Limited`] with the time left in the
    /// window (at least one second).
    pub async fn allow(
        &self,
        key: &RateLimitKey,
        limit: u64,
        window: Duration,
    ) -> Result<(), RateLimitError> {
        let store_key = self.keys.key(KeyNamespace::RateLimit, key.as_str());
        let count = self.store.increment_in_window(&store_key, window).await?;

        if count <= 0 || (count as u64) <= limit {
            return Ok(());
        }

        let retry_after = self.retry_hint(&store_key, window).await;
        tracing::debug!(
            key = %key,
            count,
            limit,
            retry_after_secs = retry_after.as_secs(),
            "Rate limit exceeded"
        );
        Err(RateLimitError::Limited { retry_after })
    }

    async fn retry_hint(&self, store_key: &str, window: Duration) -> Duration {
        match self.store.ttl(store_key).await {
            Ok(KeyTtl::Expires(left)) => left.max(MIN_RETRY_AFTER),
            // Window closed between the increment and the TTL query.
            Ok(KeyTtl::Missing) => MIN_RETRY_AFTER,
            Ok(KeyTtl::Persistent) => {
                tracing::error!(
                    key = store_key,
                    "Rate limit counter has no expiry; window will not close on its own"
                );
                window
            }
            Err(e) => {
                tracing::warn!(key = store_key, error = %e, "Rate limit TTL lookup failed");
                window
            }
        }
    }
}

/// What the middleware does when the store cannot answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    FailOpen,
    #[default]
    FailClosed,
}

#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Stable route identifier used in counter keys.
    pub route: String,
    pub max_requests: u64,
    pub window: Duration,
    pub failure_mode: FailureMode,
    /// Use the first `X-Forwarded-For` hop as the client address.
    pub trust_forwarded: bool,
}

impl RateLimitPolicy {
    pub fn new(route: impl Into<String>, max_requests: u64, window: Duration) -> Self {
        Self {
            route: route.into(),
            max_requests,
            window,
            failure_mode: FailureMode::default(),
            trust_forwarded: false,
        }
    }

    /// Code requests trigger an email, so they get the tightest budget.
    pub fn request_otp(route: impl Into<String>) -> Self {
        Self::new(route, 3, Duration::from_secs(30))
    }

    pub fn verify_otp(route: impl Into<String>) -> Self {
        Self::new(route, 6, Duration::from_secs(30))
    }

    pub fn login(route: impl Into<String>) -> Self {
        Self::new(route, 6, Duration::from_secs(30))
    }

    pub fn with_limit(mut self, max_requests: u64, window: Duration) -> Self {
        self.max_requests = max_requests;
        self.window = window;
        self
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    pub fn with_trust_forwarded(mut self, trust_forwarded: bool) -> Self {
        self.trust_forwarded = trust_forwarded;
        self
    }
}

pub struct RateLimitMiddleware {
    limiter: RateLimiter,
    policy: Rc<RateLimitPolicy>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: RateLimiter, policy: RateLimitPolicy) -> Self {
        Self {
            limiter,
            policy: Rc::new(policy),
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            policy: self.policy.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: RateLimiter,
    policy: Rc<RateLimitPolicy>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    actix_web::dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let policy = self.policy.clone();

        Box::pin(async move {
            let client = client_address(&req, policy.trust_forwarded);
            let key = RateLimitKey::new(&policy.route, &client);

            match limiter
                .allow(&key, policy.max_requests, policy.window)
                .await
            {
                Ok(()) => {}
                Err(RateLimitError::Limited { retry_after }) => {
                    tracing::info!(
                        route = %policy.route,
                        client = %client,
                        retry_after_secs = retry_after.as_secs(),
                        "Request rejected by rate limit"
                    );
                    let response = too_many_requests(retry_after);
                    return Ok(req.into_response(response).map_into_right_body());
                }
                Err(RateLimitError::Store(e)) => match policy.failure_mode {
                    FailureMode::FailOpen => {
                        tracing::warn!(
                            route = %policy.route,
                            error = %e,
                            "Rate limit store failed, allowing request"
                        );
                    }
                    FailureMode::FailClosed => {
                        tracing::error!(
                            route = %policy.route,
                            error = %e,
                            "Rate limit store failed, rejecting request"
                        );
                        let response = service_unavailable();
                        return Ok(req.into_response(response).map_into_right_body());
                    }
                },
            }

            let res = service.call(req).await?;
            Ok(res.map_into_left_body())
        })
    }
}

fn client_address(req: &ServiceRequest, trust_forwarded: bool) -> String {
    if trust_forwarded {
        let forwarded = req
            .headers()
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    req.peer_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn too_many_requests(retry_after: Duration) -> HttpResponse {
    let secs = retry_after.as_secs().max(1);
    HttpResponse::build(StatusCode::TOO_MANY_REQUESTS)
        .insert_header((header::RETRY_AFTER, secs.to_string()))
        .json(json!({
            "error": "Too many requests, please try again later",
            "retryAfter": secs,
            "status": StatusCode::TOO_MANY_REQUESTS.as_u16(),
        }))
}

fn service_unavailable() -> HttpResponse {
    HttpResponse::build(StatusCode::SERVICE_UNAVAILABLE).json(json!({
        "error": "Service temporarily unavailable",
        "status": StatusCode::SERVICE_UNAVAILABLE.as_u16(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;
    use shared_store::MemoryStore;

    fn limiter(store: &MemoryStore) -> RateLimiter {
        RateLimiter::new(Arc::new(store.clone()), KeyScheme::default())
    }

    #[test]
    fn test_key_format() {
        let key = RateLimitKey::new("/api/v1/login", "10.0.0.1");
        assert_eq!(key.as_str(), "/api/v1/login:10.0.0.1");
    }

    #[test]
    fn test_presets() {
        let otp = RateLimitPolicy::request_otp("request-otp");
        assert_eq!(otp.max_requests, 3);
        assert_eq!(otp.window, Duration::from_secs(30));
        assert_eq!(otp.failure_mode, FailureMode::FailClosed);

        let verify = RateLimitPolicy::verify_otp("verify-otp");
        assert_eq!(verify.max_requests, 6);
        assert!(verify.max_requests > otp.max_requests);

        let login = RateLimitPolicy::login("login")
            .with_limit(10, Duration::from_secs(60))
            .with_failure_mode(FailureMode::FailOpen);
        assert_eq!(login.max_requests, 10);
        assert_eq!(login.window, Duration::from_secs(60));
        assert_eq!(login.failure_mode, FailureMode::FailOpen);
    }

    #[tokio::test]
    async fn test_counter_lives_in_rate_limit_namespace() {
        let store = MemoryStore::new();
        let key = RateLimitKey::new("login", "1.2.3.4");
        limiter(&store)
            .allow(&key, 5, Duration::from_secs(30))
            .await
            .unwrap();

        let raw = store.get("keygate:ratelimit:login:1.2.3.4").await.unwrap();
        assert_eq!(raw.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_first_request() {
        let store = MemoryStore::new();
        let key = RateLimitKey::new("closed", "c");
        let result = limiter(&store).allow(&key, 0, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(RateLimitError::Limited { .. })));
    }

    #[tokio::test]
    async fn test_persistent_counter_uses_window_as_hint() {
        let store = MemoryStore::new();
        // A counter that lost its expiry, e.g. written by an older deployment.
        store.incr("keygate:ratelimit:stuck:c").await.unwrap();

        let key = RateLimitKey::new("stuck", "c");
        let result = limiter(&store).allow(&key, 1, Duration::from_secs(30)).await;
        assert_eq!(
            result,
            Err(RateLimitError::Limited {
                retry_after: Duration::from_secs(30)
            })
        );
        assert_eq!(
            store.ttl("keygate:ratelimit:stuck:c").await.unwrap(),
            KeyTtl::Persistent,
            "the limiter must not attach a late expiry"
        );
    }

    #[tokio::test]
    async fn test_store_failure_is_distinct_from_limit() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let key = RateLimitKey::new("login", "c");
        let result = limiter(&store).allow(&key, 5, Duration::from_secs(30)).await;
        assert!(matches!(result, Err(RateLimitError::Store(_))));
    }

    #[test]
    fn test_client_address_prefers_peer_by_default() {
        let req = TestRequest::default()
            .peer_addr("10.1.1.1:5555".parse().unwrap())
            .insert_header(("x-forwarded-for", "203.0.113.9, 10.0.0.2"))
            .to_srv_request();
        assert_eq!(client_address(&req, false), "10.1.1.1");
        assert_eq!(client_address(&req, true), "203.0.113.9");
    }

    #[test]
    fn test_client_address_without_peer() {
        let req = TestRequest::default().to_srv_request();
        assert_eq!(client_address(&req, true), "unknown");
    }
}
