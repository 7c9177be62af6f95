use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    http::header,
    Error, FromRequest, HttpMessage, HttpRequest, ResponseError,
};
use futures::future::{ready, Ready};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::error::{AuthFailure, ServiceError};
use crate::models::User;
use crate::services::AccountService;

/// The user behind the current session, inserted by [`SessionAuth`].
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Bearer-token guard for protected routes.
///
/// The token must be the user's current session (see `TokenStore::authenticate`)
/// and the user must still exist.
pub struct SessionAuth {
    accounts: AccountService,
}

impl SessionAuth {
    pub fn new(accounts: AccountService) -> Self {
        Self { accounts }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SessionAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = SessionAuthService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SessionAuthService {
            service: Rc::new(service),
            accounts: self.accounts.clone(),
        }))
    }
}

pub struct SessionAuthService<S> {
    service: Rc<S>,
    accounts: AccountService,
}

impl<S, B> Service<ServiceRequest> for SessionAuthService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>>>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let accounts = self.accounts.clone();

        Box::pin(async move {
            let token = bearer_token(&req).map(str::to_string);
            match authenticate(&accounts, token.as_deref()).await {
                Ok(user) => {
                    req.extensions_mut().insert(AuthenticatedUser(user));
                    let res = service.call(req).await?;
                    Ok(res.map_into_left_body())
                }
                Err(err) => {
                    if err.is_dependency() {
                        tracing::error!(error = %err, "Session check failed");
                    } else {
                        tracing::info!(error = %err, path = %req.path(), "Session rejected");
                    }
                    Ok(req.into_response(err.error_response()).map_into_right_body())
                }
            }
        })
    }
}

fn bearer_token(req: &ServiceRequest) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn authenticate(
    accounts: &AccountService,
    token: Option<&str>,
) -> Result<User, ServiceError> {
    let token = token.ok_or(ServiceError::Auth(AuthFailure::MissingToken))?;
    let (user_id, _claims) = accounts.tokens().authenticate(token).await?;
    accounts.profile(user_id).await
}

impl FromRequest for AuthenticatedUser {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        match req.extensions().get::<AuthenticatedUser>() {
            Some(user) => ready(Ok(user.clone())),
            None => ready(Err(ServiceError::Auth(AuthFailure::MissingToken).into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    #[test]
    fn test_bearer_token_parsing() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer abc.def.ghi"))
            .to_srv_request();
        assert_eq!(bearer_token(&req), Some("abc.def.ghi"));

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Basic dXNlcjpwYXNz"))
            .to_srv_request();
        assert_eq!(bearer_token(&req), None);

        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, "Bearer "))
            .to_srv_request();
        assert_eq!(bearer_token(&req), None);

        assert_eq!(bearer_token(&TestRequest::default().to_srv_request()), None);
    }
}
