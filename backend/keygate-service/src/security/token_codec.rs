//! Session token encoding.
//!
//! HS256 JWTs carrying `sub`, `iat`, `exp`, `iss`, `aud` and a random `jti`.
//! The codec is stateless; whether a well-formed token is still the *current*
//! session is decided by [`super::TokenStore`].

use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::MIN_JWT_SECRET_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub iss: String,
    pub aud: String,
    pub jti: String,
}

impl Claims {
    pub fn subject(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    #[error("signing secret must be at least {MIN_JWT_SECRET_LEN} bytes")]
    WeakSecret,

    #[error("token expired")]
    Expired,

    #[error("invalid token: {0}")]
    Invalid(String),

    #[error("failed to encode token: {0}")]
    Encoding(String),
}

pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    issuer: String,
    audience: String,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        secret: &[u8],
        issuer: impl Into<String>,
        audience: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, CodecError> {
        if secret.len() < MIN_JWT_SECRET_LEN {
            return Err(CodecError::WeakSecret);
        }
        let issuer = issuer.into();
        let audience = audience.into();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = true;
        validation.set_issuer(&[issuer.as_str()]);
        validation.set_audience(&[audience.as_str()]);
        validation.set_required_spec_claims(&["sub", "iat", "exp", "iss", "aud"]);

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            issuer,
            audience,
            ttl,
        })
    }

    /// Lifetime of a freshly minted token.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn encode(&self, subject: Uuid) -> Result<String, CodecError> {
        self.encode_at(subject, Utc::now().timestamp())
    }

    pub(crate) fn encode_at(&self, subject: Uuid, issued_at: i64) -> Result<String, CodecError> {
        let claims = Claims {
            sub: subject.to_string(),
            iat: issued_at,
            exp: issued_at + self.ttl.as_secs() as i64,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Verify signature, expiry, issuer and audience.
    pub fn decode(&self, token: &str) -> Result<Claims, CodecError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => CodecError::Expired,
                _ => CodecError::Invalid(e.to_string()),
            })
    }
}
