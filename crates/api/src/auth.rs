//! Bearer token issuing and request authentication.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use common::{Role, UserId};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use store::User;
use thiserror::Error;

use crate::error::ApiError;

/// Errors that can occur when issuing or checking tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Missing authorization token")]
    Missing,

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token")]
    Invalid,

    #[error("Token encoding failed: {0}")]
    Encode(jsonwebtoken::errors::Error),
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: UserId,
    pub email: String,
    pub role: Role,
    /// Expiration (Unix timestamp seconds).
    pub exp: i64,
    /// Issued at (Unix timestamp seconds).
    pub iat: i64,
}

struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expires: Duration,
}

/// Issues and validates HS256 bearer tokens.
#[derive(Clone)]
pub struct TokenService {
    keys: Arc<TokenKeys>,
}

impl TokenService {
    pub fn new(secret: &str, expires: Duration) -> Self {
        Self {
            keys: Arc::new(TokenKeys {
                encoding: EncodingKey::from_secret(secret.as_bytes()),
                decoding: DecodingKey::from_secret(secret.as_bytes()),
                expires,
            }),
        }
    }

    /// Issues a token for the user.
    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            exp: (now + self.keys.expires).timestamp(),
            iat: now.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.keys.encoding)
            .map_err(TokenError::Encode)
    }

    /// Validates a token and returns its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, TokenError> {
        let validation = Validation::new(Algorithm::HS256);
        jsonwebtoken::decode::<Claims>(token, &self.keys.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => {
                    tracing::debug!(error = %e, "token validation failed");
                    TokenError::Invalid
                }
            })
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// Admins pass; anyone else must be `owner`.
    pub fn require_self_or_admin(&self, owner: Option<UserId>) -> Result<(), ApiError> {
        if self.is_admin() || owner == Some(self.user_id) {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden())
        }
    }
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, TokenError> {
    let Some(header) = parts.headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header.to_str().map_err(|_| TokenError::Invalid)?;
    value
        .strip_prefix("Bearer ")
        .map(|token| Some(token.trim()))
        .ok_or(TokenError::Invalid)
}

fn authenticate(parts: &Parts, tokens: &TokenService) -> Result<Option<AuthUser>, TokenError> {
    match bearer_token(parts)? {
        Some(token) => {
            let claims = tokens.validate(token)?;
            Ok(Some(AuthUser {
                user_id: claims.sub,
                role: claims.role,
            }))
        }
        None => Ok(None),
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    TokenService: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let tokens = TokenService::from_ref(state);
        match authenticate(parts, &tokens)? {
            Some(user) => Ok(user),
            None => Err(TokenError::Missing.into()),
        }
    }
}
