//! Session authentication: HS256 tokens carried in an HttpOnly cookie,
//! salted password hashing, and the `AuthUser` request extractor.

use std::sync::Arc;
use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::header, http::request::Parts};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::entities::user;
use crate::errors::{ApiError, ServiceError};

/// Name of the session cookie issued at login.
pub const SESSION_COOKIE: &str = "stockbook_session";

/// Claim structure for session tokens.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub name: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated user data extracted from the session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
}

/// Authentication configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub session_ttl: Duration,
    pub remember_me_ttl: Duration,
}

/// Issued session token plus its lifetime in seconds.
#[derive(Debug)]
pub struct SessionToken {
    pub token: String,
    pub expires_in: i64,
}

/// Handles session issuance/validation and password hashing.
#[derive(Debug, Clone)]
pub struct AuthService {
    config: AuthConfig,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        Self { config }
    }

    /// Generate a session token for a user. `remember` extends the
    /// lifetime from the session default to the remember-me window.
    pub fn issue_session(
        &self,
        user: &user::Model,
        remember: bool,
    ) -> Result<SessionToken, ServiceError> {
        let ttl = if remember {
            self.config.remember_me_ttl
        } else {
            self.config.session_ttl
        };
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.name.clone(),
            email: user.email.clone(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| ServiceError::InternalError(format!("token creation failed: {e}")))?;

        Ok(SessionToken {
            token,
            expires_in: ttl.as_secs() as i64,
        })
    }

    /// Validate a session token and extract its claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )
        .map(|data| data.claims)
        .map_err(|_| ServiceError::Unauthorized("Invalid or expired session".to_string()))
    }

    /// Salted SHA-256 digest, stored as `salt$digest` in hex.
    pub fn hash_password(&self, password: &str) -> String {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let digest = Self::digest(&salt, password);
        format!("{}${}", hex::encode(salt), digest)
    }

    pub fn verify_password(&self, password: &str, stored: &str) -> bool {
        let Some((salt_hex, digest)) = stored.split_once('$') else {
            return false;
        };
        let Ok(salt) = hex::decode(salt_hex) else {
            return false;
        };
        Self::digest(&salt, password) == digest
    }

    fn digest(salt: &[u8], password: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt);
        hasher.update(password.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Hash an opaque one-time token (password reset) for storage.
pub fn hash_opaque_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        // AuthService is injected into request extensions by a middleware
        // layer installed in main.rs / the test harness.
        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or(ApiError::InternalServerError)?;

        // Session cookie first.
        let jar = CookieJar::from_headers(&parts.headers);
        let mut token = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());

        // Fall back to a bearer header for non-browser clients.
        if token.is_none() {
            if let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) {
                if let Ok(value) = auth_header.to_str() {
                    if let Some(bearer) = value.strip_prefix("Bearer ") {
                        token = Some(bearer.trim().to_string());
                    }
                }
            }
        }

        let token = token.ok_or(ApiError::Unauthorized)?;
        let claims = auth_service
            .validate_token(&token)
            .map_err(|_| ApiError::Unauthorized)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| ApiError::Unauthorized)?;

        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service() -> AuthService {
        AuthService::new(AuthConfig {
            jwt_secret: "test-secret".to_string(),
            session_ttl: Duration::from_secs(3600),
            remember_me_ttl: Duration::from_secs(86_400),
        })
    }

    fn sample_user() -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn issued_session_round_trips() {
        let svc = service();
        let user = sample_user();
        let session = svc.issue_session(&user, false).unwrap();
        let claims = svc.validate_token(&session.token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.email, user.email);
        assert_eq!(session.expires_in, 3600);
    }

    #[test]
    fn remember_me_extends_lifetime() {
        let svc = service();
        let session = svc.issue_session(&sample_user(), true).unwrap();
        assert_eq!(session.expires_in, 86_400);
    }

    #[test]
    fn password_hash_verifies_and_salts() {
        let svc = service();
        let a = svc.hash_password("hunter22");
        let b = svc.hash_password("hunter22");
        assert_ne!(a, b);
        assert!(svc.verify_password("hunter22", &a));
        assert!(svc.verify_password("hunter22", &b));
        assert!(!svc.verify_password("hunter23", &a));
        assert!(!svc.verify_password("hunter22", "garbage"));
    }

    #[test]
    fn tampered_token_rejected() {
        let svc = service();
        let session = svc.issue_session(&sample_user(), false).unwrap();
        let mut tampered = session.token.clone();
        tampered.push('x');
        assert!(svc.validate_token(&tampered).is_err());
    }
}
