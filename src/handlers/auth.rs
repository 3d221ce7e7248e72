//! Account endpoints: register, login/logout, current user, and the
//! password-reset flow.

use axum::{extract::State, response::Response, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use serde_json::json;
use validator::Validate;

use crate::auth::{AuthUser, SESSION_COOKIE};
use crate::entities::user;
use crate::errors::ApiError;
use crate::AppState;

use super::common::{created_response, map_service_error, success_response, validate_input};

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 2, max = 100, message = "Name must be 2-100 characters"))]
    pub name: String,
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(rename = "access_token")]
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub access_token: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub new_password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
}

impl From<user::Model> for UserResponse {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id.to_string(),
            name: model.name,
            email: model.email,
        }
    }
}

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let created = state
        .services
        .users
        .register(&payload.name, &payload.email, &payload.password)
        .await
        .map_err(map_service_error)?;
    Ok(created_response(
        json!({ "user": UserResponse::from(created) }),
    ))
}

/// Verifies credentials and sets the session cookie. The cookie is
/// persisted with a max-age only when the client asked to be remembered;
/// otherwise it stays a browser-session cookie.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<LoginRequest>,
) -> Result<(CookieJar, Response), ApiError> {
    validate_input(&payload)?;

    let account = state
        .services
        .users
        .verify_credentials(&payload.email, &payload.password)
        .await
        .map_err(map_service_error)?
        .ok_or_else(|| {
            ApiError::ServiceError(crate::errors::ServiceError::Unauthorized(
                "Invalid email or password".to_string(),
            ))
        })?;

    let session = state
        .auth
        .issue_session(&account, payload.remember_me)
        .map_err(map_service_error)?;

    let mut cookie = Cookie::build((SESSION_COOKIE, session.token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .build();
    if payload.remember_me {
        cookie.set_max_age(time::Duration::seconds(session.expires_in));
    }

    Ok((
        jar.add(cookie),
        success_response(json!({ "user": UserResponse::from(account) })),
    ))
}

pub async fn logout(jar: CookieJar) -> (CookieJar, Response) {
    let removal = Cookie::build((SESSION_COOKIE, "")).path("/").build();
    (
        jar.remove(removal),
        success_response(json!({ "success": true })),
    )
}

/// Current user's profile, re-fetched so a stale token for a deleted
/// account does not fabricate a profile.
pub async fn me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Response, ApiError> {
    let account = state
        .services
        .users
        .find_by_id(auth.user_id)
        .await
        .map_err(map_service_error)?
        .ok_or(ApiError::Unauthorized)?;
    Ok(success_response(
        json!({ "user": UserResponse::from(account) }),
    ))
}

/// Always answers with the same generic message so the endpoint cannot
/// be used to probe which emails have accounts.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    state
        .services
        .users
        .create_reset_token(&payload.email)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({
        "message": "If an account exists for that email, a reset link has been sent"
    })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    state
        .services
        .users
        .reset_password(&payload.access_token, &payload.new_password)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({ "success": true })))
}
