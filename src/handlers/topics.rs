//! Topic endpoints. Listing is public; mutations require a session.

use axum::{
    extract::{Path, State},
    response::Response,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::AuthUser;
use crate::entities::topic;
use crate::errors::ApiError;
use crate::AppState;

use super::common::{created_response, map_service_error, success_response, validate_input};

const MAX_TOPIC_NAME: usize = 30;

/// Leading/trailing whitespace does not count toward the name, so the
/// check runs on the trimmed value the handlers go on to store.
fn validate_topic_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::new("empty"));
    }
    if trimmed.chars().count() > MAX_TOPIC_NAME {
        return Err(ValidationError::new("too_long"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, Validate)]
pub struct TopicRequest {
    #[validate(custom = "validate_topic_name")]
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct TopicResponse {
    pub id: String,
    pub name: String,
}

impl From<topic::Model> for TopicResponse {
    fn from(model: topic::Model) -> Self {
        Self {
            id: model.id.to_string(),
            name: model.name,
        }
    }
}

pub async fn list_topics(State(state): State<AppState>) -> Result<Response, ApiError> {
    let topics = state
        .services
        .topics
        .list()
        .await
        .map_err(map_service_error)?;
    let data: Vec<TopicResponse> = topics.into_iter().map(Into::into).collect();
    Ok(success_response(json!({ "data": data })))
}

pub async fn create_topic(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<TopicRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let created = state
        .services
        .topics
        .create(payload.name.trim())
        .await
        .map_err(map_service_error)?;
    Ok(created_response(
        json!({ "data": TopicResponse::from(created) }),
    ))
}

pub async fn rename_topic(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<TopicRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let updated = state
        .services
        .topics
        .rename(id, payload.name.trim())
        .await
        .map_err(map_service_error)?;
    Ok(success_response(
        json!({ "data": TopicResponse::from(updated) }),
    ))
}

/// Deletes the topic and every record under it in one transaction.
pub async fn delete_topic(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state
        .services
        .topics
        .delete(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({ "success": true })))
}
