//! Analytics endpoint backing the dashboard chart.

use axum::{extract::State, response::Response};
use serde_json::json;

use crate::errors::ApiError;
use crate::AppState;

use super::common::{map_service_error, success_response};

pub async fn stats_overview(State(state): State<AppState>) -> Result<Response, ApiError> {
    let overview = state
        .services
        .stats
        .overview()
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({ "data": overview })))
}
