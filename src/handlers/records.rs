//! Record endpoints: the paged topic listing plus create, partial
//! update, and delete.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    response::Response,
    Json,
};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::AuthUser;
use crate::entities::record;
use crate::errors::ApiError;
use crate::services::{NewRecord, RecordChanges, RecordQuery};
use crate::AppState;

use super::common::{
    created_response, map_service_error, parse_page, parse_page_size, success_response,
    validate_input,
};

const MAX_NUMERIC: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 0);

fn validate_quantity(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("negative"));
    }
    if *value > MAX_NUMERIC {
        return Err(ValidationError::new("too_large"));
    }
    Ok(())
}

/// Listing query parameters. Pagination fields arrive as raw strings so
/// malformed values degrade to defaults instead of a 400.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecordsParams {
    pub topic: Uuid,
    pub search: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page: Option<String>,
    pub page_size: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateRecordRequest {
    pub topic: Uuid,
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 30, message = "Product name must be 1-30 characters"))]
    pub product_name: String,
    #[validate(length(max = 30, message = "Color must be at most 30 characters"))]
    pub color: Option<String>,
    #[validate(custom = "validate_quantity")]
    pub amount: Option<Decimal>,
    #[validate(custom = "validate_quantity")]
    pub unit: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRecordRequest {
    pub date: Option<NaiveDate>,
    #[validate(length(min = 1, max = 30, message = "Product name must be 1-30 characters"))]
    pub product_name: Option<String>,
    #[validate(length(max = 30, message = "Color must be at most 30 characters"))]
    pub color: Option<String>,
    #[validate(custom = "validate_quantity")]
    pub amount: Option<Decimal>,
    #[validate(custom = "validate_quantity")]
    pub unit: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub id: String,
    pub topic: String,
    pub date: NaiveDate,
    pub product_name: String,
    pub color: String,
    pub amount: Decimal,
    pub unit: Decimal,
}

impl From<record::Model> for RecordResponse {
    fn from(model: record::Model) -> Self {
        Self {
            id: model.id.to_string(),
            topic: model.topic_id.to_string(),
            date: model.date,
            product_name: model.product_name,
            color: model.color,
            amount: model.amount,
            unit: model.unit,
        }
    }
}

pub async fn list_records(
    State(state): State<AppState>,
    params: Result<Query<ListRecordsParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    // A missing or malformed `topic` must still produce the JSON error
    // body, not the extractor's plain-text rejection.
    let Query(params) = params.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let page = parse_page(params.page.as_deref());
    let page_size = parse_page_size(params.page_size.as_deref());

    let result = state
        .services
        .records
        .list(RecordQuery {
            topic_id: params.topic,
            search: params.search,
            start_date: params.start_date,
            end_date: params.end_date,
            page,
            page_size,
        })
        .await
        .map_err(map_service_error)?;

    let rows: Vec<RecordResponse> = result.rows.into_iter().map(Into::into).collect();
    Ok(success_response(json!({
        "data": rows,
        "page": page,
        "pageSize": page_size,
        "total": result.total,
    })))
}

pub async fn create_record(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(payload): Json<CreateRecordRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    let created = state
        .services
        .records
        .create(NewRecord {
            topic_id: payload.topic,
            date: payload.date,
            product_name: payload.product_name,
            color: payload.color,
            amount: payload.amount,
            unit: payload.unit,
        })
        .await
        .map_err(map_service_error)?;
    Ok(created_response(
        json!({ "data": RecordResponse::from(created) }),
    ))
}

pub async fn update_record(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRecordRequest>,
) -> Result<Response, ApiError> {
    validate_input(&payload)?;
    state
        .services
        .records
        .update(
            id,
            RecordChanges {
                date: payload.date,
                product_name: payload.product_name,
                color: payload.color,
                amount: payload.amount,
                unit: payload.unit,
            },
        )
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({ "success": true })))
}

pub async fn delete_record(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    state
        .services
        .records
        .delete(id)
        .await
        .map_err(map_service_error)?;
    Ok(success_response(json!({ "success": true })))
}
