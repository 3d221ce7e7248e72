use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, IntoActiveModel, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::edit_session::{RecordRow, RecordWriter};
use crate::entities::record;
use crate::errors::ServiceError;

/// Parameters for a paged record listing.
#[derive(Debug, Clone)]
pub struct RecordQuery {
    pub topic_id: Uuid,
    pub search: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// 1-based page number.
    pub page: u64,
    pub page_size: u64,
}

/// One page of records plus the total match count for pagination math.
#[derive(Debug)]
pub struct RecordPage {
    pub rows: Vec<record::Model>,
    pub total: u64,
}

/// Fields for a new record; everything but topic and product name defaults.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub topic_id: Uuid,
    pub date: Option<NaiveDate>,
    pub product_name: String,
    pub color: Option<String>,
    pub amount: Option<Decimal>,
    pub unit: Option<Decimal>,
}

/// Partial update; only supplied fields are applied.
#[derive(Debug, Clone, Default)]
pub struct RecordChanges {
    pub date: Option<NaiveDate>,
    pub product_name: Option<String>,
    pub color: Option<String>,
    pub amount: Option<Decimal>,
    pub unit: Option<Decimal>,
}

/// Service for managing inventory records.
#[derive(Clone)]
pub struct RecordService {
    db: Arc<DbPool>,
}

impl RecordService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Lists records for a topic, newest date first, with search and
    /// inclusive date-range filters applied.
    #[instrument(skip(self))]
    pub async fn list(&self, query: RecordQuery) -> Result<RecordPage, ServiceError> {
        let mut find = record::Entity::find()
            .filter(record::Column::TopicId.eq(query.topic_id));

        if let Some(search) = query.search.as_deref() {
            let trimmed = search.trim();
            if !trimmed.is_empty() {
                find = find.filter(search_condition(trimmed));
            }
        }
        if let Some(start) = query.start_date {
            find = find.filter(record::Column::Date.gte(start));
        }
        if let Some(end) = query.end_date {
            find = find.filter(record::Column::Date.lte(end));
        }

        let paginator = find
            .order_by_desc(record::Column::Date)
            .order_by_desc(record::Column::CreatedAt)
            .paginate(self.db.as_ref(), query.page_size.max(1));

        let total = paginator.num_items().await?;
        let rows = paginator.fetch_page(query.page.max(1) - 1).await?;

        Ok(RecordPage { rows, total })
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: NewRecord) -> Result<record::Model, ServiceError> {
        let now = Utc::now();
        let model = record::ActiveModel {
            id: Set(Uuid::new_v4()),
            topic_id: Set(input.topic_id),
            date: Set(input.date.unwrap_or_else(|| now.date_naive())),
            product_name: Set(input.product_name),
            color: Set(input.color.unwrap_or_default()),
            amount: Set(input.amount.unwrap_or_default()),
            unit: Set(input.unit.unwrap_or_default()),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(self.db.as_ref()).await?;
        info!("Record created: {}", created.id);
        Ok(created)
    }

    #[instrument(skip(self))]
    pub async fn update(&self, id: Uuid, changes: RecordChanges) -> Result<(), ServiceError> {
        let existing = record::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Record".to_string()))?;

        let mut model = existing.into_active_model();
        if let Some(date) = changes.date {
            model.date = Set(date);
        }
        if let Some(product_name) = changes.product_name {
            model.product_name = Set(product_name);
        }
        if let Some(color) = changes.color {
            model.color = Set(color);
        }
        if let Some(amount) = changes.amount {
            model.amount = Set(amount);
        }
        if let Some(unit) = changes.unit {
            model.unit = Set(unit);
        }
        model.updated_at = Set(Utc::now());

        model.update(self.db.as_ref()).await?;
        info!("Record updated: {}", id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = record::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound("Record".to_string()));
        }
        info!("Record deleted: {}", id);
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn delete_by_topic(&self, topic_id: Uuid) -> Result<u64, ServiceError> {
        let result = record::Entity::delete_many()
            .filter(record::Column::TopicId.eq(topic_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}

/// The edit-session save fan-out writes through the record service.
#[async_trait]
impl RecordWriter for RecordService {
    async fn update_record(&self, row: &RecordRow) -> Result<(), ServiceError> {
        self.update(
            row.id,
            RecordChanges {
                date: Some(row.date),
                product_name: Some(row.product_name.clone()),
                color: Some(row.color.clone()),
                amount: Some(row.amount),
                unit: Some(row.unit),
            },
        )
        .await
    }

    async fn delete_record(&self, id: Uuid) -> Result<(), ServiceError> {
        self.delete(id).await
    }
}

/// SQL condition for the whole-word-ish product-name search: the name
/// starts with the query, or contains " <query>" later in the string.
/// Case-insensitive; LIKE metacharacters in the query are escaped.
pub fn search_condition(query: &str) -> Condition {
    let escaped = escape_like(&query.to_lowercase());
    let lowered_name =
        || Expr::expr(Func::lower(Expr::col((record::Entity, record::Column::ProductName))));

    Condition::any()
        .add(lowered_name().like(LikeExpr::new(format!("{escaped}%")).escape('\\')))
        .add(lowered_name().like(LikeExpr::new(format!("% {escaped}%")).escape('\\')))
}

/// Reference predicate mirroring `search_condition` for in-memory rows.
pub fn matches_search(product_name: &str, query: &str) -> bool {
    let name = product_name.to_lowercase();
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return true;
    }
    name.starts_with(&query) || name.contains(&format!(" {query}"))
}

fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}
