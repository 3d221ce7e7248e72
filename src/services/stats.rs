use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{ColumnTrait, EntityTrait, FromQueryResult, QueryOrder, QuerySelect};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{record, topic};
use crate::errors::ServiceError;

/// Per-topic record count for the dashboard chart.
#[derive(Debug, Serialize)]
pub struct TopicCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsOverview {
    pub topic_stats: Vec<TopicCount>,
    pub total_records: u64,
}

#[derive(FromQueryResult)]
struct CountRow {
    topic_id: Uuid,
    count: i64,
}

/// Read-side aggregation for the analytics dashboard.
#[derive(Clone)]
pub struct StatsService {
    db: Arc<DbPool>,
}

impl StatsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Record counts per topic, zero-count topics included, plus the
    /// grand total.
    #[instrument(skip(self))]
    pub async fn overview(&self) -> Result<StatsOverview, ServiceError> {
        let topics = topic::Entity::find()
            .order_by_asc(topic::Column::Name)
            .all(self.db.as_ref())
            .await?;

        let counts: HashMap<Uuid, u64> = record::Entity::find()
            .select_only()
            .column(record::Column::TopicId)
            .column_as(record::Column::Id.count(), "count")
            .group_by(record::Column::TopicId)
            .into_model::<CountRow>()
            .all(self.db.as_ref())
            .await?
            .into_iter()
            .map(|row| (row.topic_id, row.count.max(0) as u64))
            .collect();

        let mut total_records = 0;
        let topic_stats = topics
            .into_iter()
            .map(|t| {
                let count = counts.get(&t.id).copied().unwrap_or(0);
                total_records += count;
                TopicCount {
                    name: t.name,
                    count,
                }
            })
            .collect();

        Ok(StatsOverview {
            topic_stats,
            total_records,
        })
    }
}
