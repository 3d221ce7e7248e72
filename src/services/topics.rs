use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, SqlErr,
    TransactionTrait,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::{record, topic};
use crate::errors::ServiceError;

const DUPLICATE_NAME: &str = "A topic with this name already exists";

/// Service for managing topics (named groupings of records).
#[derive(Clone)]
pub struct TopicService {
    db: Arc<DbPool>,
}

impl TopicService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// All topics, sorted by name.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<topic::Model>, ServiceError> {
        let topics = topic::Entity::find()
            .order_by_asc(topic::Column::Name)
            .all(self.db.as_ref())
            .await?;
        Ok(topics)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<topic::Model>, ServiceError> {
        let found = topic::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(found)
    }

    /// Creates a topic. The pre-check yields a friendly conflict message;
    /// the unique index on `name` backstops the check-then-act race.
    #[instrument(skip(self))]
    pub async fn create(&self, name: &str) -> Result<topic::Model, ServiceError> {
        let existing = topic::Entity::find()
            .filter(topic::Column::Name.eq(name))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(DUPLICATE_NAME.to_string()));
        }

        let model = topic::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
        };
        let created = model
            .insert(self.db.as_ref())
            .await
            .map_err(map_unique_violation)?;

        info!("Topic created: {} ({})", created.name, created.id);
        Ok(created)
    }

    /// Renames a topic; duplicate check excludes the topic itself.
    #[instrument(skip(self))]
    pub async fn rename(&self, id: Uuid, name: &str) -> Result<topic::Model, ServiceError> {
        let existing = topic::Entity::find()
            .filter(topic::Column::Name.eq(name))
            .filter(topic::Column::Id.ne(id))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(DUPLICATE_NAME.to_string()));
        }

        let current = topic::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Topic".to_string()))?;

        let mut model: topic::ActiveModel = current.into();
        model.name = Set(name.to_string());
        let updated = model
            .update(self.db.as_ref())
            .await
            .map_err(map_unique_violation)?;

        info!("Topic renamed: {} ({})", updated.name, updated.id);
        Ok(updated)
    }

    /// Deletes a topic and every record under it. Both deletes run in one
    /// transaction so a failed cascade never leaves a half-emptied topic.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let cascaded = record::Entity::delete_many()
            .filter(record::Column::TopicId.eq(id))
            .exec(&txn)
            .await?;

        let result = topic::Entity::delete_by_id(id).exec(&txn).await?;
        if result.rows_affected == 0 {
            txn.rollback().await?;
            return Err(ServiceError::NotFound("Topic".to_string()));
        }

        txn.commit().await?;
        info!(
            "Topic deleted: {} ({} records cascaded)",
            id, cascaded.rows_affected
        );
        Ok(())
    }
}

fn map_unique_violation(err: sea_orm::DbErr) -> ServiceError {
    if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
        ServiceError::Conflict(DUPLICATE_NAME.to_string())
    } else {
        ServiceError::DatabaseError(err)
    }
}
