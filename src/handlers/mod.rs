pub mod auth;
pub mod common;
pub mod records;
pub mod stats;
pub mod topics;

use std::sync::Arc;

use crate::auth::AuthService;
use crate::db::DbPool;
use crate::services::{RecordService, StatsService, TopicService, UserService};

/// Shared service instances, one per domain.
#[derive(Clone)]
pub struct AppServices {
    pub topics: TopicService,
    pub records: RecordService,
    pub users: UserService,
    pub stats: StatsService,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, auth: Arc<AuthService>) -> Self {
        Self {
            topics: TopicService::new(db.clone()),
            records: RecordService::new(db.clone()),
            users: UserService::new(db.clone(), auth),
            stats: StatsService::new(db),
        }
    }
}
