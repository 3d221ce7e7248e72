use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, Set, SqlErr,
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::auth::{hash_opaque_token, AuthService};
use crate::db::DbPool;
use crate::entities::{password_reset_token, user};
use crate::errors::ServiceError;

const RESET_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);
const RESET_TOKEN_LEN: usize = 48;

/// Service for account management and the password-reset flow.
#[derive(Clone)]
pub struct UserService {
    db: Arc<DbPool>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db: Arc<DbPool>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    #[instrument(skip(self, password))]
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<user::Model, ServiceError> {
        let existing = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let now = Utc::now();
        let model = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            email: Set(email.to_string()),
            password_hash: Set(self.auth.hash_password(password)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let created = model.insert(self.db.as_ref()).await.map_err(|err| {
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                ServiceError::Conflict("An account with this email already exists".to_string())
            } else {
                ServiceError::DatabaseError(err)
            }
        })?;

        info!("User registered: {}", created.id);
        Ok(created)
    }

    /// Returns the user when the credentials check out.
    #[instrument(skip(self, password))]
    pub async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<user::Model>, ServiceError> {
        let Some(found) = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        if self.auth.verify_password(password, &found.password_hash) {
            Ok(Some(found))
        } else {
            Ok(None)
        }
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<user::Model>, ServiceError> {
        let found = user::Entity::find_by_id(id).one(self.db.as_ref()).await?;
        Ok(found)
    }

    /// Mints a single-use reset token for the account, if one exists.
    /// Returns the plaintext token; only its hash is stored. Every attempt
    /// is logged, whether or not the account exists.
    #[instrument(skip(self))]
    pub async fn create_reset_token(&self, email: &str) -> Result<Option<String>, ServiceError> {
        let Some(account) = user::Entity::find()
            .filter(user::Column::Email.eq(email))
            .one(self.db.as_ref())
            .await?
        else {
            warn!("Password reset requested for unknown email");
            return Ok(None);
        };

        let token: String = thread_rng()
            .sample_iter(&Alphanumeric)
            .take(RESET_TOKEN_LEN)
            .map(char::from)
            .collect();

        let now = Utc::now();
        let model = password_reset_token::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(account.id),
            token_hash: Set(hash_opaque_token(&token)),
            expires_at: Set(now + chrono::Duration::from_std(RESET_TOKEN_TTL).unwrap_or_default()),
            created_at: Set(now),
            used_at: Set(None),
        };
        model.insert(self.db.as_ref()).await?;

        info!("Password reset requested for user {}", account.id);
        debug!("Password reset token issued for user {}", account.id);
        Ok(Some(token))
    }

    /// Verifies an unused, unexpired reset token and overwrites the
    /// password hash, consuming the token.
    #[instrument(skip(self, token, new_password))]
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let now = Utc::now();
        let reset = password_reset_token::Entity::find()
            .filter(password_reset_token::Column::TokenHash.eq(hash_opaque_token(token)))
            .one(self.db.as_ref())
            .await?
            .filter(|entry| entry.used_at.is_none() && entry.expires_at > now)
            .ok_or_else(|| {
                ServiceError::Unauthorized("Invalid or expired reset token".to_string())
            })?;

        let account = user::Entity::find_by_id(reset.user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;
        let user_id = account.id;

        let mut account = account.into_active_model();
        account.password_hash = Set(self.auth.hash_password(new_password));
        account.updated_at = Set(now);
        account.update(self.db.as_ref()).await?;

        let mut consumed = reset.into_active_model();
        consumed.used_at = Set(Some(now));
        consumed.update(self.db.as_ref()).await?;

        info!("Password reset completed for user {}", user_id);
        Ok(())
    }
}
