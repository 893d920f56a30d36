//! Database repository for notification records.

use sqlx::PgConnection;
use sqlx::types::Json;
use tracing::instrument;

use crate::db::errors::{DbError, Result};
use crate::db::models::notifications::{NotificationCreateDBRequest, NotificationRecord};
use crate::types::{IdempotencyKey, abbrev_uuid};

/// Repository for notification operations.
pub struct Notifications<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Notifications<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Insert a not-yet-delivered notification.
    ///
    /// A reused idempotency key fails with [`DbError::UniqueViolation`] and leaves the existing
    /// row untouched.
    #[instrument(skip(self, request), fields(idempotency_key = %abbrev_uuid(&request.idempotency_key), customer_id = request.customer_id), err)]
    pub async fn create(&mut self, request: &NotificationCreateDBRequest) -> Result<NotificationRecord> {
        let record = sqlx::query_as::<_, NotificationRecord>(
            r#"
            INSERT INTO notifications (customer_id, idempotency_key, details)
            VALUES ($1, $2, $3)
            RETURNING *
            "#,
        )
        .bind(request.customer_id)
        .bind(request.idempotency_key)
        .bind(Json(&request.details))
        .fetch_one(&mut *self.db)
        .await?;

        Ok(record)
    }

    /// Get a notification by idempotency key.
    #[instrument(skip(self), fields(idempotency_key = %abbrev_uuid(&key)), err)]
    pub async fn get_by_key(&mut self, key: IdempotencyKey) -> Result<Option<NotificationRecord>> {
        let record = sqlx::query_as::<_, NotificationRecord>("SELECT * FROM notifications WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(record)
    }

    /// Flip the delivered flag. Never reverts; a repeated call changes nothing, including
    /// `updated_at`.
    #[instrument(skip(self), fields(idempotency_key = %abbrev_uuid(&key)), err)]
    pub async fn mark_delivered(&mut self, key: IdempotencyKey) -> Result<()> {
        let result = sqlx::query("UPDATE notifications SET delivered = true WHERE idempotency_key = $1 AND NOT delivered")
            .bind(key)
            .execute(&mut *self.db)
            .await?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        // Nothing flipped: either already delivered or no such key
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM notifications WHERE idempotency_key = $1)")
            .bind(key)
            .fetch_one(&mut *self.db)
            .await?;

        if !exists {
            return Err(DbError::NotFound);
        }

        Ok(())
    }
}
