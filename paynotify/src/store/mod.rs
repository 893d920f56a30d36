//! Notification store: persistence for notification records and customer webhook configuration.
//!
//! [`NotificationStore`] is the seam between the notification services and the database. The
//! production implementation, [`PgNotificationStore`], runs every write as its own transaction
//! (begin, one statement, commit) and delegates the statement to the repositories in
//! [`crate::db::handlers`]. Tests that do not need PostgreSQL use [`InMemoryStore`].

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use crate::db::errors::{DbError, Result};
use crate::db::handlers::{Customers, Notifications};
use crate::db::models::customers::{CustomerWebhook, WebhookConfigureDBRequest};
use crate::db::models::notifications::{NotificationCreateDBRequest, NotificationRecord};
use crate::types::{CustomerId, IdempotencyKey, PaymentDetails};

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{InMemoryStore, StoreOp};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Overwrite the customer's webhook URL and token. Unknown customer is [`DbError::NotFound`].
    async fn configure_webhook(&self, customer_id: CustomerId, token: &str, url: &str) -> Result<()>;

    /// Record a new notification with `delivered = false`.
    ///
    /// A key that already exists is rejected with [`DbError::UniqueViolation`].
    async fn create_notification(
        &self,
        idempotency_key: IdempotencyKey,
        customer_id: CustomerId,
        details: &PaymentDetails,
    ) -> Result<NotificationRecord>;

    async fn lookup_webhook(&self, customer_id: CustomerId) -> Result<CustomerWebhook>;

    /// Unknown key is [`DbError::NotFound`].
    async fn lookup_notification(&self, idempotency_key: IdempotencyKey) -> Result<NotificationRecord>;

    /// One-way flip of the delivered flag. Calling it again is a no-op.
    async fn mark_delivered(&self, idempotency_key: IdempotencyKey) -> Result<()>;
}

/// PostgreSQL-backed [`NotificationStore`].
#[derive(Clone)]
pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Commit on success. On failure roll back explicitly; see [`rollback_outcome`] for which error
/// is reported.
async fn finish<T>(tx: Transaction<'_, Postgres>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            debug!(error = %e, "Rolling back transaction");
            let rollback = tx.rollback().await.map_err(DbError::from);
            rollback_outcome(e, rollback)
        }
    }
}

/// The statement's error, unless the rollback itself failed, in which case the rollback error
/// is returned instead.
fn rollback_outcome<T>(original: DbError, rollback: Result<()>) -> Result<T> {
    match rollback {
        Ok(()) => Err(original),
        Err(rollback_err) => {
            warn!(error = %rollback_err, original_error = %original, "Transaction rollback failed");
            Err(rollback_err)
        }
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn configure_webhook(&self, customer_id: CustomerId, token: &str, url: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let request = WebhookConfigureDBRequest {
            customer_id,
            url: url.to_string(),
            token: token.to_string(),
        };
        let result = Customers::new(&mut tx).configure_webhook(&request).await;
        finish(tx, result).await
    }

    async fn create_notification(
        &self,
        idempotency_key: IdempotencyKey,
        customer_id: CustomerId,
        details: &PaymentDetails,
    ) -> Result<NotificationRecord> {
        let mut tx = self.pool.begin().await?;
        let request = NotificationCreateDBRequest {
            idempotency_key,
            customer_id,
            details: details.clone(),
        };
        let result = Notifications::new(&mut tx).create(&request).await;
        finish(tx, result).await
    }

    async fn lookup_webhook(&self, customer_id: CustomerId) -> Result<CustomerWebhook> {
        let mut conn = self.pool.acquire().await?;
        Customers::new(&mut conn).get_webhook(customer_id).await
    }

    async fn lookup_notification(&self, idempotency_key: IdempotencyKey) -> Result<NotificationRecord> {
        let mut conn = self.pool.acquire().await?;
        Notifications::new(&mut conn)
            .get_by_key(idempotency_key)
            .await?
            .ok_or(DbError::NotFound)
    }

    async fn mark_delivered(&self, idempotency_key: IdempotencyKey) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = Notifications::new(&mut tx).mark_delivered(idempotency_key).await;
        finish(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::new_idempotency_key;
    use rust_decimal::Decimal;

    async fn seed_customer(pool: &PgPool) -> CustomerId {
        let mut conn = pool.acquire().await.unwrap();
        Customers::new(&mut conn).create("customer 1").await.unwrap().id
    }

    fn details() -> PaymentDetails {
        PaymentDetails {
            reference_id: "ref1".to_string(),
            channel_code: "card".to_string(),
            amount: Decimal::new(1000, 1),
            currency: "SGD".to_string(),
            market: "SG".to_string(),
        }
    }

    #[test]
    fn test_rollback_outcome_reports_statement_error() {
        let result: Result<()> = rollback_outcome(DbError::NotFound, Ok(()));
        assert!(matches!(result, Err(DbError::NotFound)));
    }

    #[test]
    fn test_rollback_failure_wins_over_statement_error() {
        let rollback = Err(DbError::Other(anyhow::anyhow!("connection reset during rollback")));
        let result: Result<()> = rollback_outcome(DbError::NotFound, rollback);

        match result {
            Err(DbError::Other(e)) => assert!(e.to_string().contains("rollback")),
            other => panic!("expected the rollback error, got {other:?}"),
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_then_lookup_returns_stored_details(pool: PgPool) {
        let customer_id = seed_customer(&pool).await;
        let store = PgNotificationStore::new(pool);

        let key = new_idempotency_key();
        store.create_notification(key, customer_id, &details()).await.unwrap();

        let record = store.lookup_notification(key).await.unwrap();
        assert_eq!(record.details(), &details());
        assert!(!record.delivered);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_failed_configure_rolls_back(pool: PgPool) {
        let customer_id = seed_customer(&pool).await;
        let store = PgNotificationStore::new(pool);

        store
            .configure_webhook(customer_id, "abc", "https://example.com/hook")
            .await
            .unwrap();

        // Empty URL trips the check constraint inside the transaction
        let result = store.configure_webhook(customer_id, "other-token", "").await;
        assert!(matches!(result, Err(DbError::CheckViolation { .. })));

        let webhook = store.lookup_webhook(customer_id).await.unwrap();
        assert_eq!(webhook.endpoint(), Some(("https://example.com/hook", "abc")));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_key_collision_leaves_original_untouched(pool: PgPool) {
        let customer_id = seed_customer(&pool).await;
        let store = PgNotificationStore::new(pool);

        let key = new_idempotency_key();
        store.create_notification(key, customer_id, &details()).await.unwrap();
        store.mark_delivered(key).await.unwrap();

        let mut other = details();
        other.reference_id = "ref2".to_string();
        let result = store.create_notification(key, customer_id, &other).await;
        assert!(matches!(result, Err(DbError::UniqueViolation { .. })));

        let record = store.lookup_notification(key).await.unwrap();
        assert_eq!(record.details().reference_id, "ref1");
        assert!(record.delivered);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_mark_delivered_is_idempotent(pool: PgPool) {
        let customer_id = seed_customer(&pool).await;
        let store = PgNotificationStore::new(pool);

        let key = new_idempotency_key();
        store.create_notification(key, customer_id, &details()).await.unwrap();
        store.mark_delivered(key).await.unwrap();
        let first = store.lookup_notification(key).await.unwrap();
        assert!(first.delivered);

        // Let the clock move so a rewrite of updated_at would show
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        store.mark_delivered(key).await.unwrap();

        let second = store.lookup_notification(key).await.unwrap();
        assert!(second.delivered);
        assert_eq!(second.updated_at, first.updated_at);
        assert_eq!(second.details(), first.details());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_lookups_for_unknown_ids(pool: PgPool) {
        let store = PgNotificationStore::new(pool);

        assert!(matches!(store.lookup_webhook(7).await, Err(DbError::NotFound)));
        assert!(matches!(
            store.lookup_notification(new_idempotency_key()).await,
            Err(DbError::NotFound)
        ));
        assert!(matches!(
            store.configure_webhook(7, "abc", "https://example.com/hook").await,
            Err(DbError::NotFound)
        ));
    }
}
