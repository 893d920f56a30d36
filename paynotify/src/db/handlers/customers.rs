//! Database repository for customers and their webhook configuration.

use sqlx::PgConnection;
use tracing::instrument;

use crate::db::errors::{DbError, Result};
use crate::db::models::customers::{Customer, CustomerWebhook, WebhookConfigureDBRequest};
use crate::types::CustomerId;

/// Repository for customer operations.
pub struct Customers<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Customers<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    /// Create a customer without webhook configuration.
    #[instrument(skip(self), err)]
    pub async fn create(&mut self, name: &str) -> Result<Customer> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (name)
            VALUES ($1)
            RETURNING *
            "#,
        )
        .bind(name)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(customer)
    }

    /// Get a customer by ID.
    #[instrument(skip(self), err)]
    pub async fn get_by_id(&mut self, id: CustomerId) -> Result<Option<Customer>> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(customer)
    }

    /// Count all customers.
    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&mut *self.db)
            .await?;

        Ok(count)
    }

    /// Overwrite a customer's webhook URL and token. Last write wins.
    #[instrument(skip(self, request), fields(customer_id = request.customer_id), err)]
    pub async fn configure_webhook(&mut self, request: &WebhookConfigureDBRequest) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE customers
            SET token = $1, notification_url = $2
            WHERE id = $3
            "#,
        )
        .bind(&request.token)
        .bind(&request.url)
        .bind(request.customer_id)
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        Ok(())
    }

    /// Read the webhook URL and token for a customer.
    ///
    /// An unconfigured customer yields a [`CustomerWebhook`] with no endpoint; only an unknown
    /// customer is an error.
    #[instrument(skip(self), err)]
    pub async fn get_webhook(&mut self, id: CustomerId) -> Result<CustomerWebhook> {
        let webhook = sqlx::query_as::<_, CustomerWebhook>("SELECT notification_url, token FROM customers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        webhook.ok_or(DbError::NotFound)
    }
}
