//! Database models for notification records.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use sqlx::types::Json;

use crate::types::{CustomerId, IdempotencyKey, PaymentDetails};

/// Database model for one notification of one payment event to one customer.
#[derive(Debug, Clone, FromRow)]
pub struct NotificationRecord {
    pub id: i64,
    pub customer_id: CustomerId,
    pub idempotency_key: IdempotencyKey,
    pub details: Json<PaymentDetails>,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn details(&self) -> &PaymentDetails {
        &self.details.0
    }
}

/// Request to record a new, not-yet-delivered notification.
#[derive(Debug, Clone)]
pub struct NotificationCreateDBRequest {
    pub idempotency_key: IdempotencyKey,
    pub customer_id: CustomerId,
    pub details: PaymentDetails,
}
