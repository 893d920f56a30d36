//! API request and response models for notification endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::models::notifications::NotificationRecord;
use crate::types::{CustomerId, IdempotencyKey, PaymentDetails};

/// Request to configure a customer's webhook, or to send it a test notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigureWebhookRequest {
    /// Send the canned test payload to `url` instead of saving the configuration
    #[serde(default)]
    pub is_test: bool,
    /// Accepted for compatibility; not checked
    #[serde(default)]
    pub secret_key: Option<String>,
    pub customer_id: CustomerId,
    pub url: String,
    /// Used when the request carries no `Authorization: Bearer` header
    #[serde(default)]
    pub token: Option<String>,
}

/// Request to redeliver a previously issued notification.
#[derive(Debug, Clone, Deserialize)]
pub struct ResendRequest {
    pub customer_id: CustomerId,
    /// Accepted for compatibility; not checked
    #[serde(default)]
    pub token: Option<String>,
    /// Accepted for compatibility; not checked
    #[serde(default)]
    pub secret_key: Option<String>,
    pub idempotency_key: IdempotencyKey,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyKeyResponse {
    pub idempotency_key: IdempotencyKey,
}

/// A recorded notification and its delivery status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub idempotency_key: IdempotencyKey,
    pub customer_id: CustomerId,
    pub details: PaymentDetails,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<NotificationRecord> for NotificationResponse {
    fn from(record: NotificationRecord) -> Self {
        Self {
            idempotency_key: record.idempotency_key,
            customer_id: record.customer_id,
            details: record.details.0,
            delivered: record.delivered,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
