//! Database models for customers and their webhook configuration.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::types::CustomerId;

/// Database model for a customer row.
#[derive(Debug, Clone, FromRow)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub notification_url: Option<String>,
    pub token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The webhook half of a customer row, as read for delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow)]
pub struct CustomerWebhook {
    pub notification_url: Option<String>,
    pub token: Option<String>,
}

impl CustomerWebhook {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            notification_url: Some(url.into()),
            token: Some(token.into()),
        }
    }

    /// URL and token to deliver to, or `None` when the customer has never been configured.
    ///
    /// Empty strings count as unconfigured.
    pub fn endpoint(&self) -> Option<(&str, &str)> {
        match (self.notification_url.as_deref(), self.token.as_deref()) {
            (Some(url), Some(token)) if !url.is_empty() && !token.is_empty() => Some((url, token)),
            _ => None,
        }
    }
}

/// Request to overwrite a customer's webhook configuration.
#[derive(Debug, Clone)]
pub struct WebhookConfigureDBRequest {
    pub customer_id: CustomerId,
    pub url: String,
    pub token: String,
}
