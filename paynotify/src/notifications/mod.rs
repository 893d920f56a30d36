//! Notification services: issuing new notifications and resending old ones.
//!
//! Both services do their synchronous work (lookups, persistence, enqueueing) inline and hand
//! the actual HTTP delivery to the [`DeliveryQueue`](crate::delivery::DeliveryQueue). Errors
//! from the synchronous part are returned to the caller; the delivery outcome never is.

pub mod dispatcher;
pub mod resend;

pub use dispatcher::Dispatcher;
pub use resend::ResendCoordinator;

use anyhow::Context;

use crate::db::errors::DbError;
use crate::delivery::{DeliveryJob, DeliveryQueue, EnqueueError};
use crate::errors::{Error, Result};
use crate::store::NotificationStore;
use crate::types::{CustomerId, IdempotencyKey, NotificationMessage};

/// Current webhook URL and token for a customer.
async fn resolve_endpoint(store: &dyn NotificationStore, customer_id: CustomerId) -> Result<(String, String)> {
    let webhook = store.lookup_webhook(customer_id).await.map_err(|e| match e {
        DbError::NotFound => Error::NotFound {
            resource: "Customer".to_string(),
            id: customer_id.to_string(),
        },
        other => Error::Database(other),
    })?;

    let (url, token) = webhook.endpoint().ok_or(Error::NotConfigured { customer_id })?;
    Ok((url.to_string(), token.to_string()))
}

/// Serialize `message` and put it on the delivery queue. `record` names the stored notification
/// to mark delivered on success; test messages have none.
fn enqueue(
    queue: &DeliveryQueue,
    url: String,
    message: &NotificationMessage,
    record: Option<IdempotencyKey>,
) -> Result<()> {
    let body = serde_json::to_string(message).context("serialize notification message")?;

    queue
        .enqueue(DeliveryJob {
            url,
            token: message.token.clone(),
            body,
            idempotency_key: record,
        })
        .map_err(|e: EnqueueError| Error::Internal {
            operation: format!("enqueue delivery: {e}"),
        })
}
