use std::sync::Arc;

use metrics::counter;
use tracing::instrument;

use super::{enqueue, resolve_endpoint};
use crate::db::errors::DbError;
use crate::delivery::DeliveryQueue;
use crate::errors::{Error, Result};
use crate::store::NotificationStore;
use crate::types::{CustomerId, IdempotencyKey, NotificationMessage, abbrev_uuid};

/// Redelivers a previously recorded notification under its original idempotency key, to the
/// customer's current webhook.
#[derive(Clone)]
pub struct ResendCoordinator {
    store: Arc<dyn NotificationStore>,
    queue: DeliveryQueue,
}

impl ResendCoordinator {
    pub fn new(store: Arc<dyn NotificationStore>, queue: DeliveryQueue) -> Self {
        Self { store, queue }
    }

    #[instrument(skip(self), fields(idempotency_key = %abbrev_uuid(&idempotency_key)), err)]
    pub async fn resend(&self, idempotency_key: IdempotencyKey, customer_id: CustomerId) -> Result<()> {
        let not_found = || Error::NotFound {
            resource: "Notification".to_string(),
            id: idempotency_key.to_string(),
        };

        let record = self.store.lookup_notification(idempotency_key).await.map_err(|e| match e {
            DbError::NotFound => not_found(),
            other => Error::Database(other),
        })?;
        // Another customer's notification is indistinguishable from a missing one
        if record.customer_id != customer_id {
            return Err(not_found());
        }

        let (url, token) = resolve_endpoint(self.store.as_ref(), customer_id).await?;

        let message = NotificationMessage::new(idempotency_key, token, record.details.0);
        enqueue(&self.queue, url, &message, Some(idempotency_key))?;
        counter!("paynotify_resends_total").increment(1);

        tracing::debug!(customer_id, "Notification queued for resend");
        Ok(())
    }
}
