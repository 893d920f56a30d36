use std::sync::Arc;

use metrics::counter;
use tracing::instrument;

use super::{enqueue, resolve_endpoint};
use crate::delivery::DeliveryQueue;
use crate::errors::Result;
use crate::store::NotificationStore;
use crate::types::{CustomerId, IdempotencyKey, NotificationMessage, PaymentDetails, abbrev_uuid, new_idempotency_key};

/// Issues new notifications: mint a key, record the notification, queue its delivery.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn NotificationStore>,
    queue: DeliveryQueue,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn NotificationStore>, queue: DeliveryQueue) -> Self {
        Self { store, queue }
    }

    /// Notify a customer about a payment event.
    ///
    /// Returns the new idempotency key once the notification is recorded and queued. Fails
    /// without recording anything if the customer is unknown or has no webhook, and without
    /// queueing anything if the record cannot be written.
    #[instrument(skip(self, details), fields(reference_id = %details.reference_id), err)]
    pub async fn notify_customer(&self, customer_id: CustomerId, details: PaymentDetails) -> Result<IdempotencyKey> {
        let (url, token) = resolve_endpoint(self.store.as_ref(), customer_id).await?;

        let idempotency_key = new_idempotency_key();
        self.store.create_notification(idempotency_key, customer_id, &details).await?;
        counter!("paynotify_notifications_created_total").increment(1);

        let message = NotificationMessage::new(idempotency_key, token, details);
        enqueue(&self.queue, url, &message, Some(idempotency_key))?;

        tracing::debug!(
            customer_id,
            idempotency_key = %abbrev_uuid(&idempotency_key),
            "Notification recorded and queued"
        );
        Ok(idempotency_key)
    }

    /// Queue the canned test payload for `url`. Nothing is recorded.
    pub fn send_test(&self, url: &str, token: &str) -> Result<()> {
        let message = NotificationMessage::test(token);
        enqueue(&self.queue, url.to_string(), &message, None)?;
        tracing::debug!(url = %url, "Test notification queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::customers::CustomerWebhook;
    use crate::errors::Error;
    use crate::notifications::test_support::spawn_queue;
    use crate::store::{InMemoryStore, StoreOp};
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn details() -> PaymentDetails {
        PaymentDetails {
            reference_id: "ref1".to_string(),
            channel_code: "card".to_string(),
            amount: Decimal::new(1000, 1),
            currency: "SGD".to_string(),
            market: "SG".to_string(),
        }
    }

    fn setup(store: &Arc<InMemoryStore>) -> (Dispatcher, CancellationToken, tokio::task::JoinHandle<()>) {
        let shutdown = CancellationToken::new();
        let (queue, handle) = spawn_queue(store.clone(), shutdown.clone());
        (Dispatcher::new(store.clone(), queue), shutdown, handle)
    }

    #[tokio::test]
    async fn test_notify_records_then_delivers() {
        let mock_server = MockServer::start().await;
        let store = Arc::new(InMemoryStore::new());
        store.add_customer(1, CustomerWebhook::new(format!("{}/hook", mock_server.uri()), "abc"));
        let (dispatcher, shutdown, handle) = setup(&store);

        // Hold the response so the pending state is observable
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("authorization", "Bearer abc"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(200)))
            .expect(1)
            .mount(&mock_server)
            .await;

        let key = dispatcher.notify_customer(1, details()).await.unwrap();

        let record = store.lookup_notification(key).await.unwrap();
        assert!(!record.delivered);
        assert_eq!(record.details(), &details());
        assert_eq!(record.customer_id, 1);

        shutdown.cancel();
        handle.await.unwrap();

        assert!(store.lookup_notification(key).await.unwrap().delivered);
        let requests = mock_server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["idempotency_key"], serde_json::json!(key.to_string()));
        assert_eq!(body["token"], serde_json::json!("abc"));
        assert_eq!(body["details"]["amount"], serde_json::json!(100.0));
    }

    #[tokio::test]
    async fn test_each_notification_gets_a_fresh_key() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;
        let store = Arc::new(InMemoryStore::new());
        store.add_customer(1, CustomerWebhook::new(mock_server.uri(), "abc"));
        let (dispatcher, shutdown, handle) = setup(&store);

        let first = dispatcher.notify_customer(1, details()).await.unwrap();
        let second = dispatcher.notify_customer(1, details()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(store.notification_count(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_customer_fails_fast() {
        let store = Arc::new(InMemoryStore::new());
        let (dispatcher, shutdown, _handle) = setup(&store);

        let err = dispatcher.notify_customer(42, details()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
        assert_eq!(store.notification_count(), 0);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_unconfigured_customer_fails_fast() {
        let store = Arc::new(InMemoryStore::new());
        store.add_customer(1, CustomerWebhook::default());
        let (dispatcher, shutdown, _handle) = setup(&store);

        let err = dispatcher.notify_customer(1, details()).await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured { customer_id: 1 }));
        assert_eq!(store.notification_count(), 0);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_persist_failure_sends_nothing() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;
        let store = Arc::new(InMemoryStore::new());
        store.add_customer(1, CustomerWebhook::new(mock_server.uri(), "abc"));
        store.fail_on(StoreOp::CreateNotification);
        let (dispatcher, shutdown, handle) = setup(&store);

        let err = dispatcher.notify_customer(1, details()).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_lookup_failure_is_a_storage_error() {
        let store = Arc::new(InMemoryStore::new());
        store.add_customer(1, CustomerWebhook::new("https://example.com/hook", "abc"));
        store.fail_on(StoreOp::LookupWebhook);
        let (dispatcher, shutdown, _handle) = setup(&store);

        let err = dispatcher.notify_customer(1, details()).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(store.notification_count(), 0);

        shutdown.cancel();
    }

    #[tokio::test]
    async fn test_send_test_posts_canned_payload() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer xyz"))
            .and(body_json(serde_json::json!({
                "idempotency_key": "test_idempotency_key",
                "token": "xyz",
                "details": {
                    "reference_id": "test_reference_id",
                    "channel_code": "test_channel_code",
                    "amount": 100000.0,
                    "currency": "SGD",
                    "market": "Singapore"
                }
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;
        let store = Arc::new(InMemoryStore::new());
        let (dispatcher, shutdown, handle) = setup(&store);

        dispatcher.send_test(&mock_server.uri(), "xyz").unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(store.notification_count(), 0);
    }
}
