//! In-memory [`NotificationStore`] for tests that run without PostgreSQL.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::types::Json;

use super::NotificationStore;
use crate::db::errors::{DbError, Result};
use crate::db::models::customers::CustomerWebhook;
use crate::db::models::notifications::NotificationRecord;
use crate::types::{CustomerId, IdempotencyKey, PaymentDetails};

/// Store operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ConfigureWebhook,
    CreateNotification,
    LookupWebhook,
    LookupNotification,
    MarkDelivered,
}

#[derive(Default)]
struct State {
    customers: HashMap<CustomerId, CustomerWebhook>,
    notifications: HashMap<IdempotencyKey, NotificationRecord>,
    next_id: i64,
    failing: HashSet<StoreOp>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a customer with the given webhook configuration.
    pub fn add_customer(&self, customer_id: CustomerId, webhook: CustomerWebhook) {
        self.lock().customers.insert(customer_id, webhook);
    }

    /// Make `op` return a storage error until [`Self::clear_failures`] is called.
    pub fn fail_on(&self, op: StoreOp) {
        self.lock().failing.insert(op);
    }

    pub fn clear_failures(&self) {
        self.lock().failing.clear();
    }

    pub fn notification_count(&self) -> usize {
        self.lock().notifications.len()
    }

    pub fn notifications(&self) -> Vec<NotificationRecord> {
        self.lock().notifications.values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check(state: &State, op: StoreOp) -> Result<()> {
        if state.failing.contains(&op) {
            return Err(DbError::Other(anyhow!("injected failure in {op:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn configure_webhook(&self, customer_id: CustomerId, token: &str, url: &str) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, StoreOp::ConfigureWebhook)?;
        let webhook = state.customers.get_mut(&customer_id).ok_or(DbError::NotFound)?;
        *webhook = CustomerWebhook::new(url, token);
        Ok(())
    }

    async fn create_notification(
        &self,
        idempotency_key: IdempotencyKey,
        customer_id: CustomerId,
        details: &PaymentDetails,
    ) -> Result<NotificationRecord> {
        let mut state = self.lock();
        Self::check(&state, StoreOp::CreateNotification)?;

        if !state.customers.contains_key(&customer_id) {
            return Err(DbError::ForeignKeyViolation {
                constraint: Some("notifications_customer_id_fkey".to_string()),
                table: Some("notifications".to_string()),
                message: format!("customer {customer_id} does not exist"),
            });
        }
        if state.notifications.contains_key(&idempotency_key) {
            return Err(DbError::UniqueViolation {
                constraint: Some("notifications_idempotency_key_unique".to_string()),
                table: Some("notifications".to_string()),
                message: format!("idempotency key {idempotency_key} already exists"),
            });
        }

        state.next_id += 1;
        let now = Utc::now();
        let record = NotificationRecord {
            id: state.next_id,
            customer_id,
            idempotency_key,
            details: Json(details.clone()),
            delivered: false,
            created_at: now,
            updated_at: now,
        };
        state.notifications.insert(idempotency_key, record.clone());
        Ok(record)
    }

    async fn lookup_webhook(&self, customer_id: CustomerId) -> Result<CustomerWebhook> {
        let state = self.lock();
        Self::check(&state, StoreOp::LookupWebhook)?;
        state.customers.get(&customer_id).cloned().ok_or(DbError::NotFound)
    }

    async fn lookup_notification(&self, idempotency_key: IdempotencyKey) -> Result<NotificationRecord> {
        let state = self.lock();
        Self::check(&state, StoreOp::LookupNotification)?;
        state.notifications.get(&idempotency_key).cloned().ok_or(DbError::NotFound)
    }

    async fn mark_delivered(&self, idempotency_key: IdempotencyKey) -> Result<()> {
        let mut state = self.lock();
        Self::check(&state, StoreOp::MarkDelivered)?;
        let record = state.notifications.get_mut(&idempotency_key).ok_or(DbError::NotFound)?;
        if !record.delivered {
            record.delivered = true;
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}
