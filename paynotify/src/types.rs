//! Common type definitions shared by the store, delivery and API layers.
//!
//! # ID Types
//!
//! - [`CustomerId`]: Customer identifier (database `BIGSERIAL`)
//! - [`IdempotencyKey`]: Identifies one logical notification, minted once and reused on resend
//!
//! # Payloads
//!
//! - [`PaymentDetails`]: The payment event being reported, stored as an opaque JSON blob
//! - [`NotificationMessage`]: The JSON body POSTed to a customer's webhook
//!
//! # Utility Functions
//!
//! - [`abbrev_uuid`]: Abbreviate UUIDs to first 8 chars for logging

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CustomerId = i64;
pub type IdempotencyKey = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

/// Mint a fresh idempotency key. Keys are random and never derived from the payload, so two
/// identical payment events produce two distinct notifications.
pub fn new_idempotency_key() -> IdempotencyKey {
    Uuid::new_v4()
}

/// Details of a payment event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    pub reference_id: String,
    pub channel_code: String,
    /// Currency-scaled amount, carried on the wire as a JSON number
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub market: String,
}

impl PaymentDetails {
    /// Fixed payload sent when a customer asks for a test notification.
    pub fn test_fixture() -> Self {
        Self {
            reference_id: "test_reference_id".to_string(),
            channel_code: "test_channel_code".to_string(),
            amount: Decimal::new(100_000, 0),
            currency: "SGD".to_string(),
            market: "Singapore".to_string(),
        }
    }
}

/// Body of the outbound webhook call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    /// Serialized as a plain string so test messages can carry a non-UUID marker key
    pub idempotency_key: String,
    pub token: String,
    pub details: PaymentDetails,
}

/// Key carried by test notifications; never persisted.
pub const TEST_IDEMPOTENCY_KEY: &str = "test_idempotency_key";

impl NotificationMessage {
    pub fn new(idempotency_key: IdempotencyKey, token: impl Into<String>, details: PaymentDetails) -> Self {
        Self {
            idempotency_key: idempotency_key.to_string(),
            token: token.into(),
            details,
        }
    }

    pub fn test(token: impl Into<String>) -> Self {
        Self {
            idempotency_key: TEST_IDEMPOTENCY_KEY.to_string(),
            token: token.into(),
            details: PaymentDetails::test_fixture(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payment_details_amount_is_a_json_number() {
        let details: PaymentDetails = serde_json::from_value(json!({
            "reference_id": "ref1",
            "channel_code": "card",
            "amount": 100.5,
            "currency": "SGD",
            "market": "SG"
        }))
        .unwrap();

        assert_eq!(details.amount, Decimal::new(1005, 1));
        assert_eq!(serde_json::to_value(&details).unwrap()["amount"], json!(100.5));
    }

    #[test]
    fn test_message_shape() {
        let key = Uuid::new_v4();
        let message = NotificationMessage::new(key, "abc", PaymentDetails::test_fixture());
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["idempotency_key"], json!(key.to_string()));
        assert_eq!(value["token"], json!("abc"));
        assert_eq!(value["details"]["currency"], json!("SGD"));
    }

    #[test]
    fn test_keys_are_not_derived_from_payload() {
        assert_ne!(new_idempotency_key(), new_idempotency_key());
    }

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
