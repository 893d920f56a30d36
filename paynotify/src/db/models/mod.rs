//! Database record models matching table schemas.
//!
//! - [`customers`]: Customers and their webhook URL / bearer token
//! - [`notifications`]: Notification records keyed by idempotency key

pub mod customers;
pub mod notifications;
