//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//! - **[`extract`]**: Body extractors mapping rejections onto [`crate::errors::Error`]
//!
//! # API Structure
//!
//! - `POST /notifications`: configure a customer's webhook, or send it a test payload
//! - `POST /notifications/resend`: redeliver a recorded notification under its original key
//! - `GET /notifications/{idempotency_key}`: read a notification and its delivery status
//! - `POST /payments`: report a payment event, which notifies the customer

pub mod extract;
pub mod handlers;
pub mod models;
