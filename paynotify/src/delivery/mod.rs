//! Outbound webhook delivery.
//!
//! - [`backoff`]: retry timing ([`BackoffPolicy`])
//! - [`client`]: one POST sequence with retries ([`DeliveryClient`])
//! - [`queue`]: channel-backed worker that runs deliveries in the background ([`DeliveryQueue`])

pub mod backoff;
pub mod client;
pub mod error;
pub mod queue;

pub use backoff::BackoffPolicy;
pub use client::{DeliveryClient, DeliveryReceipt};
pub use error::DeliveryError;
pub use queue::{DeliveryJob, DeliveryQueue, EnqueueError};
