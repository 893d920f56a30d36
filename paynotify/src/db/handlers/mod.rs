//! Repository implementations for database access.
//!
//! Each repository wraps a `PgConnection` (or a transaction deref'd to one) and exposes
//! strongly-typed operations for one table:
//!
//! - [`Customers`]: customer rows and their webhook configuration
//! - [`Notifications`]: notification records keyed by idempotency key
//!
//! Repositories never begin or commit transactions themselves; callers decide the unit of work.
//!
//! ```ignore
//! let mut tx = pool.begin().await?;
//! Notifications::new(&mut tx).mark_delivered(key).await?;
//! tx.commit().await?;
//! ```

pub mod customers;
pub mod notifications;

pub use customers::Customers;
pub use notifications::Notifications;
