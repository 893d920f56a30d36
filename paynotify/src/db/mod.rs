//! Database layer for data persistence and access.
//!
//! This module implements the data access layer using SQLx with PostgreSQL.
//! It follows the Repository pattern to provide clean abstractions over database operations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │ NotificationStore│  (crate::store - transactional units of work)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │   Repositories   │  (db::handlers - one statement per method)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │      Models      │  (db::models - database records)
//! └────────┬─────────┘
//!          │
//!          ↓
//! ┌──────────────────┐
//! │    PostgreSQL    │
//! └──────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations
//! - [`models`]: Database record structures matching table schemas
//! - [`errors`]: Database-specific error types
//!
//! # Migrations
//!
//! Database migrations are managed by SQLx and located in the `migrations/` directory.
//! The [`crate::migrator`] function provides access to the migrator:
//!
//! ```ignore
//! paynotify::migrator().run(&pool).await?;
//! ```

pub mod errors;
pub mod handlers;
pub mod models;
