//! Depot Database Layer
//!
//! This crate provides the repositories the worker and the cleanup sweeper
//! use to read and update files, webhooks and webhook deliveries.
//!
//! Callers depend on the [`FileRepository`] and [`WebhookRepository`] traits;
//! all SQL stays inside the `Pg*Repository` implementations.

pub mod db;
pub mod error;
pub mod traits;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

// Re-exports: repositories
pub use db::{connect, run_migrations, PgFileRepository, PgWebhookRepository};

// Re-exports: traits and errors
pub use error::{DbError, DbResult};
pub use traits::{FileRepository, ListCursor, WebhookRepository};
