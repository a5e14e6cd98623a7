//! SQLite backend for the Insight knowledge store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Each multi-row mutation runs inside a
//! single closure on that thread and commits or rolls back before the closure
//! returns, so dropping the calling future can never leave a transaction open.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
