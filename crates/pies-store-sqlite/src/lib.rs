//! SQLite backend for the PIES record store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every store operation executes inside
//! a single transaction driven by [`retry::RetryPolicy`], which is the only
//! retry site in the codebase.

mod diff;
mod reconcile;
mod schema;
mod store;
mod tables;

pub mod cache;
pub mod error;
pub mod retry;

pub use cache::RefCache;
pub use error::{Error, Result};
pub use retry::{AccessMode, RetryPolicy};
pub use store::{SqliteStore, StoreOptions};

#[cfg(test)]
mod tests;
