//! SQLite backend for the Docket governance core.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every multi-step governance write runs
//! inside one SQLite transaction together with its audit entry.

mod encode;
mod registry;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use registry::{SUBJECT_TABLE, registered_tables};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
