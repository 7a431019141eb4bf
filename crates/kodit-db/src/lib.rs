//! Connection pool, schema, and raw-SQL plumbing shared by every other
//! crate in the workspace.
//!
//! This crate deliberately knows nothing about tasks, operations, or search:
//! it hands out `SQLite` connections and makes sure the schema exists before
//! anyone uses one. `kodit-queue` and `kodit-search-core` build their own
//! queries directly against [`sqlmodel_sqlite::SqliteConnection`] using the
//! `Value`/`Row` types re-exported here.

pub mod error;
pub mod pool;
pub mod schema;

pub use error::{DbError, DbResult};
pub use pool::{DbPool, DbPoolConfig};

/// Re-exported so downstream crates build raw-SQL parameter lists and decode
/// rows without taking a direct dependency on `sqlmodel_sqlite`/`sqlmodel-core`.
pub use sqlmodel_sqlite;
pub use sqlmodel_sqlite::SqliteConnection;
pub use sqlmodel_core::Value;
