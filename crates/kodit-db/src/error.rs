//! Database-layer error type, convertible into the workspace-wide
//! [`kodit_core::Error`] at the crate boundary (§7 propagation policy).

use thiserror::Error;

pub type DbResult<T> = std::result::Result<T, DbError>;

/// Errors raised by the connection pool, schema init, and raw-SQL helpers.
/// Deliberately narrower than [`kodit_core::Error`]: this crate knows
/// nothing about tasks, statuses, or search backends, only rows and
/// connections.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database url {0:?}")]
    InvalidUrl(String),

    #[error("pool error: {0}")]
    Pool(String),

    #[error("sql error: {0}")]
    Sql(String),

    #[error("schema init error: {0}")]
    Schema(String),

    #[error("row decode error: {0}")]
    Decode(String),
}

impl From<DbError> for kodit_core::Error {
    fn from(e: DbError) -> Self {
        kodit_core::Error::Database(e.to_string())
    }
}
