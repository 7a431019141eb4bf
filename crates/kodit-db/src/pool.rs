//! A small synchronous connection pool over `sqlmodel_sqlite::SqliteConnection`.
//!
//! The workspace deliberately keeps persistence synchronous (§5 "Primitive
//! mapping"): the worker pool is a fixed set of OS threads, not a green-thread
//! runtime, so there is no ambient async executor for the pool to borrow. Each
//! acquired connection is exclusive for the duration of the closure passed to
//! [`DbPool::with_conn`]; `SQLite`'s own WAL-mode concurrency control handles
//! the rest.

use crate::error::{DbError, DbResult};
use crate::schema;
use sqlmodel_sqlite::SqliteConnection;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const DEFAULT_MAX_CONNECTIONS: usize = 8;
const DEFAULT_ACQUIRE_TIMEOUT_MS: u64 = 15_000;

/// Pool configuration. Everything has a default; `from_env` overlays
/// `KODIT_DATABASE_URL` / `KODIT_DB_MAX_CONNECTIONS` on top.
#[derive(Debug, Clone)]
pub struct DbPoolConfig {
    pub database_url: String,
    pub max_connections: usize,
    pub acquire_timeout: Duration,
}

impl Default for DbPoolConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./kodit.db".to_owned(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: Duration::from_millis(DEFAULT_ACQUIRE_TIMEOUT_MS),
        }
    }
}

impl DbPoolConfig {
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: std::env::var("KODIT_DATABASE_URL")
                .unwrap_or(defaults.database_url),
            max_connections: std::env::var("KODIT_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_connections),
            acquire_timeout: defaults.acquire_timeout,
        }
    }

    /// Extract the filesystem path (or `:memory:`) this url refers to.
    /// Accepts `sqlite://path`, `sqlite:///path`, and bare paths.
    fn sqlite_path(&self) -> DbResult<String> {
        let url = self.database_url.trim();
        if url == ":memory:" {
            return Ok(":memory:".to_owned());
        }
        let Some(rest) = url.strip_prefix("sqlite://") else {
            if url.starts_with("postgres://") || url.starts_with("mysql://") {
                return Err(DbError::InvalidUrl(url.to_owned()));
            }
            return Ok(url.to_owned());
        };
        let rest = rest.trim_start_matches('/');
        if rest.is_empty() || rest == ":memory:" {
            return Ok(":memory:".to_owned());
        }
        Ok(format!("/{rest}").trim_start_matches("//").to_owned())
    }
}

/// A pool of `SQLite` connections. For file-backed databases, up to
/// `max_connections` connections are opened lazily and recycled. For
/// `:memory:` databases a single connection is kept alive for the pool's
/// entire lifetime, since each `:memory:` connection is its own isolated
/// database.
pub struct DbPool {
    sqlite_path: String,
    max_connections: usize,
    acquire_timeout: Duration,
    idle: Mutex<Vec<SqliteConnection>>,
    outstanding: Mutex<usize>,
    available: Condvar,
}

impl DbPool {
    /// Open (creating if necessary) the database at `config.database_url`,
    /// run schema initialization, and return a ready-to-use pool.
    pub fn open(config: &DbPoolConfig) -> DbResult<Self> {
        let sqlite_path = config.sqlite_path()?;
        let max_connections = if sqlite_path == ":memory:" {
            1
        } else {
            config.max_connections.max(1)
        };

        let first = open_connection(&sqlite_path)?;
        schema::init(&first)?;

        Ok(Self {
            sqlite_path,
            max_connections,
            acquire_timeout: config.acquire_timeout,
            idle: Mutex::new(vec![first]),
            outstanding: Mutex::new(0),
            available: Condvar::new(),
        })
    }

    /// Open an in-memory pool with schema already initialized. Convenience
    /// for tests and for single-process deployments that don't need
    /// durability.
    pub fn open_memory() -> DbResult<Self> {
        Self::open(&DbPoolConfig {
            database_url: ":memory:".to_owned(),
            ..DbPoolConfig::default()
        })
    }

    #[must_use]
    pub fn sqlite_path(&self) -> &str {
        &self.sqlite_path
    }

    /// Acquire a connection, run `f`, and return it to the pool (or drop it
    /// on panic-unwind, which is fine: the next caller just opens a fresh
    /// one up to `max_connections`).
    pub fn with_conn<T>(&self, f: impl FnOnce(&SqliteConnection) -> DbResult<T>) -> DbResult<T> {
        let conn = self.acquire()?;
        let result = f(&conn);
        self.release(conn);
        result
    }

    fn acquire(&self) -> DbResult<SqliteConnection> {
        let deadline = Instant::now() + self.acquire_timeout;
        let mut idle = self.idle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        loop {
            if let Some(conn) = idle.pop() {
                *self.outstanding.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
                return Ok(conn);
            }
            let mut outstanding =
                self.outstanding.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if *outstanding < self.max_connections {
                *outstanding += 1;
                drop(outstanding);
                return open_connection(&self.sqlite_path);
            }
            drop(outstanding);

            let now = Instant::now();
            if now >= deadline {
                return Err(DbError::Pool(format!(
                    "timed out after {:?} waiting for a connection (max_connections={})",
                    self.acquire_timeout, self.max_connections
                )));
            }
            let (guard, timeout_result) = self
                .available
                .wait_timeout(idle, deadline - now)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            idle = guard;
            if timeout_result.timed_out() && idle.is_empty() {
                return Err(DbError::Pool(format!(
                    "timed out after {:?} waiting for a connection (max_connections={})",
                    self.acquire_timeout, self.max_connections
                )));
            }
        }
    }

    fn release(&self, conn: SqliteConnection) {
        *self.outstanding.lock().unwrap_or_else(std::sync::PoisonError::into_inner) -= 1;
        self.idle.lock().unwrap_or_else(std::sync::PoisonError::into_inner).push(conn);
        self.available.notify_one();
    }
}

fn open_connection(sqlite_path: &str) -> DbResult<SqliteConnection> {
    let conn = if sqlite_path == ":memory:" {
        SqliteConnection::open_memory()
    } else {
        SqliteConnection::open_file(sqlite_path.to_owned())
    };
    conn.map_err(|e| DbError::Sql(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlite_path_handles_memory_url() {
        let config = DbPoolConfig {
            database_url: "sqlite://:memory:".to_owned(),
            ..DbPoolConfig::default()
        };
        assert_eq!(config.sqlite_path().unwrap(), ":memory:");
    }

    #[test]
    fn sqlite_path_rejects_non_sqlite_scheme() {
        let config = DbPoolConfig {
            database_url: "postgres://localhost/db".to_owned(),
            ..DbPoolConfig::default()
        };
        assert!(config.sqlite_path().is_err());
    }

    #[test]
    fn open_memory_initializes_schema() {
        let pool = DbPool::open_memory().expect("open pool");
        pool.with_conn(|conn| {
            conn.query_sync("SELECT 1 FROM tasks LIMIT 0", &[])
                .map_err(|e| DbError::Sql(e.to_string()))
        })
        .expect("tasks table should exist after init");
    }

    #[test]
    fn connections_are_reused_after_release() {
        let pool = DbPool::open_memory().expect("open pool");
        for _ in 0..5 {
            pool.with_conn(|conn| {
                conn.query_sync("SELECT 1", &[])
                    .map_err(|e| DbError::Sql(e.to_string()))
            })
            .expect("query should succeed");
        }
        assert_eq!(pool.idle.lock().unwrap().len(), 1);
    }
}
