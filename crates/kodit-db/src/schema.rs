//! DDL for the tables every other crate in the workspace reads and writes.
//!
//! Kept as a single `CREATE TABLE IF NOT EXISTS` script, run once per pool on
//! open, mirroring the teacher's `schema.rs` (one big constant string, no
//! migration framework beyond "can this script run again safely").

use crate::error::{DbError, DbResult};
use sqlmodel_sqlite::SqliteConnection;
use std::sync::OnceLock;
use std::sync::Mutex;

const CREATE_TABLES_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    dedup_key TEXT NOT NULL UNIQUE,
    operation TEXT NOT NULL,
    priority INTEGER NOT NULL,
    payload TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tasks_dequeue
    ON tasks (priority DESC, created_at ASC);

CREATE TABLE IF NOT EXISTS task_statuses (
    id TEXT PRIMARY KEY,
    trackable_type TEXT NOT NULL,
    trackable_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    parent_id TEXT,
    state TEXT NOT NULL,
    message TEXT NOT NULL,
    total INTEGER NOT NULL,
    current INTEGER NOT NULL,
    error TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_statuses_parent
    ON task_statuses (parent_id);

CREATE INDEX IF NOT EXISTS idx_task_statuses_trackable
    ON task_statuses (trackable_type, trackable_id);

CREATE TABLE IF NOT EXISTS snippets (
    snippet_id TEXT PRIMARY KEY,
    source_repo_id INTEGER,
    commit_sha TEXT,
    file_path TEXT,
    language TEXT,
    author TEXT,
    created_at INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE VIRTUAL TABLE IF NOT EXISTS snippets_fts USING fts5(
    snippet_id UNINDEXED,
    content,
    content='snippets',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS snippets_fts_ai AFTER INSERT ON snippets BEGIN
    INSERT INTO snippets_fts(rowid, snippet_id, content)
    VALUES (new.rowid, new.snippet_id, new.content);
END;

CREATE TRIGGER IF NOT EXISTS snippets_fts_ad AFTER DELETE ON snippets BEGIN
    INSERT INTO snippets_fts(snippets_fts, rowid, snippet_id, content)
    VALUES ('delete', old.rowid, old.snippet_id, old.content);
END;

CREATE TRIGGER IF NOT EXISTS snippets_fts_au AFTER UPDATE ON snippets BEGIN
    INSERT INTO snippets_fts(snippets_fts, rowid, snippet_id, content)
    VALUES ('delete', old.rowid, old.snippet_id, old.content);
    INSERT INTO snippets_fts(rowid, snippet_id, content)
    VALUES (new.rowid, new.snippet_id, new.content);
END;

CREATE TABLE IF NOT EXISTS vector_embeddings (
    snippet_id TEXT NOT NULL,
    embedding_type TEXT NOT NULL,
    vector TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (snippet_id, embedding_type)
);
";

/// Runs `CREATE_TABLES_SQL` against `conn`. Idempotent: every statement is
/// `IF NOT EXISTS`, so calling this on an already-initialized database is a
/// no-op.
pub fn init(conn: &SqliteConnection) -> DbResult<()> {
    conn.execute_raw(CREATE_TABLES_SQL)
        .map_err(|e| DbError::Schema(e.to_string()))?;
    Ok(())
}

/// Guards against re-running schema initialization more often than needed
/// when many short-lived pools are opened against the same process (tests,
/// mainly); production code has exactly one `DbPool` per process and does
/// not need this.
static INIT_GUARD: OnceLock<Mutex<()>> = OnceLock::new();

pub fn init_once(conn: &SqliteConnection) -> DbResult<()> {
    let guard = INIT_GUARD.get_or_init(|| Mutex::new(()));
    let _lock = guard.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
    init(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = SqliteConnection::open_memory().expect("open");
        init(&conn).expect("first init");
        init(&conn).expect("second init should not error");
    }

    #[test]
    fn creates_all_expected_tables() {
        let conn = SqliteConnection::open_memory().expect("open");
        init(&conn).expect("init");
        for table in ["tasks", "task_statuses", "snippets", "vector_embeddings"] {
            conn.query_sync(&format!("SELECT * FROM {table} LIMIT 0"), &[])
                .unwrap_or_else(|e| panic!("table {table} should exist: {e}"));
        }
    }
}
