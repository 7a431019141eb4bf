//! The dedup-persistent priority queue tasks flow through.
//!
//! Mutators are single-statement (coalesce-upsert on enqueue, a
//! `BEGIN IMMEDIATE` / select / delete / `COMMIT` transaction on dequeue),
//! mirroring the teacher's raw-SQL transaction idiom (`mcp-agent-mail-db`'s
//! `queries.rs` issues `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK` directly
//! rather than through a wrapper type) rather than any in-process locking —
//! `SQLite`'s own transactional isolation is what makes concurrent workers
//! safe.

use kodit_core::error::Result;
use kodit_core::operation::Operation;
use kodit_core::task::{Payload, Task};
use kodit_db::{DbError, DbPool, SqliteConnection, Value};
use std::sync::Arc;

/// Decode one `tasks` row into a [`Task`]. A macro rather than a generic
/// function: the row type returned by `query_sync` is an implementation
/// detail of `sqlmodel-sqlite` that this crate never names directly.
macro_rules! task_from_row {
    ($row:expr) => {{
        let row = $row;
        (|| -> std::result::Result<Task, DbError> {
            let id = row.get_named::<i64>("id").map_err(|e| DbError::Decode(e.to_string()))?;
            let dedup_key =
                row.get_named::<String>("dedup_key").map_err(|e| DbError::Decode(e.to_string()))?;
            let operation_str =
                row.get_named::<String>("operation").map_err(|e| DbError::Decode(e.to_string()))?;
            let operation = Operation::parse(&operation_str).ok_or_else(|| {
                DbError::Decode(format!("unknown operation in tasks row: {operation_str}"))
            })?;
            let priority =
                row.get_named::<i64>("priority").map_err(|e| DbError::Decode(e.to_string()))?;
            let payload_json =
                row.get_named::<String>("payload").map_err(|e| DbError::Decode(e.to_string()))?;
            let payload: Payload = serde_json::from_str(&payload_json)
                .map_err(|e| DbError::Decode(e.to_string()))?;
            let created_at =
                row.get_named::<i64>("created_at").map_err(|e| DbError::Decode(e.to_string()))?;
            let updated_at =
                row.get_named::<i64>("updated_at").map_err(|e| DbError::Decode(e.to_string()))?;

            Ok(Task { id: Some(id), dedup_key, operation, priority, payload, created_at, updated_at })
        })()
    }};
}

/// Public surface every caller (workflows, the worker pool, the CLI) uses to
/// interact with the queue. Kept as a trait so tests can swap in an
/// in-memory fake without dragging `SQLite` into unit tests that don't care
/// about persistence.
pub trait Queue: Send + Sync {
    /// Persist `task`. If a row with the same `dedup_key` already exists,
    /// coalesce: keep the existing row, raise its priority to
    /// `max(existing, incoming)`, and refresh `updated_at`. Returns the
    /// task as actually stored (with its assigned `id`).
    fn enqueue(&self, task: Task) -> Result<Task>;

    /// Persist `operations` as `operations.len()` tasks sharing `payload`,
    /// with strictly decreasing priorities starting at
    /// `base_priority + operations.len() * 10`. See module docs on
    /// `kodit_core::priority` for why the ×10 step never crosses a level.
    fn enqueue_operations(
        &self,
        operations: &[Operation],
        base_priority: i64,
        payload: Payload,
    ) -> Result<Vec<Task>>;

    /// Atomically pop the highest-priority task (ties broken by oldest
    /// `created_at`). `Ok(None)` means the queue is empty — not an error.
    fn dequeue(&self) -> Result<Option<Task>>;

    /// All queued tasks, highest priority first. Introspection only.
    fn list(&self) -> Result<Vec<Task>>;

    /// A single task by id, if still queued.
    fn get(&self, id: i64) -> Result<Option<Task>>;

    /// Number of currently queued tasks.
    fn count(&self) -> Result<i64>;
}

/// The only production [`Queue`] implementation: the `tasks` table `kodit-db`
/// creates, accessed through a shared [`DbPool`].
pub struct SqliteQueue {
    pool: Arc<DbPool>,
}

impl SqliteQueue {
    #[must_use]
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl Queue for SqliteQueue {
    fn enqueue(&self, task: Task) -> Result<Task> {
        self.pool
            .with_conn(|conn| {
                let payload_json = serde_json::to_string(&task.payload)
                    .map_err(|e| DbError::Decode(e.to_string()))?;
                conn.execute_sync(
                    "INSERT INTO tasks (dedup_key, operation, priority, payload, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(dedup_key) DO UPDATE SET \
                     priority = MAX(tasks.priority, excluded.priority), \
                     updated_at = excluded.updated_at",
                    &[
                        Value::Text(task.dedup_key.clone()),
                        Value::Text(task.operation.as_str().to_owned()),
                        Value::BigInt(task.priority),
                        Value::Text(payload_json),
                        Value::BigInt(task.created_at),
                        Value::BigInt(task.updated_at),
                    ],
                )
                .map_err(|e| DbError::Sql(e.to_string()))?;

                fetch_by_dedup_key(conn, &task.dedup_key)?.ok_or_else(|| {
                    DbError::Sql("row vanished immediately after upsert".to_owned())
                })
            })
            .map_err(Into::into)
    }

    fn enqueue_operations(
        &self,
        operations: &[Operation],
        base_priority: i64,
        payload: Payload,
    ) -> Result<Vec<Task>> {
        let len = operations.len() as i64;
        let now = now_micros();
        let mut stored = Vec::with_capacity(operations.len());
        for (i, operation) in operations.iter().enumerate() {
            let priority = base_priority + (len - i as i64) * 10;
            let task = Task::new(*operation, priority, payload.clone(), now);
            stored.push(self.enqueue(task)?);
        }
        Ok(stored)
    }

    fn dequeue(&self) -> Result<Option<Task>> {
        self.pool
            .with_conn(|conn| {
                conn.execute_sync("BEGIN IMMEDIATE", &[])
                    .map_err(|e| DbError::Sql(e.to_string()))?;

                let picked = (|| -> std::result::Result<Option<Task>, DbError> {
                    let rows = conn
                        .query_sync(
                            "SELECT id, dedup_key, operation, priority, payload, created_at, updated_at \
                             FROM tasks ORDER BY priority DESC, created_at ASC LIMIT 1",
                            &[],
                        )
                        .map_err(|e| DbError::Sql(e.to_string()))?;
                    let Some(row) = rows.into_iter().next() else {
                        return Ok(None);
                    };
                    let task = task_from_row!(&row)?;
                    let id = task.id.expect("row read from tasks always has an id");
                    conn.execute_sync("DELETE FROM tasks WHERE id = ?", &[Value::BigInt(id)])
                        .map_err(|e| DbError::Sql(e.to_string()))?;
                    Ok(Some(task))
                })();

                match picked {
                    Ok(result) => {
                        conn.execute_sync("COMMIT", &[])
                            .map_err(|e| DbError::Sql(e.to_string()))?;
                        Ok(result)
                    }
                    Err(e) => {
                        let _ = conn.execute_sync("ROLLBACK", &[]);
                        Err(e)
                    }
                }
            })
            .map_err(Into::into)
    }

    fn list(&self) -> Result<Vec<Task>> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync(
                        "SELECT id, dedup_key, operation, priority, payload, created_at, updated_at \
                         FROM tasks ORDER BY priority DESC, created_at ASC",
                        &[],
                    )
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                rows.iter().map(|row| task_from_row!(row)).collect()
            })
            .map_err(Into::into)
    }

    fn get(&self, id: i64) -> Result<Option<Task>> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync(
                        "SELECT id, dedup_key, operation, priority, payload, created_at, updated_at \
                         FROM tasks WHERE id = ?",
                        &[Value::BigInt(id)],
                    )
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                rows.into_iter().next().map(|row| task_from_row!(row)).transpose()
            })
            .map_err(Into::into)
    }

    fn count(&self) -> Result<i64> {
        self.pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync("SELECT COUNT(*) AS n FROM tasks", &[])
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                rows.into_iter()
                    .next()
                    .map(|row| row.get_named::<i64>("n").map_err(|e| DbError::Decode(e.to_string())))
                    .transpose()
                    .map(|n| n.unwrap_or(0))
            })
            .map_err(Into::into)
    }
}

fn fetch_by_dedup_key(
    conn: &SqliteConnection,
    dedup_key: &str,
) -> std::result::Result<Option<Task>, DbError> {
    let rows = conn
        .query_sync(
            "SELECT id, dedup_key, operation, priority, payload, created_at, updated_at \
             FROM tasks WHERE dedup_key = ?",
            &[Value::Text(dedup_key.to_owned())],
        )
        .map_err(|e| DbError::Sql(e.to_string()))?;
    match rows.into_iter().next() {
        Some(row) => task_from_row!(&row).map(Some),
        None => Ok(None),
    }
}

fn now_micros() -> i64 {
    #[allow(clippy::cast_possible_wrap)]
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kodit_core::priority::NORMAL;
    use std::collections::BTreeMap;

    fn payload(repo: i64) -> Payload {
        let mut p = BTreeMap::new();
        p.insert("repo".to_owned(), serde_json::json!(repo));
        p
    }

    fn queue() -> SqliteQueue {
        SqliteQueue::new(Arc::new(DbPool::open_memory().expect("open pool")))
    }

    #[test]
    fn workflow_ordering_scenario() {
        let q = queue();
        let tasks = q
            .enqueue_operations(
                &[Operation::RepoClone, Operation::RepoSync, Operation::CommitScan],
                NORMAL,
                payload(1),
            )
            .unwrap();
        let priorities: Vec<i64> = tasks.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![2030, 2020, 2010]);

        let first = q.dequeue().unwrap().unwrap();
        assert_eq!(first.operation, Operation::RepoClone);
        assert_eq!(first.priority, 2030);
        let second = q.dequeue().unwrap().unwrap();
        assert_eq!(second.operation, Operation::RepoSync);
        let third = q.dequeue().unwrap().unwrap();
        assert_eq!(third.operation, Operation::CommitScan);
        assert!(q.dequeue().unwrap().is_none());
    }

    #[test]
    fn dedup_coalesce_scenario() {
        let q = queue();
        let now = now_micros();
        q.enqueue(Task::new(Operation::RepoClone, NORMAL, payload(1), now)).unwrap();
        q.enqueue(Task::new(Operation::RepoClone, kodit_core::priority::CRITICAL, payload(1), now))
            .unwrap();
        assert_eq!(q.count().unwrap(), 1);
        let task = q.dequeue().unwrap().unwrap();
        assert_eq!(task.priority, kodit_core::priority::CRITICAL);
    }

    #[test]
    fn coalesce_never_lowers_priority() {
        let q = queue();
        let now = now_micros();
        q.enqueue(Task::new(Operation::RepoClone, kodit_core::priority::CRITICAL, payload(1), now))
            .unwrap();
        q.enqueue(Task::new(Operation::RepoClone, NORMAL, payload(1), now)).unwrap();
        assert_eq!(q.count().unwrap(), 1);
        let task = q.dequeue().unwrap().unwrap();
        assert_eq!(task.priority, kodit_core::priority::CRITICAL);
    }

    #[test]
    fn dequeue_on_empty_queue_is_not_an_error() {
        let q = queue();
        assert!(q.dequeue().unwrap().is_none());
    }

    #[test]
    fn dequeue_breaks_ties_by_oldest_created_at() {
        let q = queue();
        q.enqueue(Task::new(Operation::RepoClone, NORMAL, payload(1), 100)).unwrap();
        q.enqueue(Task::new(Operation::RepoSync, NORMAL, payload(2), 50)).unwrap();
        let first = q.dequeue().unwrap().unwrap();
        assert_eq!(first.operation, Operation::RepoSync);
    }

    #[test]
    fn get_returns_none_for_unknown_id() {
        let q = queue();
        assert!(q.get(9999).unwrap().is_none());
    }

    #[test]
    fn list_is_ordered_like_dequeue() {
        let q = queue();
        q.enqueue_operations(
            &[Operation::RepoClone, Operation::RepoSync, Operation::CommitScan],
            NORMAL,
            payload(1),
        )
        .unwrap();
        let listed = q.list().unwrap();
        let priorities: Vec<i64> = listed.iter().map(|t| t.priority).collect();
        assert_eq!(priorities, vec![2030, 2020, 2010]);
    }
}
