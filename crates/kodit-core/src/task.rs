//! The queued unit of work.

use crate::operation::Operation;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A string-keyed, JSON-serializable payload. `BTreeMap` rather than
/// `HashMap` so the digest in `dedup_key` is deterministic regardless of
/// insertion order.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// A queued unit of work.
///
/// At most one `Task` per `dedup_key` exists in the queue at any time (see
/// `kodit_queue::Queue::enqueue`). A task's mere existence in the queue means
/// "pending" — there is no separate running state stored on the task
/// itself; once a worker dequeues it, the row is gone and the task is owned
/// exclusively by that worker until it deletes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Monotonic id, assigned on persist. `None` for a task that has not
    /// yet been enqueued.
    pub id: Option<i64>,
    /// Stable digest of `operation` + `payload`; the queue's uniqueness key.
    pub dedup_key: String,
    /// What the handler registry will dispatch on.
    pub operation: Operation,
    /// Higher runs first. See `kodit_core::priority`.
    pub priority: i64,
    /// Arbitrary JSON-serializable payload shared across a workflow's steps.
    pub payload: Payload,
    /// Microseconds since epoch; set once, at first persist.
    pub created_at: i64,
    /// Microseconds since epoch; refreshed on every coalesce.
    pub updated_at: i64,
}

impl Task {
    /// Construct a new, not-yet-persisted task. `now` is microseconds since
    /// epoch, supplied by the caller so this stays a pure function.
    #[must_use]
    pub fn new(operation: Operation, priority: i64, payload: Payload, now: i64) -> Self {
        let dedup_key = dedup_key(operation, &payload);
        Self {
            id: None,
            dedup_key,
            operation,
            priority,
            payload,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Compute the stable dedup key for an operation + payload pair: the
/// operation string, a literal separator, and the hex SHA-256 digest of the
/// payload's canonical JSON encoding (canonical because `Payload` is a
/// `BTreeMap`, so key order never affects the digest).
#[must_use]
pub fn dedup_key(operation: Operation, payload: &Payload) -> String {
    // `BTreeMap`'s `Serialize` impl emits keys in sorted order, so this is
    // stable across process restarts and across languages reading the same
    // payload shape.
    let canonical = serde_json::to_vec(payload).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical);
    let digest = hasher.finalize();
    format!("{}:{}", operation.as_str(), hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(pairs: &[(&str, i64)]) -> Payload {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), serde_json::json!(v)))
            .collect()
    }

    #[test]
    fn dedup_key_is_stable_across_insertion_order() {
        let a = payload(&[("repo", 1), ("branch", 2)]);
        let b: Payload = [
            ("branch".to_owned(), serde_json::json!(2)),
            ("repo".to_owned(), serde_json::json!(1)),
        ]
        .into_iter()
        .collect();
        assert_eq!(dedup_key(Operation::RepoClone, &a), dedup_key(Operation::RepoClone, &b));
    }

    #[test]
    fn dedup_key_differs_by_operation() {
        let p = payload(&[("repo", 1)]);
        assert_ne!(
            dedup_key(Operation::RepoClone, &p),
            dedup_key(Operation::RepoSync, &p)
        );
    }

    #[test]
    fn dedup_key_differs_by_payload() {
        let a = payload(&[("repo", 1)]);
        let b = payload(&[("repo", 2)]);
        assert_ne!(
            dedup_key(Operation::RepoClone, &a),
            dedup_key(Operation::RepoClone, &b)
        );
    }

    #[test]
    fn new_task_sets_created_and_updated_to_same_timestamp() {
        let task = Task::new(Operation::RepoClone, 2_000, Payload::new(), 42);
        assert_eq!(task.created_at, 42);
        assert_eq!(task.updated_at, 42);
        assert!(task.id.is_none());
    }

    #[test]
    fn new_task_dedup_key_matches_free_function() {
        let p = payload(&[("repo", 7)]);
        let task = Task::new(Operation::RepoSync, 2_000, p.clone(), 0);
        assert_eq!(task.dedup_key, dedup_key(Operation::RepoSync, &p));
    }
}
