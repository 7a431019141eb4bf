//! Hierarchical progress tracking: a thin façade over [`TaskStatus`] that
//! emits every mutation to a [`Reporter`].
//!
//! `TaskStatus` itself is an immutable value type (`kodit-core`); `Tracker`
//! is the mutable handle workflow handlers hold onto, and `Reporter` is
//! where a tracker's snapshots go — persisted, pushed to a UI, or both.

use kodit_core::error::Result;
use kodit_core::status::{ReportingState, TaskStatus};
use kodit_db::{DbError, DbPool, Value};
use std::sync::{Arc, Mutex};

/// Receives every status transition a [`Tracker`] produces. Implementations
/// may persist, forward to a UI channel, or both; `on_change` is called
/// exactly once per mutation, in the order the mutations happened.
pub trait Reporter: Send + Sync {
    fn on_change(&self, status: &TaskStatus) -> Result<()>;
}

/// A `Reporter` that discards every update. Useful for handlers invoked in
/// tests or one-shot tooling that doesn't care about progress.
#[derive(Debug, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn on_change(&self, _status: &TaskStatus) -> Result<()> {
        Ok(())
    }
}

/// Upserts by status id into `kodit-db`'s `task_statuses` table, so repeated
/// emissions of the same id update the row in place rather than
/// accumulating history.
pub struct DbReporter {
    pool: Arc<DbPool>,
}

impl DbReporter {
    #[must_use]
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

impl Reporter for DbReporter {
    fn on_change(&self, status: &TaskStatus) -> Result<()> {
        self.pool
            .with_conn(|conn| {
                conn.execute_sync(
                    "INSERT INTO task_statuses \
                     (id, trackable_type, trackable_id, operation, parent_id, state, message, \
                      total, current, error, created_at, updated_at) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
                     ON CONFLICT(id) DO UPDATE SET \
                     state = excluded.state, \
                     message = excluded.message, \
                     total = excluded.total, \
                     current = excluded.current, \
                     error = excluded.error, \
                     updated_at = excluded.updated_at",
                    &[
                        Value::Text(status.id.clone()),
                        Value::Text(status.trackable_type.clone()),
                        Value::Text(status.trackable_id.clone()),
                        Value::Text(status.operation.clone()),
                        status.parent_id.clone().map_or(Value::Null, Value::Text),
                        Value::Text(state_str(status.state).to_owned()),
                        Value::Text(status.message.clone()),
                        #[allow(clippy::cast_possible_wrap)]
                        Value::BigInt(status.total as i64),
                        #[allow(clippy::cast_possible_wrap)]
                        Value::BigInt(status.current as i64),
                        status.error.clone().map_or(Value::Null, Value::Text),
                        Value::BigInt(status.created_at),
                        Value::BigInt(status.updated_at),
                    ],
                )
                .map_err(|e| DbError::Sql(e.to_string()))
            })
            .map_err(Into::into)
    }
}

fn state_str(state: ReportingState) -> &'static str {
    match state {
        ReportingState::Started => "started",
        ReportingState::InProgress => "in_progress",
        ReportingState::Completed => "completed",
        ReportingState::Failed => "failed",
        ReportingState::Skipped => "skipped",
    }
}

/// A handle bound to one status id. Every mutator produces a fresh
/// [`TaskStatus`] internally and forwards it to the bound [`Reporter`] —
/// callers never see or construct `TaskStatus` values directly.
pub struct Tracker {
    current: Mutex<TaskStatus>,
    reporter: Arc<dyn Reporter>,
    now: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl Tracker {
    fn emit(&self, next: TaskStatus) -> Result<()> {
        *self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner) = next.clone();
        self.reporter.on_change(&next)
    }

    pub fn set_total(&self, total: u64) -> Result<()> {
        let now = (self.now)();
        let next = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner).with_total(total, now);
        self.emit(next)
    }

    pub fn set_current(&self, current: u64, message: &str) -> Result<()> {
        let now = (self.now)();
        let next = self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .with_current(current, message, now);
        self.emit(next)
    }

    pub fn skip(&self, message: &str) -> Result<()> {
        let now = (self.now)();
        let next = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner).skip(message, now);
        self.emit(next)
    }

    pub fn fail(&self, error: &str) -> Result<()> {
        let now = (self.now)();
        let next = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner).fail(error, now);
        self.emit(next)
    }

    pub fn complete(&self) -> Result<()> {
        let now = (self.now)();
        let next = self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner).complete(now);
        self.emit(next)
    }

    /// The most recently emitted snapshot. Mainly for tests; production
    /// callers that need the current state should watch the `Reporter`.
    #[must_use]
    pub fn snapshot(&self) -> TaskStatus {
        self.current.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone()
    }
}

/// Builds [`Tracker`]s bound to a shared [`Reporter`] and clock.
pub struct TrackerFactory {
    reporter: Arc<dyn Reporter>,
    now: Arc<dyn Fn() -> i64 + Send + Sync>,
}

impl TrackerFactory {
    #[must_use]
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self { reporter, now: Arc::new(now_micros) }
    }

    /// Override the clock. Tests use this for deterministic `updated_at`
    /// sequencing instead of real wall-clock time.
    #[must_use]
    pub fn with_clock(reporter: Arc<dyn Reporter>, now: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self { reporter, now: Arc::new(now) }
    }

    /// Start a new, non-terminal tracker bound to a deterministic status id
    /// derived from `(trackable_type, trackable_id, operation)`, emitting
    /// the initial `Started` snapshot immediately.
    pub fn for_operation(
        &self,
        operation: &str,
        trackable_type: &str,
        trackable_id: &str,
        parent_id: Option<String>,
    ) -> Result<Tracker> {
        let now = (self.now)();
        let status = TaskStatus::started(operation, trackable_type, trackable_id, parent_id, now);
        self.reporter.on_change(&status)?;
        Ok(Tracker { current: Mutex::new(status), reporter: Arc::clone(&self.reporter), now: Arc::clone(&self.now) })
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
    use std::sync::atomic::{AtomicI64, Ordering};

    struct RecordingReporter {
        seen: Mutex<Vec<TaskStatus>>,
    }

    impl RecordingReporter {
        fn new() -> Arc<Self> {
            Arc::new(Self { seen: Mutex::new(Vec::new()) })
        }
    }

    impl Reporter for RecordingReporter {
        fn on_change(&self, status: &TaskStatus) -> Result<()> {
            self.seen.lock().unwrap().push(status.clone());
            Ok(())
        }
    }

    fn clock(start: i64) -> impl Fn() -> i64 + Send + Sync {
        let counter = AtomicI64::new(start);
        move || counter.fetch_add(1, Ordering::Relaxed)
    }

    #[test]
    fn for_operation_emits_started_immediately() {
        let reporter = RecordingReporter::new();
        let factory = TrackerFactory::with_clock(reporter.clone(), clock(0));
        let _tracker = factory.for_operation("commit.scan", "kodit.commit", "1", None).unwrap();
        let seen = reporter.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].state, ReportingState::Started);
    }

    #[test]
    fn each_mutation_emits_exactly_once() {
        let reporter = RecordingReporter::new();
        let factory = TrackerFactory::with_clock(reporter.clone(), clock(0));
        let tracker = factory.for_operation("commit.scan", "kodit.commit", "1", None).unwrap();
        tracker.set_total(10).unwrap();
        tracker.set_current(3, "scanning").unwrap();
        tracker.complete().unwrap();
        assert_eq!(reporter.seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn complete_after_terminal_is_a_no_op_through_the_tracker() {
        let reporter = RecordingReporter::new();
        let factory = TrackerFactory::with_clock(reporter.clone(), clock(0));
        let tracker = factory.for_operation("commit.scan", "kodit.commit", "1", None).unwrap();
        tracker.fail("boom").unwrap();
        let failed_snapshot = tracker.snapshot();
        tracker.complete().unwrap();
        assert_eq!(tracker.snapshot(), failed_snapshot);
    }

    #[test]
    fn set_current_with_empty_message_retains_previous_message() {
        let reporter = RecordingReporter::new();
        let factory = TrackerFactory::with_clock(reporter.clone(), clock(0));
        let tracker = factory.for_operation("commit.scan", "kodit.commit", "1", None).unwrap();
        tracker.set_total(10).unwrap();
        tracker.set_current(3, "scanning files").unwrap();
        tracker.set_current(5, "").unwrap();
        assert_eq!(tracker.snapshot().message, "scanning files");
    }

    #[test]
    fn child_tracker_carries_parent_id() {
        let reporter = RecordingReporter::new();
        let factory = TrackerFactory::with_clock(reporter.clone(), clock(0));
        let parent = factory.for_operation("repo.sync", "kodit.repository", "1", None).unwrap();
        let child = factory
            .for_operation("commit.scan", "kodit.commit", "1", Some(parent.snapshot().id))
            .unwrap();
        assert_eq!(child.snapshot().parent_id.as_deref(), Some(parent.snapshot().id.as_str()));
    }

    #[test]
    fn db_reporter_upserts_by_status_id() {
        let pool = Arc::new(DbPool::open_memory().unwrap());
        let reporter: Arc<dyn Reporter> = Arc::new(DbReporter::new(pool.clone()));
        let factory = TrackerFactory::with_clock(reporter, clock(0));
        let tracker = factory.for_operation("commit.scan", "kodit.commit", "1", None).unwrap();
        tracker.set_total(10).unwrap();
        tracker.set_current(5, "halfway").unwrap();

        let count = pool
            .with_conn(|conn| {
                let rows = conn
                    .query_sync("SELECT COUNT(*) AS n FROM task_statuses", &[])
                    .map_err(|e| DbError::Sql(e.to_string()))?;
                rows.into_iter()
                    .next()
                    .map(|row| row.get_named::<i64>("n").map_err(|e| DbError::Decode(e.to_string())))
                    .transpose()
                    .map(|n| n.unwrap_or(0))
            })
            .unwrap();
        assert_eq!(count, 1, "repeated emissions of the same status id must upsert, not insert");
    }
}
