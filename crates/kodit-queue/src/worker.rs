//! The worker pool: a fixed set of OS threads, each a cooperative poll loop
//! over the queue.
//!
//! Grounded directly in this workspace's existing background-loop idiom
//! (`mcp-agent-mail-server`'s `cleanup.rs` and `tui_poller.rs`): a named
//! `std::thread::Builder` thread, a shared `AtomicBool`-backed cancellation
//! flag (here, [`CancellationToken`]), and a sleep loop that checks the flag
//! in small increments so shutdown stays responsive regardless of the
//! configured poll period.

use crate::cancellation::CancellationToken;
use crate::handler::{HandlerContext, HandlerRegistry};
use crate::queue::Queue;
use crate::tracker::TrackerFactory;
use kodit_core::operation::Operation;
use kodit_core::task::Task;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Worker pool tuning. `worker_count` mirrors `Config::worker_count`;
/// `poll_interval` mirrors `Config::worker_poll_interval` (both
/// `kodit-core`).
#[derive(Debug, Clone, Copy)]
pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self { worker_count: 2, poll_interval: Duration::from_secs(1) }
    }
}

/// A running set of worker threads. Dropping this without calling
/// [`WorkerPool::shutdown`] leaks the threads (they keep polling until the
/// process exits) — always shut down explicitly.
pub struct WorkerPool {
    cancellation: CancellationToken,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.worker_count` worker threads, each polling `queue` at
    /// `config.poll_interval` and dispatching through `registry`.
    pub fn spawn(
        queue: Arc<dyn Queue>,
        registry: Arc<HandlerRegistry>,
        tracker_factory: Arc<TrackerFactory>,
        config: WorkerPoolConfig,
    ) -> Self {
        let cancellation = CancellationToken::new();
        let worker_count = config.worker_count.max(1);
        let threads = (0..worker_count)
            .map(|index| {
                let queue = Arc::clone(&queue);
                let registry = Arc::clone(&registry);
                let tracker_factory = Arc::clone(&tracker_factory);
                let cancellation = cancellation.clone();
                std::thread::Builder::new()
                    .name(format!("kodit-worker-{index}"))
                    .spawn(move || worker_loop(&queue, &registry, &tracker_factory, &cancellation, config))
                    .expect("failed to spawn kodit worker thread")
            })
            .collect();

        info!(worker_count, poll_interval_ms = config.poll_interval.as_millis(), "worker pool started");
        Self { cancellation, threads }
    }

    /// Cancel every worker's root token and block until in-flight handlers
    /// return and all threads exit.
    pub fn shutdown(self) {
        self.cancellation.cancel();
        for thread in self.threads {
            let _ = thread.join();
        }
        info!("worker pool shut down");
    }
}

fn worker_loop(
    queue: &Arc<dyn Queue>,
    registry: &HandlerRegistry,
    tracker_factory: &TrackerFactory,
    cancellation: &CancellationToken,
    config: WorkerPoolConfig,
) {
    while !cancellation.is_cancelled() {
        match queue.dequeue() {
            Ok(Some(task)) => run_task(registry, tracker_factory, cancellation, task),
            Ok(None) => cancellation.sleep_or_cancelled(config.poll_interval),
            Err(e) => {
                warn!(error = %e, "dequeue failed; backing off before retrying");
                cancellation.sleep_or_cancelled(config.poll_interval);
            }
        }
    }
}

/// The per-task life cycle (§4.E "Worker"): look up a handler, invoke it,
/// and report the outcome. The task row itself is already gone — `dequeue`
/// is the atomic pop — so there is nothing left to "delete" here; this
/// function's only remaining job is tracking and logging the outcome.
fn run_task(
    registry: &HandlerRegistry,
    tracker_factory: &TrackerFactory,
    cancellation: &CancellationToken,
    task: Task,
) {
    let Some(handler) = registry.get(task.operation) else {
        error!(operation = %task.operation, dedup_key = %task.dedup_key, "no handler registered; dropping task");
        return;
    };

    let (trackable_type, trackable_id) = trackable_for(task.operation, &task.payload);
    let tracker = match tracker_factory.for_operation(task.operation.as_str(), &trackable_type, &trackable_id, None)
    {
        Ok(tracker) => tracker,
        Err(e) => {
            error!(error = %e, operation = %task.operation, "failed to start tracker; dropping task");
            return;
        }
    };

    let ctx = HandlerContext { payload: &task.payload, tracker: &tracker, cancellation };
    match handler.handle(&ctx) {
        Ok(()) => {
            if let Err(e) = tracker.complete() {
                warn!(error = %e, operation = %task.operation, "failed to report completion");
            }
        }
        Err(e) => {
            warn!(error = %e, operation = %task.operation, dedup_key = %task.dedup_key, "handler failed");
            if let Err(report_err) = tracker.fail(&e.to_string()) {
                warn!(error = %report_err, operation = %task.operation, "failed to report failure");
            }
        }
    }
}

/// Derive `(trackable_type, trackable_id)` for a task from its operation's
/// scope and its payload's `repository_id` / `commit_sha` field. Repository-
/// scoped operations (`repo.*`) are keyed by `repository_id`; commit-scoped
/// operations (`commit.*`) by `commit_sha`. A missing field yields an empty
/// trackable id, which `status_id` elides rather than treating as an error —
/// workflows are expected to always populate the field their operations need.
fn trackable_for(operation: Operation, payload: &kodit_core::task::Payload) -> (String, String) {
    if operation.is_repository_scoped() {
        let id = payload
            .get("repository_id")
            .map(|v| if let Some(s) = v.as_str() { s.to_owned() } else { v.to_string() })
            .unwrap_or_default();
        ("kodit.repository".to_owned(), id)
    } else {
        let id = payload
            .get("commit_sha")
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .unwrap_or_default();
        ("kodit.commit".to_owned(), id)
    }
}
