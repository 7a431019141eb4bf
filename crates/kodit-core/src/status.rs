//! Immutable tracker status snapshots.

use serde::{Deserialize, Serialize};

/// Reporting state of a `TaskStatus`. `Completed`, `Failed`, and `Skipped`
/// are terminal: once reached, no further transition is observable (see
/// `TaskStatus::complete`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportingState {
    Started,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl ReportingState {
    /// Terminal states never transition further.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Build the deterministic synthetic status id from
/// `trackable_type | trackable_id | operation`, hyphen-joined with empty
/// parts elided. The operation component carries a `kodit.` namespace
/// prefix (distinct from `Operation::as_str`, which stays bare for the
/// queue's `operation` column and dedup key) so status ids never collide
/// with some other service's trackables sharing this table. Rebuilding
/// from the same inputs is byte-identical, which lets the DB `Reporter`
/// upsert by id across process restarts.
#[must_use]
pub fn status_id(trackable_type: &str, trackable_id: &str, operation: &str) -> String {
    let namespaced_operation =
        if operation.is_empty() { String::new() } else { format!("kodit.{operation}") };
    [trackable_type, trackable_id, namespaced_operation.as_str()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// An immutable value-type snapshot of a tracker's state. Every mutator on
/// `Tracker` (see `kodit_queue::tracker`) produces a *new* `TaskStatus`
/// rather than mutating one in place — this type has no interior
/// mutability and no methods that mutate `self`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Deterministic id: `status_id(trackable_type, trackable_id, operation)`.
    pub id: String,
    pub state: ReportingState,
    pub operation: String,
    pub message: String,
    pub created_at: i64,
    pub updated_at: i64,
    /// `0` means "unknown" — no percent-complete should be derived from it.
    pub total: u64,
    pub current: u64,
    pub error: Option<String>,
    /// Weak, logical reference to a parent status. Resolved lazily by
    /// whoever reconstructs the tree (e.g. a UI); never chased during
    /// mutation.
    pub parent_id: Option<String>,
    pub trackable_id: String,
    pub trackable_type: String,
}

impl TaskStatus {
    /// Start a new, non-terminal status for the given operation/trackable.
    #[must_use]
    pub fn started(
        operation: &str,
        trackable_type: &str,
        trackable_id: &str,
        parent_id: Option<String>,
        now: i64,
    ) -> Self {
        Self {
            id: status_id(trackable_type, trackable_id, operation),
            state: ReportingState::Started,
            operation: operation.to_owned(),
            message: String::new(),
            created_at: now,
            updated_at: now,
            total: 0,
            current: 0,
            error: None,
            parent_id,
            trackable_id: trackable_id.to_owned(),
            trackable_type: trackable_type.to_owned(),
        }
    }

    /// Returns a new status with `total` set, unless this status is already
    /// terminal (in which case it is returned unchanged).
    #[must_use]
    pub fn with_total(&self, total: u64, now: i64) -> Self {
        if self.state.is_terminal() {
            return self.clone();
        }
        Self {
            total,
            updated_at: now,
            state: ReportingState::InProgress,
            ..self.clone()
        }
    }

    /// Returns a new status with `current` advanced and `message` updated.
    /// An empty `message` retains the previous message rather than
    /// clearing it. Overshoot (`current > total`) is clamped to `total`
    /// when `total > 0`, so percent-complete derived from the pair never
    /// exceeds 100%.
    #[must_use]
    pub fn with_current(&self, current: u64, message: &str, now: i64) -> Self {
        if self.state.is_terminal() {
            return self.clone();
        }
        let clamped = if self.total > 0 {
            current.min(self.total)
        } else {
            current
        };
        let message = if message.is_empty() {
            self.message.clone()
        } else {
            message.to_owned()
        };
        Self {
            current: clamped,
            message,
            updated_at: now,
            state: ReportingState::InProgress,
            ..self.clone()
        }
    }

    /// Transition to `Skipped`. A no-op if already terminal.
    #[must_use]
    pub fn skip(&self, message: &str, now: i64) -> Self {
        self.terminal_transition(ReportingState::Skipped, message, None, now)
    }

    /// Transition to `Failed`, recording `error`. A no-op if already
    /// terminal.
    #[must_use]
    pub fn fail(&self, error: &str, now: i64) -> Self {
        self.terminal_transition(ReportingState::Failed, "", Some(error.to_owned()), now)
    }

    /// Transition to `Completed`. Per §3/§8: `Complete()` applied to an
    /// already-terminal status is a no-op — it returns an identical clone,
    /// not a new `updated_at`.
    #[must_use]
    pub fn complete(&self, now: i64) -> Self {
        self.terminal_transition(ReportingState::Completed, "", None, now)
    }

    fn terminal_transition(
        &self,
        state: ReportingState,
        message: &str,
        error: Option<String>,
        now: i64,
    ) -> Self {
        if self.state.is_terminal() {
            return self.clone();
        }
        let current = if self.total > 0 { self.total } else { self.current };
        Self {
            state,
            message: if message.is_empty() {
                self.message.clone()
            } else {
                message.to_owned()
            },
            error,
            current,
            updated_at: now,
            ..self.clone()
        }
    }

    /// `true` once this status is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
