//! Priority levels for queued tasks.
//!
//! The gaps between levels (1,000 apart) are sized so that a workflow's
//! internal priority offsets — at most `10 * len(workflow)` per
//! `EnqueueOperations` call (§4.E) — can never push a task from one level
//! into an adjacent one, even for implausibly long workflows.

/// Background work with no user waiting on it (e.g. periodic re-scans).
pub const BACKGROUND: i64 = 1_000;
/// The default priority for ordinary, non-interactive work.
pub const NORMAL: i64 = 2_000;
/// Work enqueued in direct response to a user action.
pub const USER_INITIATED: i64 = 5_000;
/// Work that must preempt everything else (e.g. a failed health check retry
/// explicitly requested by an operator).
pub const CRITICAL: i64 = 10_000;

/// A named priority level. Stored tasks use the raw `i64` (see
/// `EnqueueOperations`'s per-step offsets), but handlers and callers that
/// just want "normal" or "critical" priority should use this enum instead of
/// spelling out magic numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Background,
    Normal,
    UserInitiated,
    Critical,
}

impl Priority {
    /// The raw integer priority this level maps to.
    #[must_use]
    pub const fn value(self) -> i64 {
        match self {
            Self::Background => BACKGROUND,
            Self::Normal => NORMAL,
            Self::UserInitiated => USER_INITIATED,
            Self::Critical => CRITICAL,
        }
    }
}

impl From<Priority> for i64 {
    fn from(p: Priority) -> Self {
        p.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_strictly_increasing() {
        assert!(BACKGROUND < NORMAL);
        assert!(NORMAL < USER_INITIATED);
        assert!(USER_INITIATED < CRITICAL);
    }

    #[test]
    fn level_gap_absorbs_any_realistic_workflow_offset() {
        // EnqueueOperations offsets are `10 * len`; even a 99-step workflow
        // (absurdly long) offsets by 990, still under the 1,000 gap.
        let max_realistic_workflow_len = 99;
        let max_offset = 10 * max_realistic_workflow_len;
        assert!(max_offset < NORMAL - BACKGROUND);
    }

    #[test]
    fn priority_enum_matches_constants() {
        assert_eq!(Priority::Background.value(), BACKGROUND);
        assert_eq!(Priority::Normal.value(), NORMAL);
        assert_eq!(Priority::UserInitiated.value(), USER_INITIATED);
        assert_eq!(Priority::Critical.value(), CRITICAL);
    }

    #[test]
    fn priority_ordering_matches_value_ordering() {
        assert!(Priority::Background < Priority::Normal);
        assert!(Priority::Normal < Priority::UserInitiated);
        assert!(Priority::UserInitiated < Priority::Critical);
    }
}
