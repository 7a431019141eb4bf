//! Cooperative cancellation token shared by the worker pool.
//!
//! `kodit-db` is deliberately synchronous (see its module docs), so there is
//! no ambient async runtime whose cancellation a handler could borrow.
//! Instead this mirrors the plain `AtomicBool` shutdown-flag idiom used for
//! every background polling loop in this workspace: a worker's root token is
//! flipped once at shutdown, and every handler invocation carries a cheap
//! clone of it to check (or ignore, for handlers with no natural check
//! point) between suspension points.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A cloneable, cooperative cancellation signal. Cloning shares the same
/// underlying flag; cancelling any clone cancels all of them.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the flag. Idempotent; safe to call from any thread, any number
    /// of times.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Sleep for `total`, waking early and returning as soon as the token is
    /// cancelled. Polls in small increments so shutdown stays responsive
    /// regardless of how long `total` is.
    pub fn sleep_or_cancelled(&self, total: std::time::Duration) {
        const TICK: std::time::Duration = std::time::Duration::from_millis(100);
        let mut remaining = total;
        while remaining > std::time::Duration::ZERO && !self.is_cancelled() {
            let step = remaining.min(TICK);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }
}
