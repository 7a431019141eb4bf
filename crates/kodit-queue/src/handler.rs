//! The handler registry a [`crate::worker::Worker`] dispatches tasks through.

use crate::cancellation::CancellationToken;
use crate::tracker::Tracker;
use kodit_core::error::Result;
use kodit_core::operation::Operation;
use kodit_core::task::Payload;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a handler needs to do its work: the task's own payload, a
/// tracker to report progress through, and a token to check at suspension
/// points so shutdown stays responsive.
pub struct HandlerContext<'a> {
    pub payload: &'a Payload,
    pub tracker: &'a Tracker,
    pub cancellation: &'a CancellationToken,
}

/// One operation's executable behavior. Handlers own all domain logic
/// (cloning a repo, extracting snippets, calling an embedder); this crate
/// only owns dispatch, retry policy (none), and bookkeeping.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &HandlerContext<'_>) -> Result<()>;
}

/// Maps each [`Operation`] to the [`Handler`] that executes it.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Operation, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, operation: Operation, handler: Arc<dyn Handler>) -> &mut Self {
        self.handlers.insert(operation, handler);
        self
    }

    #[must_use]
    pub fn get(&self, operation: Operation) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&operation).cloned()
    }

    /// Check every operation in `required` has a registered handler. Meant
    /// to run once at startup (`Workflow::all()`'s union, per §4.E) so
    /// missing handlers fail fast instead of surfacing per-task at runtime.
    pub fn validate(&self, required: &[Operation]) -> Result<()> {
        let missing: Vec<&str> =
            required.iter().filter(|op| !self.handlers.contains_key(op)).map(|op| op.as_str()).collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(kodit_core::error::Error::MissingHandler(missing.join(", ")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;
    impl Handler for NoopHandler {
        fn handle(&self, _ctx: &HandlerContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn unregistered_operation_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.get(Operation::RepoClone).is_none());
    }

    #[test]
    fn registered_operation_is_retrievable() {
        let mut registry = HandlerRegistry::new();
        registry.register(Operation::RepoClone, Arc::new(NoopHandler));
        assert!(registry.get(Operation::RepoClone).is_some());
    }

    #[test]
    fn validate_fails_fast_on_missing_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register(Operation::RepoClone, Arc::new(NoopHandler));
        let err = registry.validate(&[Operation::RepoClone, Operation::RepoSync]).unwrap_err();
        assert_eq!(err.error_type(), "MISSING_HANDLER");
    }

    #[test]
    fn validate_succeeds_when_everything_required_is_registered() {
        let mut registry = HandlerRegistry::new();
        registry.register(Operation::RepoClone, Arc::new(NoopHandler));
        registry.register(Operation::RepoSync, Arc::new(NoopHandler));
        assert!(registry.validate(&[Operation::RepoClone, Operation::RepoSync]).is_ok());
    }
}
