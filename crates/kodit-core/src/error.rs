//! Error taxonomy shared by every `kodit` crate.
//!
//! Every variant maps to a stable `error_type()` tag and an
//! `is_recoverable()` classification so callers can make policy decisions
//! (retry, surface to a user, abort startup) without matching on message
//! text.

use thiserror::Error;

/// Convenience alias used throughout the `kodit` workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The unified error type for queue, tracker, and search-core operations.
#[derive(Debug, Error)]
pub enum Error {
    // ── Not found ────────────────────────────────────────────────────
    /// A lookup (task, status, snippet) found nothing. Callers that model
    /// "not found" as a value rather than an error should prefer an
    /// `Option`/`(T, bool)` return instead of constructing this variant.
    #[error("not found: {0}")]
    NotFound(String),

    // ── Invalid input ────────────────────────────────────────────────
    /// Configuration or request input that is invalid at construction time
    /// (e.g. `maxChars == 0`, a non-positive priority gap).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // ── Dimension mismatch ───────────────────────────────────────────
    /// The embedding dimension returned by an `Embedder` does not match an
    /// already-initialized vector table. Fatal: the process cannot safely
    /// continue serving that vector store.
    #[error("embedding dimension mismatch: table expects {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension recorded when the vector table was first initialized.
        expected: usize,
        /// Dimension the embedder just reported.
        actual: usize,
    },

    // ── Dispatch ─────────────────────────────────────────────────────
    /// No handler is registered for the operation named by a task.
    #[error("no handler registered for operation {0:?}")]
    MissingHandler(String),

    /// A handler returned an error while executing a task.
    #[error("handler for {operation:?} failed: {message}")]
    HandlerError {
        /// The operation that failed.
        operation: String,
        /// The handler's error message.
        message: String,
    },

    // ── Transient provider errors ────────────────────────────────────
    /// A transient failure from an embedding or LLM provider (timeout,
    /// rate limit, connection reset). Recoverable by retrying the batch.
    #[error("transient provider error: {0}")]
    TransientProvider(String),

    /// The running failure ratio for an `Index` call exceeded its budget.
    #[error("batch failure budget exceeded: {failed}/{total} batches failed (budget {budget_pct}%)")]
    FailureBudgetExceeded {
        /// Number of batches that failed.
        failed: usize,
        /// Total number of batches attempted so far.
        total: usize,
        /// Configured budget, as an integer percentage.
        budget_pct: u8,
    },

    // ── Persistence ──────────────────────────────────────────────────
    /// An error surfaced from the persistence layer (pool, schema,
    /// migration, query execution).
    #[error("database error: {0}")]
    Database(String),

    // ── I/O ──────────────────────────────────────────────────────────
    /// A filesystem or network I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ── Internal ─────────────────────────────────────────────────────
    /// A condition the implementation believes cannot occur in practice.
    /// Distinct from `InvalidInput` because the caller did nothing wrong.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable classification, independent of the
    /// human-readable message. Use this for metrics and log filtering
    /// instead of matching on `Display` output.
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::MissingHandler(_) => "MISSING_HANDLER",
            Self::HandlerError { .. } => "HANDLER_ERROR",
            Self::TransientProvider(_) => "TRANSIENT_PROVIDER",
            Self::FailureBudgetExceeded { .. } => "FAILURE_BUDGET_EXCEEDED",
            Self::Database(_) => "DATABASE",
            Self::Io(_) => "IO",
            Self::Serialization(_) => "SERIALIZATION",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the operation that produced this error could plausibly
    /// succeed if retried unchanged (e.g. a transient provider hiccup),
    /// as opposed to errors that will reproduce deterministically.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::TransientProvider(_) | Self::FailureBudgetExceeded { .. } | Self::Database(_)
        )
    }
}
