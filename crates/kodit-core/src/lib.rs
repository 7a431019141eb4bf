//! Shared domain types for the kodit workspace.
//!
//! This crate has no dependency on persistence, search backends, or the
//! worker — it is the vocabulary every other `kodit-*` crate is built from:
//! the operation set, priority levels, the task and status value types, the
//! document/embedding model, search filters, and the fusion value types,
//! plus the error taxonomy and environment-driven configuration that every
//! crate shares.

pub mod config;
pub mod document;
pub mod error;
pub mod filters;
pub mod fusion;
pub mod logging;
pub mod operation;
pub mod priority;
pub mod status;
pub mod task;

pub use config::Config;
pub use document::{Document, Embedding, EmbeddingType};
pub use error::{Error, Result};
pub use filters::SearchFilters;
pub use fusion::{FusedHit, FusionResult, RankedItem, RankedList};
pub use operation::Operation;
pub use status::{ReportingState, TaskStatus};
pub use task::{Payload, Task};
