//! Dedup-persistent priority queue, prescribed workflows, worker pool, and
//! hierarchical progress tracker.
//!
//! This crate owns task scheduling and dispatch; it knows nothing about
//! what any particular operation actually does — that lives behind the
//! [`Handler`] trait, implemented elsewhere and registered into a
//! [`HandlerRegistry`] before the [`WorkerPool`] starts.

pub mod cancellation;
pub mod handler;
pub mod queue;
pub mod tracker;
pub mod worker;
pub mod workflow;

pub use cancellation::CancellationToken;
pub use handler::{Handler, HandlerContext, HandlerRegistry};
pub use queue::{Queue, SqliteQueue};
pub use tracker::{DbReporter, NullReporter, Reporter, Tracker, TrackerFactory};
pub use worker::{WorkerPool, WorkerPoolConfig};
pub use workflow::{all_operations, Profile, Workflow};
