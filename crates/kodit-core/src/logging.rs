//! Structured logging setup, shared by the binary and integration tests.

use tracing_subscriber::EnvFilter;

/// Install a global `tracing` subscriber reading its filter from `RUST_LOG`
/// (falling back to `kodit=info,warn`). Safe to call more than once per
/// process (e.g. from multiple test harnesses) — a second call is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kodit=info,warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
