//! Tracing/logging setup shared by the worker binary and tests.

/// Tracing configuration (filters, formatters).
pub mod tracing;

/// Initialize process-wide JSON logging.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize human-readable logging for tests and local runs.
pub fn init_pretty() {
    tracing::init_pretty();
}
