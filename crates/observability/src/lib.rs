//! Process-wide logging setup shared by the binary and the test suites.

/// Subscriber initialization (filters, formatting).
pub mod tracing;

/// Initialize process-wide JSON logging with the `info` default filter.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    self::tracing::init_with_default("info");
}

/// Human-readable logs routed through the test harness's output capture.
pub fn init_for_tests() {
    self::tracing::init_test_writer();
}
