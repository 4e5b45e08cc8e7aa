//! Tracing and logging setup shared by every process that opens the store.

/// Initialize process-wide tracing with JSON output.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(tracing::LogFormat::from_env());
}

/// Initialize with an explicit output format.
pub fn init_with_format(format: tracing::LogFormat) {
    tracing::init(format);
}

/// Route logs through the test harness's captured output.
pub fn init_for_tests() {
    tracing::init_test();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use self::tracing::LogFormat;
