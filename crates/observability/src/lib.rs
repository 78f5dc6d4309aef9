//! Process-wide tracing/logging setup.

pub mod tracing;

pub use self::tracing::{LogFormat, TracingConfig};

/// Initialize process-wide tracing from the environment (`RUST_LOG`, `LOG_FORMAT`).
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init(TracingConfig::from_env());
}
