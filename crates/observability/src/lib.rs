//! Process-wide tracing setup shared by the binaries.

/// Tracing subscriber configuration (filters, formatting).
pub mod tracing;

/// Initialize structured logging for the process.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init(tracing::DEFAULT_DIRECTIVES);
}
