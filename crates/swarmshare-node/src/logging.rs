//! Tracing subscriber configuration for swarmshare nodes.
//!
//! Log levels follow these conventions:
//! - ERROR: Unrecoverable failures
//! - WARN: Recoverable errors, protocol violations from peers, storage failures
//! - INFO: Lifecycle events (download requested/completed/cancelled, file shared)
//! - DEBUG: State changes (availability episodes, timeouts, read retries)
//! - TRACE: Per-chunk scheduling decisions and chunk state transitions

use tracing_subscriber::EnvFilter;

use crate::config::LoggingSection;

fn filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Initialize the tracing subscriber.
///
/// Log level can be controlled via the `RUST_LOG` environment variable and
/// falls back to `default_level` if not set.
pub fn init(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize the tracing subscriber with JSON output.
pub fn init_json(default_level: &str) {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter(default_level))
        .init();
}

/// Initialize from the `[logging]` section, using JSON output when
/// `RUST_LOG_FORMAT=json`.
pub fn init_from_config(logging: &LoggingSection) {
    if std::env::var("RUST_LOG_FORMAT").is_ok_and(|format| format == "json") {
        init_json(&logging.level);
    } else {
        init(&logging.level);
    }
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter("debug"))
        .with_test_writer()
        .try_init();
}
