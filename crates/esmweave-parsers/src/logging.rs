//! Logging and tracing utilities
//!
//! Structured logging on the `tracing` crate. Libraries only emit events;
//! binaries call [`init_default`] or [`init_with_config`] once at startup.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Whether tracing has been initialized
static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize the default tracing subscriber.
///
/// `RUST_LOG` takes precedence over the built-in filter. Repeated calls
/// are ignored.
pub fn init_default() {
    init_with_config(TracingConfig::default());
}

/// Initialize tracing with a custom configuration
pub fn init_with_config(config: TracingConfig) {
    if TRACING_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::Relaxed)
        .is_err()
    {
        return;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_file(config.show_file)
        .with_line_number(config.show_line_number);

    // Another subscriber may already be installed by the host.
    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
}

/// Configuration for tracing initialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Default filter directive (e.g. "info", "warn,esmweave=debug")
    pub default_level: String,
    /// Show the target (module path) in log output
    pub show_target: bool,
    pub show_thread_ids: bool,
    pub show_file: bool,
    pub show_line_number: bool,
}

impl TracingConfig {
    /// Filter for a `-v` count: 0 warn, 1 info, 2 debug, 3+ trace
    pub fn for_verbosity(verbose: u8) -> Self {
        let level = match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        Self {
            default_level: level.to_string(),
            show_file: verbose >= 3,
            show_line_number: verbose >= 3,
            ..Self::default()
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: "warn,esmweave=info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
        }
    }
}

#[macro_export]
macro_rules! log_load_start {
    ($file:expr, $role:expr) => {
        tracing::info!(
            file = %$file,
            role = ?$role,
            "Starting load"
        );
    };
}

#[macro_export]
macro_rules! log_load_complete {
    ($file:expr, $duration:expr, $records:expr) => {
        tracing::info!(
            file = %$file,
            duration_ms = %$duration.as_millis(),
            records = %$records,
            "Load complete"
        );
    };
}

#[macro_export]
macro_rules! log_load_error {
    ($file:expr, $error:expr) => {
        tracing::error!(
            file = %$file,
            error = %$error,
            "Load failed"
        );
    };
}

/// Run `f` inside a `load` span and log how long it took
pub fn instrument_load<T, F>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = tracing::info_span!("load", file = %name);
    let _guard = span.enter();

    let start = std::time::Instant::now();
    let result = f();
    let duration = start.elapsed();

    tracing::debug!(duration_ms = %duration.as_millis(), "Load operation complete");

    result
}

/// Create a span for tracking progress through a large operation
pub fn progress_span(operation: &str, total: u64) -> tracing::Span {
    tracing::info_span!("progress", operation = %operation, total = %total)
}

/// Log progress every 1000 items and at the end
pub fn log_progress(current: u64, total: u64) {
    if total == 0 {
        return;
    }
    if current % 1000 == 0 || current == total {
        let percent = (current as f64 / total as f64 * 100.0) as u32;
        tracing::debug!(current = %current, total = %total, percent = %percent, "Progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracing_config_default() {
        let config = TracingConfig::default();
        assert!(config.default_level.contains("esmweave=info"));
        assert!(config.show_target);
        assert!(!config.show_thread_ids);
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(TracingConfig::for_verbosity(0).default_level, "warn");
        assert_eq!(TracingConfig::for_verbosity(2).default_level, "debug");
        let loud = TracingConfig::for_verbosity(5);
        assert_eq!(loud.default_level, "trace");
        assert!(loud.show_line_number);
    }

    #[test]
    fn test_instrument_load() {
        let result = instrument_load("test.esp", || 42);
        assert_eq!(result, 42);
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init_default();
        init_with_config(TracingConfig::for_verbosity(1));
        log_progress(1000, 2000);
        log_progress(0, 0);
    }

    #[test]
    fn test_config_from_json() {
        let config: TracingConfig = serde_json::from_str(r#"{"default_level": "debug"}"#).unwrap();
        assert_eq!(config.default_level, "debug");
        assert!(config.show_target);
    }
}
