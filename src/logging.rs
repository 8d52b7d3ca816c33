//! Logging setup for the plugin process.
//!
//! All logs go to **stderr**. Stdout carries the handshake line and nothing
//! else.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: a full [`EnvFilter`] directive, e.g. `tfepatch=debug`.
//! - `TF_LOG`: used when `RUST_LOG` is unset. The host's level names
//!   (`TRACE`, `DEBUG`, `INFO`, `WARN`, `ERROR`, `OFF`) map onto the
//!   matching tracing level.
//!
//! ```bash
//! RUST_LOG=tfepatch=debug terraform-provider-tfepatch
//! TF_LOG=DEBUG terraform apply
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Host log level variable consulted when `RUST_LOG` is unset.
pub const TF_LOG_ENV: &str = "TF_LOG";

/// Map a `TF_LOG` value onto a tracing level directive.
///
/// `JSON` is the host's trace-level JSON mode and maps to `trace`.
/// Unrecognized values return `None`.
pub fn level_from_tf_log(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_uppercase().as_str() {
        "TRACE" | "JSON" => Some("trace"),
        "DEBUG" => Some("debug"),
        "INFO" => Some("info"),
        "WARN" => Some("warn"),
        "ERROR" => Some("error"),
        "OFF" => Some("off"),
        _ => None,
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let level = std::env::var(TF_LOG_ENV)
        .ok()
        .as_deref()
        .and_then(level_from_tf_log)
        .unwrap_or(default_level);
    EnvFilter::new(level)
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the global subscriber at `info` unless the environment says otherwise.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging() {
    init_logging_with_default("info");
}

/// Like [`init_logging`] with a different fallback level.
///
/// # Panics
///
/// Panics if a global subscriber has already been set.
pub fn init_logging_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(stderr_layer())
        .init();
}

/// Try to install the global subscriber. Returns `false` if one is already set.
pub fn try_init_logging() -> bool {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
