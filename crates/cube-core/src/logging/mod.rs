//! Structured logging for cube-export.
//!
//! Provides dual-mode logging:
//! - Human-readable console output for interactive use
//! - Machine-parseable JSONL for pipeline hosts
//!
//! # Usage
//!
//! ```ignore
//! use cube_core::logging::{init_logging, LogConfig, LogContext, Stage, event_names};
//!
//! let config = LogConfig::from_env(None, None);
//! init_logging(&config);
//!
//! let ctx = LogContext::generate().with_dataset("orders");
//! cube_core::log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "Starting export");
//! ```
//!
//! stdout is reserved for command payloads; all log output goes to stderr.
//! Components never reach for a global logger context: each one receives a
//! [`LogContext`] when it is constructed.

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, Stage};
pub use layer::JsonlLayer;

use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the logging subsystem.
///
/// Call once at startup. A second call leaves the first subscriber in place.
pub fn init_logging(config: &LogConfig) {
    // Event names are used as targets, so filter by level rather than module.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let result = match config.format {
        LogFormat::Human => {
            let use_ansi = std::io::stderr().is_terminal();
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_ansi(use_ansi);

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };

    if let Err(e) = result {
        eprintln!("Warning: logging already initialized: {}", e);
    }
}

/// Truncate a long string (e.g. a response body) for logging.
pub fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &s[..end])
}

/// Emit a structured event with the correlation fields of a [`LogContext`].
///
/// Usage:
/// ```ignore
/// log_event!(ctx, INFO, event_names::UPLOAD_CHUNK_SENT, Stage::Upload, "Chunk sent",
///     index = 3u64, rows = 5000u64);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            target: $event,
            run_id = $ctx.run_id.as_str(),
            dataset = $ctx.dataset_label(),
            project_id = $ctx.project_label(),
            stage = %$stage,
            $($key = $val,)*
            message = %$msg
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            target: $event,
            run_id = $ctx.run_id.as_str(),
            dataset = $ctx.dataset_label(),
            project_id = $ctx.project_label(),
            stage = %$stage,
            $($key = $val,)*
            message = %$msg
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            target: $event,
            run_id = $ctx.run_id.as_str(),
            dataset = $ctx.dataset_label(),
            project_id = $ctx.project_label(),
            stage = %$stage,
            $($key = $val,)*
            message = %$msg
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::error!(
            target: $event,
            run_id = $ctx.run_id.as_str(),
            dataset = $ctx.dataset_label(),
            project_id = $ctx.project_label(),
            stage = %$stage,
            $($key = $val,)*
            message = %$msg
        )
    };
}
