//! Structured event definitions for logging.
//!
//! Event names double as tracing targets. Every event carries the run id,
//! and the dataset and project once known.

use serde::{Deserialize, Serialize};

use cube_common::{ProjectId, RunId};

/// Log levels for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Phases of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup, configuration and construction.
    Init,
    /// Login, keep-alive and logout.
    Auth,
    /// Project and dataset lookup or creation.
    Resolve,
    /// Upload session and chunk pushes.
    Upload,
    /// Publish and status polling.
    Publish,
    /// Final flush and teardown.
    Close,
    /// Folder and project pickers.
    Browse,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Init => "init",
            Stage::Auth => "auth",
            Stage::Resolve => "resolve",
            Stage::Upload => "upload",
            Stage::Publish => "publish",
            Stage::Close => "close",
            Stage::Browse => "browse",
        };
        write!(f, "{}", s)
    }
}

/// Standard event names used in logging.
pub mod event_names {
    // Run lifecycle
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    // Config/init events
    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_INVALID: &str = "config.invalid";

    // Auth stage
    pub const AUTH_LOGIN: &str = "auth.login";
    pub const AUTH_LOGIN_FAILED: &str = "auth.login_failed";
    pub const AUTH_RENEWED: &str = "auth.renewed";
    pub const AUTH_RENEW_FALLBACK: &str = "auth.renew_fallback";
    pub const AUTH_LOGOUT: &str = "auth.logout";

    // HTTP
    pub const HTTP_ERROR: &str = "http.error";

    // Resolve stage
    pub const PROJECT_RESOLVED: &str = "resolve.project";
    pub const DATASET_FOUND: &str = "resolve.dataset_found";
    pub const DATASET_CREATED: &str = "resolve.dataset_created";
    pub const DATASET_AMBIGUOUS: &str = "resolve.dataset_ambiguous";

    // Export facade
    pub const EXPORT_OPENED: &str = "export.opened";
    pub const EXPORT_FLUSH: &str = "export.flush";
    pub const EXPORT_CLOSED: &str = "export.closed";
    pub const EXPORT_ABORTED: &str = "export.aborted";
    pub const CELL_REJECTED: &str = "export.cell_rejected";

    // Upload stage
    pub const UPLOAD_SESSION_OPENED: &str = "upload.session_opened";
    pub const UPLOAD_CHUNK_SENT: &str = "upload.chunk_sent";
    pub const UPLOAD_FAILED: &str = "upload.failed";

    // Publish stage
    pub const PUBLISH_STARTED: &str = "publish.started";
    pub const PUBLISH_POLL: &str = "publish.poll";
    pub const PUBLISH_COMPLETE: &str = "publish.complete";
    pub const PUBLISH_UNKNOWN: &str = "publish.unknown";

    // Browse
    pub const BROWSE_LISTED: &str = "browse.listed";
}

/// Correlation fields handed to every component at construction.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub dataset: Option<String>,
    pub project_id: Option<String>,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            dataset: None,
            project_id: None,
        }
    }

    /// Context with a freshly generated run id.
    pub fn generate() -> Self {
        Self::new(RunId::new().0)
    }

    pub fn with_dataset(mut self, dataset: impl Into<String>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    pub fn with_project(mut self, project_id: &ProjectId) -> Self {
        self.project_id = Some(project_id.to_string());
        self
    }

    /// Dataset name for log fields, empty until known.
    pub fn dataset_label(&self) -> &str {
        self.dataset.as_deref().unwrap_or("")
    }

    /// Project id for log fields, empty until known.
    pub fn project_label(&self) -> &str {
        self.project_id.as_deref().unwrap_or("")
    }
}
