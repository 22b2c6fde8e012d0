//! Error types for cube-export.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification for error grouping
//! - Recoverability hints for pipeline hosts
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Ambiguous Dataset
//!   Reason: found 2 datasets named 'sales' in project B7CA92F0
//!   Fix: Rename or delete the duplicate datasets on the server, then rerun the export.
//! ```
//!
//! # Machine-Facing Output
//!
//! ```json
//! {
//!   "code": 30,
//!   "category": "dataset",
//!   "message": "found 2 datasets named 'sales' in project B7CA92F0",
//!   "recoverable": false,
//!   "suggested_action": "manual_intervention",
//!   "context": { "dataset_name": "sales", "matches": 2 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for cube-export operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or invalid settings, lifecycle misuse.
    Config,
    /// Login and session renewal failures.
    Auth,
    /// Remote dataset resolution problems.
    Dataset,
    /// Non-success responses and upload protocol failures.
    Remote,
    /// Row content rejected before upload.
    Data,
    /// Local I/O, serialization and network transport errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Auth => write!(f, "auth"),
            ErrorCategory::Dataset => write!(f, "dataset"),
            ErrorCategory::Remote => write!(f, "remote"),
            ErrorCategory::Data => write!(f, "data"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for a pipeline host reacting to an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Restart the whole export (possibly with backoff).
    Retry,
    /// Fix the configuration and rerun.
    FixConfig,
    /// Check the credentials.
    CheckCredentials,
    /// Fix the offending input rows.
    FixData,
    /// Check the remote state later.
    CheckLater,
    /// Manual intervention on the server required.
    ManualIntervention,
    /// Abort the export.
    Abort,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::FixConfig => write!(f, "fix_config"),
            SuggestedAction::CheckCredentials => write!(f, "check_credentials"),
            SuggestedAction::FixData => write!(f, "fix_data"),
            SuggestedAction::CheckLater => write!(f, "check_later"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
            SuggestedAction::Abort => write!(f, "abort"),
        }
    }
}

/// Unified error type for cube-export.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("missing required setting: {field}")]
    MissingSetting { field: String },

    #[error("project '{name}' not found on the server")]
    ProjectNotFound { name: String },

    #[error("cannot {operation} while exporter is {state}")]
    InvalidState { operation: String, state: String },

    // Authentication errors (20-29)
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("session renewal failed: {0}")]
    SessionRenewal(String),

    // Dataset errors (30-39)
    #[error("found {matches} datasets named '{name}' in project {project_id}")]
    AmbiguousDataset {
        name: String,
        project_id: String,
        matches: usize,
    },

    // Remote errors (40-49)
    #[error("{message}")]
    Remote { status: u16, message: String },

    #[error("upload session {session_id} cannot {operation} in state {state}")]
    UploadState {
        session_id: String,
        operation: String,
        state: String,
    },

    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("publish status unknown after {attempts} attempts")]
    PublishTimeout { attempts: u32 },

    // Data errors (50-59)
    #[error("invalid cell in column '{column}' at row {row}: {reason}")]
    CellValidation {
        column: String,
        row: u64,
        reason: String,
    },

    #[error("row {row} has {actual} values, schema has {expected} columns")]
    RowShape {
        row: u64,
        expected: usize,
        actual: usize,
    },

    #[error("input line {line} is not a JSON row: {message}")]
    RowParse { line: u64, message: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Authentication errors
    /// - 30-39: Dataset errors
    /// - 40-49: Remote errors
    /// - 50-59: Data errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::MissingSetting { .. } => 11,
            Error::ProjectNotFound { .. } => 12,
            Error::InvalidState { .. } => 13,
            Error::Auth(_) => 20,
            Error::SessionRenewal(_) => 21,
            Error::AmbiguousDataset { .. } => 30,
            Error::Remote { .. } => 40,
            Error::UploadState { .. } => 41,
            Error::PublishFailed(_) => 42,
            Error::PublishTimeout { .. } => 43,
            Error::CellValidation { .. } => 50,
            Error::RowShape { .. } => 51,
            Error::RowParse { .. } => 52,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
            Error::Transport(_) => 62,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::MissingSetting { .. }
            | Error::ProjectNotFound { .. }
            | Error::InvalidState { .. } => ErrorCategory::Config,

            Error::Auth(_) | Error::SessionRenewal(_) => ErrorCategory::Auth,

            Error::AmbiguousDataset { .. } => ErrorCategory::Dataset,

            Error::Remote { .. }
            | Error::UploadState { .. }
            | Error::PublishFailed(_)
            | Error::PublishTimeout { .. } => ErrorCategory::Remote,

            Error::CellValidation { .. } | Error::RowShape { .. } | Error::RowParse { .. } => {
                ErrorCategory::Data
            }

            Error::Io(_) | Error::Json(_) | Error::Transport(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether restarting the export could succeed without changes.
    ///
    /// Nothing here is retried automatically; this is a hint for the host.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Config(_) => false,
            Error::MissingSetting { .. } => false,
            Error::ProjectNotFound { .. } => false,
            Error::InvalidState { .. } => false,

            Error::Auth(_) => false,
            Error::SessionRenewal(_) => true, // server may have recycled sessions

            Error::AmbiguousDataset { .. } => false,

            // 5xx is usually transient, 4xx is not
            Error::Remote { status, .. } => *status >= 500,
            Error::UploadState { .. } => false,
            Error::PublishFailed(_) => true,
            Error::PublishTimeout { .. } => true,

            Error::CellValidation { .. } => false,
            Error::RowShape { .. } => false,
            Error::RowParse { .. } => false,

            Error::Io(_) => true,
            Error::Json(_) => false,
            Error::Transport(_) => true,
        }
    }

    /// Returns the suggested action for the pipeline host.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) | Error::MissingSetting { .. } | Error::ProjectNotFound { .. } => {
                SuggestedAction::FixConfig
            }
            Error::InvalidState { .. } => SuggestedAction::Abort,

            Error::Auth(_) => SuggestedAction::CheckCredentials,
            Error::SessionRenewal(_) => SuggestedAction::Retry,

            Error::AmbiguousDataset { .. } => SuggestedAction::ManualIntervention,

            Error::Remote { status, .. } if *status >= 500 => SuggestedAction::Retry,
            Error::Remote { .. } => SuggestedAction::ManualIntervention,
            Error::UploadState { .. } => SuggestedAction::Abort,
            Error::PublishFailed(_) => SuggestedAction::Retry,
            Error::PublishTimeout { .. } => SuggestedAction::CheckLater,

            Error::CellValidation { .. } | Error::RowShape { .. } | Error::RowParse { .. } => {
                SuggestedAction::FixData
            }

            Error::Io(_) | Error::Transport(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => "Run 'cube-export check' to validate the configuration file.",
            Error::MissingSetting { .. } => {
                "Fill in the base URL, username and password (config file or CUBE_EXPORT_* variables)."
            }
            Error::ProjectNotFound { .. } => {
                "List available projects with 'cube-export projects' and fix target.project_name."
            }
            Error::InvalidState { .. } => {
                "The exporter must be driven as open, write_row..., close. Create a new exporter."
            }

            Error::Auth(_) => "Check the username, password and base URL, then rerun the export.",
            Error::SessionRenewal(_) => {
                "The server dropped the session mid-upload. Rerun the export from the beginning."
            }

            Error::AmbiguousDataset { .. } => {
                "Rename or delete the duplicate datasets on the server, then rerun the export."
            }

            Error::Remote { .. } => {
                "Inspect the server message. Rerun with --verbose to log the failing request."
            }
            Error::UploadState { .. } => {
                "The upload session was used out of order. Restart the export with a new session."
            }
            Error::PublishFailed(_) => {
                "The server rejected the staged data. Check the dataset in the server UI and rerun."
            }
            Error::PublishTimeout { .. } => {
                "Publishing may still be running. Check the dataset status on the server later."
            }

            Error::CellValidation { .. } => {
                "Boolean columns must not contain empty cells. Fill or filter them upstream."
            }
            Error::RowShape { .. } => "Every row must provide one value per schema column.",
            Error::RowParse { .. } => {
                "Each input line must be a JSON array or object. Check the line with 'jq .'."
            }

            Error::Io(_) => "Check file paths and permissions. Retry the operation.",
            Error::Json(_) => "Invalid JSON input. Check syntax with 'jq .' before retrying.",
            Error::Transport(_) => {
                "Check network connectivity to the server and the configured timeout."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::MissingSetting { .. } => "Missing Setting",
            Error::ProjectNotFound { .. } => "Project Not Found",
            Error::InvalidState { .. } => "Invalid Exporter State",

            Error::Auth(_) => "Authentication Failed",
            Error::SessionRenewal(_) => "Session Renewal Failed",

            Error::AmbiguousDataset { .. } => "Ambiguous Dataset",

            Error::Remote { .. } => "Server Error",
            Error::UploadState { .. } => "Upload Session Misuse",
            Error::PublishFailed(_) => "Publish Failed",
            Error::PublishTimeout { .. } => "Publish Status Unknown",

            Error::CellValidation { .. } => "Invalid Cell",
            Error::RowShape { .. } => "Malformed Row",
            Error::RowParse { .. } => "Unreadable Row",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Error",
            Error::Transport(_) => "Network Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether restarting could succeed.
    pub recoverable: bool,

    /// Suggested action for the host.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., status, column).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::MissingSetting { field } => {
                context.insert("field".to_string(), serde_json::json!(field));
            }
            Error::ProjectNotFound { name } => {
                context.insert("project_name".to_string(), serde_json::json!(name));
            }
            Error::AmbiguousDataset {
                name,
                project_id,
                matches,
            } => {
                context.insert("dataset_name".to_string(), serde_json::json!(name));
                context.insert("project_id".to_string(), serde_json::json!(project_id));
                context.insert("matches".to_string(), serde_json::json!(matches));
            }
            Error::Remote { status, .. } => {
                context.insert("status".to_string(), serde_json::json!(status));
            }
            Error::UploadState {
                session_id, state, ..
            } => {
                context.insert("session_id".to_string(), serde_json::json!(session_id));
                context.insert("state".to_string(), serde_json::json!(state));
            }
            Error::PublishTimeout { attempts } => {
                context.insert("attempts".to_string(), serde_json::json!(attempts));
            }
            Error::CellValidation { column, row, .. } => {
                context.insert("column".to_string(), serde_json::json!(column));
                context.insert("row".to_string(), serde_json::json!(row));
            }
            Error::RowShape { row, .. } => {
                context.insert("row".to_string(), serde_json::json!(row));
            }
            Error::RowParse { line, .. } => {
                context.insert("line".to_string(), serde_json::json!(line));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        red = red,
        cyan = cyan,
        reset = reset,
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(Error::Config("test".into()).code(), 10);
        assert_eq!(Error::Auth("bad password".into()).code(), 20);
        assert_eq!(
            Error::AmbiguousDataset {
                name: "sales".into(),
                project_id: "P1".into(),
                matches: 2
            }
            .code(),
            30
        );
        assert_eq!(Error::PublishTimeout { attempts: 5 }.code(), 43);
    }

    #[test]
    fn test_error_category() {
        assert_eq!(
            Error::MissingSetting {
                field: "username".into()
            }
            .category(),
            ErrorCategory::Config
        );
        assert_eq!(
            Error::Remote {
                status: 400,
                message: "Error 400".into()
            }
            .category(),
            ErrorCategory::Remote
        );
        assert_eq!(
            Error::CellValidation {
                column: "flag".into(),
                row: 3,
                reason: "null".into()
            }
            .category(),
            ErrorCategory::Data
        );
        assert_eq!(Error::Transport("reset".into()).category(), ErrorCategory::Io);
    }

    #[test]
    fn test_row_parse_names_the_line() {
        let err = Error::RowParse {
            line: 4,
            message: "expected value at line 1 column 2".into(),
        };
        assert_eq!(err.code(), 52);
        assert_eq!(err.category(), ErrorCategory::Data);
        assert!(err.to_string().starts_with("input line 4 is not a JSON row"));

        let structured = StructuredError::from(&err);
        assert_eq!(structured.context["line"], 4);
        assert_eq!(structured.suggested_action, SuggestedAction::FixData);
    }

    #[test]
    fn test_remote_recoverability_follows_status() {
        let server_side = Error::Remote {
            status: 503,
            message: "Error 503".into(),
        };
        let client_side = Error::Remote {
            status: 404,
            message: "Error 404".into(),
        };
        assert!(server_side.is_recoverable());
        assert_eq!(server_side.suggested_action(), SuggestedAction::Retry);
        assert!(!client_side.is_recoverable());
        assert_eq!(
            client_side.suggested_action(),
            SuggestedAction::ManualIntervention
        );
    }

    #[test]
    fn test_ambiguous_dataset_never_recoverable() {
        let err = Error::AmbiguousDataset {
            name: "sales".into(),
            project_id: "P1".into(),
            matches: 3,
        };
        assert!(!err.is_recoverable());
        assert_eq!(err.suggested_action(), SuggestedAction::ManualIntervention);
        assert_eq!(
            err.to_string(),
            "found 3 datasets named 'sales' in project P1"
        );
    }

    #[test]
    fn test_structured_error_from_error() {
        let err = Error::CellValidation {
            column: "flag".into(),
            row: 17,
            reason: "boolean cell is empty".into(),
        };
        let structured = StructuredError::from(&err);

        assert_eq!(structured.code, 50);
        assert_eq!(structured.category, ErrorCategory::Data);
        assert!(!structured.recoverable);
        assert_eq!(structured.suggested_action, SuggestedAction::FixData);
        assert_eq!(structured.context.get("row"), Some(&serde_json::json!(17)));
        assert_eq!(
            structured.context.get("column"),
            Some(&serde_json::json!("flag"))
        );
    }

    #[test]
    fn test_structured_error_json() {
        let err = Error::PublishTimeout { attempts: 5 };
        let json = StructuredError::from(&err).to_json();

        assert!(json.contains(r#""code":43"#));
        assert!(json.contains(r#""category":"remote""#));
        assert!(json.contains(r#""recoverable":true"#));
        assert!(json.contains(r#""suggested_action":"check_later""#));
    }

    #[test]
    fn test_format_error_human() {
        let err = Error::Auth("Error 401. Login failure".into());
        let formatted = format_error_human(&err, false);

        assert!(formatted.contains("Authentication Failed"));
        assert!(formatted.contains("authentication failed: Error 401. Login failure"));
        assert!(formatted.contains("Fix:"));
    }

    #[test]
    fn test_error_category_display() {
        assert_eq!(ErrorCategory::Dataset.to_string(), "dataset");
        assert_eq!(ErrorCategory::Auth.to_string(), "auth");
    }

    #[test]
    fn test_suggested_action_display() {
        assert_eq!(SuggestedAction::FixData.to_string(), "fix_data");
        assert_eq!(SuggestedAction::CheckLater.to_string(), "check_later");
    }
}
