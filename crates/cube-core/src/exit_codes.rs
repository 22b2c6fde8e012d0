//! Exit codes for the cube-export CLI.
//!
//! Exit codes communicate the outcome of an export without requiring output
//! parsing. They are a stable contract for pipeline schedulers.
//!
//! Exit code ranges:
//! - 0-9: Success/operational outcomes
//! - 10-19: User/configuration/data errors (recoverable by user action)
//! - 20-29: Internal, I/O and server errors

use cube_common::{Error, ErrorCategory};

/// Exit codes for cube-export operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    // ========================================================================
    // Success / Operational Outcomes (0-9)
    // ========================================================================
    /// Success: rows written and published
    Clean = 0,

    /// Rows written, but publish did not report completion in time
    PublishUnknown = 2,

    // ========================================================================
    // User / Configuration / Data Errors (10-19)
    // ========================================================================
    /// Invalid arguments or configuration
    ArgsError = 10,

    /// Login failed or session could not be renewed
    AuthError = 11,

    /// More than one dataset has the target name
    AmbiguousDataset = 12,

    /// A row or cell was rejected before upload
    CellValidation = 13,

    // ========================================================================
    // Internal / Remote Errors (20-29)
    // ========================================================================
    /// Internal error (bug - please report)
    InternalError = 20,

    /// I/O, JSON or transport error
    IoError = 21,

    /// The server rejected a request
    RemoteError = 22,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map a library error to the exit code a scheduler sees.
    pub fn from_error(err: &Error) -> Self {
        match err.category() {
            ErrorCategory::Config => ExitCode::ArgsError,
            ErrorCategory::Auth => ExitCode::AuthError,
            ErrorCategory::Dataset => ExitCode::AmbiguousDataset,
            ErrorCategory::Data => ExitCode::CellValidation,
            ErrorCategory::Remote => ExitCode::RemoteError,
            ErrorCategory::Io => ExitCode::IoError,
        }
    }

    /// Check if this exit code indicates success (codes 0 and 2).
    pub fn is_success(self) -> bool {
        matches!(self, ExitCode::Clean | ExitCode::PublishUnknown)
    }

    /// Check if this exit code is a user/configuration/data error (codes 10-19).
    pub fn is_user_error(self) -> bool {
        let code = self as i32;
        (10..20).contains(&code)
    }

    /// Check if this exit code is an internal, I/O or server error (codes 20-29).
    pub fn is_internal_error(self) -> bool {
        let code = self as i32;
        code >= 20
    }

    /// Check if this exit code indicates any error requiring attention.
    pub fn is_error(self) -> bool {
        (self as i32) >= 10
    }

    /// Get the error code name as a string constant (for JSON output).
    pub fn code_name(&self) -> &'static str {
        match self {
            ExitCode::Clean => "OK_CLEAN",
            ExitCode::PublishUnknown => "OK_PUBLISH_UNKNOWN",
            ExitCode::ArgsError => "ERR_ARGS",
            ExitCode::AuthError => "ERR_AUTH",
            ExitCode::AmbiguousDataset => "ERR_AMBIGUOUS_DATASET",
            ExitCode::CellValidation => "ERR_CELL_VALIDATION",
            ExitCode::InternalError => "ERR_INTERNAL",
            ExitCode::IoError => "ERR_IO",
            ExitCode::RemoteError => "ERR_REMOTE",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code_name(), self.as_i32())
    }
}
