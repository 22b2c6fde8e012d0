//! cube-export common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Remote object identifiers and run IDs
//! - The column type model (logical types, wire types, roles, cells)
//! - The unified error taxonomy
//! - Output format specifications

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{format_error_human, Error, ErrorCategory, Result, StructuredError, SuggestedAction};
pub use id::{DatasetId, FolderId, ProjectId, RunId, UploadSessionId};
pub use output::OutputFormat;
pub use schema::{Cell, Column, ColumnRole, LogicalType, Schema, WireType};
