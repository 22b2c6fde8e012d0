//! cube-export core library
//!
//! This library pushes tabular rows into a BI server's dataset (cube)
//! storage over its REST API:
//! - Authenticated HTTP session with token lease and keep-alive
//! - Schema to attribute/metric mapping and row encoding
//! - Dataset lookup-or-create and the chunked upload-session protocol
//! - The `open`/`write_row`/`close` exporter driven by a pipeline host
//! - Folder and project browsing for configuration pickers
//!
//! The binary entry point is in `main.rs`.

pub mod auth;
pub mod catalog;
pub mod encode;
pub mod exit_codes;
pub mod exporter;
pub mod http;
pub mod input;
pub mod logging;
pub mod mapping;
pub mod resolver;
pub mod upload;

pub use exporter::{ExportSummary, Exporter, ExporterState};
pub use upload::{PublishOutcome, UploadSession, UploadState};

// Re-export test utilities for integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
