//! Identifier types for remote objects and export runs.
//!
//! Server-side identifiers are opaque strings (usually 32 hex characters).
//! Wrapping them keeps a dataset id from being passed where a project id is
//! expected.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create from any string-like value.
            pub fn new(id: impl Into<String>) -> Self {
                $name(id.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                $name(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                $name(id)
            }
        }
    };
}

opaque_id!(
    /// Server project identifier, sent in the project header of scoped calls.
    ProjectId
);

opaque_id!(
    /// Server dataset (cube) identifier.
    DatasetId
);

opaque_id!(
    /// Server folder identifier.
    FolderId
);

opaque_id!(
    /// Identifier of a server-side upload session.
    UploadSessionId
);

/// Run ID correlating every log line of one export.
///
/// Format: `run-<12 hex chars>`
/// Example: `run-3f9a0c21b7e4`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new run ID.
    pub fn new() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        RunId(format!("run-{}", &uuid[..12]))
    }

    /// Parse an existing run ID string.
    pub fn parse(s: &str) -> Option<Self> {
        let hex = s.strip_prefix("run-")?;
        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        Some(RunId(s.to_string()))
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_id_format() {
        let id = RunId::new();
        assert!(id.0.starts_with("run-"));
        assert_eq!(id.0.len(), 16);
        assert!(RunId::parse(&id.0).is_some());
    }

    #[test]
    fn test_run_id_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn test_run_id_parse_rejects_garbage() {
        assert!(RunId::parse("run-xyz").is_none());
        assert!(RunId::parse("pt-3f9a0c21b7e4").is_none());
        assert!(RunId::parse("run-3f9a0c21b7eZ").is_none());
    }

    #[test]
    fn test_opaque_ids_are_transparent() {
        let id = DatasetId::new("8B2A6DCF11E9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"8B2A6DCF11E9\"");
        assert_eq!(id.to_string(), "8B2A6DCF11E9");
        let back: DatasetId = serde_json::from_str("\"8B2A6DCF11E9\"").unwrap();
        assert_eq!(back, id);
    }
}
