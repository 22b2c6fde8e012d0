//! Configuration snapshots for run logs.
//!
//! A snapshot records which configuration an export ran with, without any
//! secret, so two runs can be compared by hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::ConfigPaths;
use crate::settings::Settings;

/// A frozen, credential-free snapshot of configuration state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Hostname where snapshot was taken.
    #[serde(default)]
    pub hostname: Option<String>,

    /// Schema version of the configuration.
    pub schema_version: String,

    /// Path the config was loaded from.
    #[serde(default)]
    pub config_path: Option<String>,

    /// Source of the configuration.
    pub config_source: String,

    /// SHA-256 of the raw config file content.
    #[serde(default)]
    pub config_hash: Option<String>,

    /// Key configuration values for quick reference.
    pub summary: ConfigSummary,
}

/// Summary of key configuration values. Never includes the password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub base_url: String,
    pub username: String,
    pub project: Option<String>,
    pub dataset_name: String,
    pub folder_id: Option<String>,
    pub table_name: String,
    pub buffer_size: usize,
    pub publish_poll_attempts: u32,
    pub verbose: bool,
}

impl ConfigSnapshot {
    pub fn new(settings: &Settings, paths: &ConfigPaths, raw_json: Option<&str>) -> Self {
        let hostname = hostname::get()
            .ok()
            .map(|h| h.to_string_lossy().to_string());
        let target = &settings.export.target;

        ConfigSnapshot {
            timestamp: Utc::now(),
            hostname,
            schema_version: settings.schema_version.clone(),
            config_path: paths.config.as_ref().map(|p| p.display().to_string()),
            config_source: paths.source.to_string(),
            config_hash: raw_json.map(hash_content),
            summary: ConfigSummary {
                base_url: settings.plugin.server.normalized_base_url(),
                username: settings.export.credentials.username.clone(),
                project: target.project_id.clone().or_else(|| target.project_name.clone()),
                dataset_name: target.normalized_dataset_name(),
                folder_id: target.folder_id.clone(),
                table_name: target.normalized_table_name().to_string(),
                buffer_size: settings.export.upload.buffer_size,
                publish_poll_attempts: settings.export.upload.publish_poll_attempts,
                verbose: settings.plugin.server.verbose,
            },
        }
    }
}

/// SHA-256 hex digest of a string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}
