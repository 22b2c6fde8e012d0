//! Typed configuration for one export.
//!
//! The host hands the exporter two objects: the per-export configuration
//! (credentials, target dataset, upload tuning) and the plugin-wide
//! configuration (server location). On disk both live in one JSON file:
//!
//! ```json
//! {
//!   "schema_version": "1.0.0",
//!   "server": { "base_url": "https://bi.example.com/api", "timeout_secs": 60 },
//!   "credentials": { "username": "etl", "password": "..." },
//!   "target": { "project_name": "Sales", "dataset_name": "orders" },
//!   "upload": { "buffer_size": 5000 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::validate::{ValidationError, ValidationResult};

/// Environment variable names for secrets and server location.
pub const ENV_BASE_URL: &str = "CUBE_EXPORT_BASE_URL";
pub const ENV_USERNAME: &str = "CUBE_EXPORT_USERNAME";
pub const ENV_PASSWORD: &str = "CUBE_EXPORT_PASSWORD";

/// Table name used inside every dataset created by the exporter.
pub const DEFAULT_TABLE_NAME: &str = "dss_data";

/// Server location and transport settings (the plugin-wide object).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// REST API root, e.g. `https://bi.example.com/api`.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Log request URL and body of failing calls.
    pub verbose: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            base_url: String::new(),
            timeout_secs: 60,
            verbose: false,
        }
    }
}

impl ServerConfig {
    /// Base URL without trailing slashes.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim().trim_end_matches('/').to_string()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    pub server: ServerConfig,
}

/// Login credentials. `Debug` never prints the password.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

impl CredentialsConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        CredentialsConfig {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Password rendered as `#` per character, for diagnostics.
    pub fn masked_password(&self) -> String {
        "#".repeat(self.password.chars().count())
    }
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &self.masked_password())
            .finish()
    }
}

/// Which dataset to write and where it lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Project looked up by exact name when `project_id` is not set.
    pub project_name: Option<String>,
    pub project_id: Option<String>,
    pub dataset_name: String,
    /// Restrict dataset lookup and creation to this folder.
    pub folder_id: Option<String>,
    pub table_name: String,
    /// Managed suffix appended to the dataset name, at most once.
    pub name_suffix: Option<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        TargetConfig {
            project_name: None,
            project_id: None,
            dataset_name: String::new(),
            folder_id: None,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            name_suffix: None,
        }
    }
}

impl TargetConfig {
    /// Dataset name as searched and created on the server.
    ///
    /// The managed suffix is removed wherever it already appears and appended
    /// once, so `orders` and `orders (suffix)` name the same dataset.
    pub fn normalized_dataset_name(&self) -> String {
        let name = self.dataset_name.trim();
        match self.name_suffix.as_deref().filter(|s| !s.is_empty()) {
            Some(suffix) => format!("{}{}", name.replace(suffix, ""), suffix),
            None => name.to_string(),
        }
    }

    /// Table name as sent in create, upload and formula bodies.
    pub fn normalized_table_name(&self) -> &str {
        self.table_name.trim()
    }
}

/// Buffering, session lease and publish polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Rows buffered before a chunk is pushed.
    pub buffer_size: usize,
    /// How long a token is trusted before a keep-alive.
    pub token_lease_secs: u64,
    pub publish_poll_attempts: u32,
    pub publish_poll_interval_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            buffer_size: 5000,
            token_lease_secs: 50 * 60,
            publish_poll_attempts: 5,
            publish_poll_interval_ms: 2000,
        }
    }
}

impl UploadConfig {
    pub fn token_lease(&self) -> Duration {
        Duration::from_secs(self.token_lease_secs)
    }

    pub fn publish_poll_interval(&self) -> Duration {
        Duration::from_millis(self.publish_poll_interval_ms)
    }
}

/// Per-export configuration object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterConfig {
    pub credentials: CredentialsConfig,
    pub target: TargetConfig,
    pub upload: UploadConfig,
}

/// Both configuration objects as stored in one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(flatten)]
    pub plugin: PluginConfig,
    #[serde(flatten)]
    pub export: ExporterConfig,
}

fn default_schema_version() -> String {
    crate::CONFIG_SCHEMA_VERSION.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            schema_version: default_schema_version(),
            plugin: PluginConfig::default(),
            export: ExporterConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from a JSON file.
    pub fn from_file(path: &std::path::Path) -> ValidationResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;

        Self::parse_json(&content)
    }

    /// Parse settings from a JSON string.
    pub fn parse_json(json: &str) -> ValidationResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| ValidationError::ParseError(format!("Invalid JSON: {}", e)))
    }

    /// Overlay `CUBE_EXPORT_*` values from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Overlay values from an arbitrary lookup; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(url) = get(ENV_BASE_URL) {
            self.plugin.server.base_url = url;
        }
        if let Some(user) = get(ENV_USERNAME) {
            self.export.credentials.username = user;
        }
        if let Some(password) = get(ENV_PASSWORD) {
            self.export.credentials.password = password;
        }
    }
}
