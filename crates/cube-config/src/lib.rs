//! cube-export configuration loading and validation.
//!
//! This crate provides:
//! - Typed structs for the exporter and plugin configuration objects
//! - Config file resolution (CLI → env → XDG → system → defaults)
//! - Semantic validation of required settings and limits
//! - Config snapshots for run logs

pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use resolve::{
    load_settings, read_settings, resolve_config, ConfigPaths, ConfigSource, LoadedSettings,
};
pub use settings::{
    CredentialsConfig, ExporterConfig, PluginConfig, ServerConfig, Settings, TargetConfig,
    UploadConfig,
};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_connection, validate_settings, ValidationError, ValidationResult};

/// Schema version for configuration files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
