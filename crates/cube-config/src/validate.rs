//! Configuration validation errors and semantic validation.

use thiserror::Error;

use crate::settings::{ExporterConfig, PluginConfig, Settings};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Configuration validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::MissingField(_) => 64,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }
}

impl From<ValidationError> for cube_common::Error {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::MissingField(field) => cube_common::Error::MissingSetting { field },
            other => cube_common::Error::Config(other.to_string()),
        }
    }
}

/// Validate the plugin-wide server settings.
pub fn validate_plugin_config(plugin: &PluginConfig) -> ValidationResult<()> {
    let base_url = plugin.server.normalized_base_url();
    if base_url.is_empty() {
        return Err(ValidationError::MissingField("server.base_url".to_string()));
    }
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ValidationError::InvalidValue {
            field: "server.base_url".to_string(),
            message: format!("Must start with http:// or https://, got {}", base_url),
        });
    }
    if plugin.server.timeout_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "server.timeout_secs".to_string(),
            message: "Must be positive".to_string(),
        });
    }
    Ok(())
}

/// Validate credentials, target and upload tuning.
pub fn validate_exporter_config(config: &ExporterConfig) -> ValidationResult<()> {
    if config.credentials.username.is_empty() {
        return Err(ValidationError::MissingField(
            "credentials.username".to_string(),
        ));
    }
    if config.credentials.password.is_empty() {
        return Err(ValidationError::MissingField(
            "credentials.password".to_string(),
        ));
    }

    let target = &config.target;
    let has_project = target
        .project_id
        .as_deref()
        .or(target.project_name.as_deref())
        .is_some_and(|p| !p.trim().is_empty());
    if !has_project {
        return Err(ValidationError::MissingField(
            "target.project_name or target.project_id".to_string(),
        ));
    }
    if target.normalized_dataset_name().is_empty() {
        return Err(ValidationError::MissingField(
            "target.dataset_name".to_string(),
        ));
    }
    if target.table_name.trim().is_empty() {
        return Err(ValidationError::MissingField("target.table_name".to_string()));
    }

    let upload = &config.upload;
    if upload.buffer_size == 0 {
        return Err(ValidationError::InvalidValue {
            field: "upload.buffer_size".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }
    if upload.token_lease_secs == 0 {
        return Err(ValidationError::InvalidValue {
            field: "upload.token_lease_secs".to_string(),
            message: "Must be positive".to_string(),
        });
    }
    if upload.publish_poll_attempts == 0 {
        return Err(ValidationError::InvalidValue {
            field: "upload.publish_poll_attempts".to_string(),
            message: "Must be at least 1".to_string(),
        });
    }

    Ok(())
}

/// Validate what a login needs: server location and credentials.
pub fn validate_connection(settings: &Settings) -> ValidationResult<()> {
    validate_plugin_config(&settings.plugin)?;
    let credentials = &settings.export.credentials;
    if credentials.username.is_empty() {
        return Err(ValidationError::MissingField(
            "credentials.username".to_string(),
        ));
    }
    if credentials.password.is_empty() {
        return Err(ValidationError::MissingField(
            "credentials.password".to_string(),
        ));
    }
    Ok(())
}

/// Validate a complete settings file.
pub fn validate_settings(settings: &Settings) -> ValidationResult<()> {
    if settings.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: settings.schema_version.clone(),
        });
    }
    validate_plugin_config(&settings.plugin)?;
    validate_exporter_config(&settings.export)
}
