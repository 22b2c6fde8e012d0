//! Configuration resolution and path discovery.
//!
//! Resolution order: CLI argument → environment variables → XDG path →
//! system path → built-in defaults.

use std::path::{Path, PathBuf};

use crate::settings::Settings;
use crate::snapshot::ConfigSnapshot;
use crate::validate::{validate_settings, ValidationResult};

/// Discovered configuration file path.
#[derive(Debug, Clone, Default)]
pub struct ConfigPaths {
    /// Path to config.json (or None if not found).
    pub config: Option<PathBuf>,

    /// Source of the config (for diagnostics).
    pub source: ConfigSource,
}

/// Where a configuration file was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Explicitly provided via CLI argument.
    CliArgument,

    /// Set via environment variable.
    Environment,

    /// Found in XDG config directory.
    XdgConfig,

    /// Found in /etc/cube-export/.
    SystemConfig,

    /// Using built-in defaults plus environment overrides.
    #[default]
    BuiltinDefault,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CliArgument => write!(f, "CLI argument"),
            ConfigSource::Environment => write!(f, "environment variable"),
            ConfigSource::XdgConfig => write!(f, "XDG config"),
            ConfigSource::SystemConfig => write!(f, "system config"),
            ConfigSource::BuiltinDefault => write!(f, "builtin default"),
        }
    }
}

/// Environment variable names.
pub const ENV_CONFIG_PATH: &str = "CUBE_EXPORT_CONFIG";
pub const ENV_CONFIG_DIR: &str = "CUBE_EXPORT_CONFIG_DIR";

/// Standard config file name.
const CONFIG_FILENAME: &str = "config.json";

/// Application name for XDG directories.
const APP_NAME: &str = "cube-export";

/// Resolve the configuration path using the standard resolution order.
///
/// 1. Explicit CLI path (if it exists)
/// 2. `CUBE_EXPORT_CONFIG` (direct path)
/// 3. `CUBE_EXPORT_CONFIG_DIR` + config.json
/// 4. XDG config directory (~/.config/cube-export/)
/// 5. System config (/etc/cube-export/)
/// 6. Built-in defaults (None)
pub fn resolve_config(cli_path: Option<&Path>) -> ConfigPaths {
    let mut paths = ConfigPaths::default();

    if let Some(path) = cli_path {
        if path.exists() {
            paths.config = Some(path.to_path_buf());
            paths.source = ConfigSource::CliArgument;
            return paths;
        }
    }

    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(env_path);
        if path.exists() {
            paths.config = Some(path);
            paths.source = ConfigSource::Environment;
            return paths;
        }
    }

    if let Ok(config_dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = PathBuf::from(config_dir).join(CONFIG_FILENAME);
        if path.exists() {
            paths.config = Some(path);
            paths.source = ConfigSource::Environment;
            return paths;
        }
    }

    if let Some(xdg_dir) = xdg_config_dir() {
        let path = xdg_dir.join(CONFIG_FILENAME);
        if path.exists() {
            paths.config = Some(path);
            paths.source = ConfigSource::XdgConfig;
            return paths;
        }
    }

    let system_path = system_config_dir().join(CONFIG_FILENAME);
    if system_path.exists() {
        paths.config = Some(system_path);
        paths.source = ConfigSource::SystemConfig;
        return paths;
    }

    paths.source = ConfigSource::BuiltinDefault;
    paths
}

/// Get the XDG config directory for cube-export.
pub fn xdg_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Get the system config directory.
pub fn system_config_dir() -> PathBuf {
    PathBuf::from("/etc").join(APP_NAME)
}

/// Settings together with where they came from.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub paths: ConfigPaths,
    pub snapshot: ConfigSnapshot,
}

/// Resolve, read, overlay environment values and validate.
///
/// A CLI path that does not exist is an error rather than a silent fallback.
pub fn load_settings(cli_path: Option<&Path>) -> ValidationResult<LoadedSettings> {
    let loaded = read_settings(cli_path)?;
    validate_settings(&loaded.settings)?;
    Ok(loaded)
}

/// Like [`load_settings`] but without semantic validation, for commands
/// that need only part of the settings.
pub fn read_settings(cli_path: Option<&Path>) -> ValidationResult<LoadedSettings> {
    if let Some(path) = cli_path {
        if !path.exists() {
            return Err(crate::ValidationError::IoError(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    }

    let paths = resolve_config(cli_path);
    let (mut settings, raw) = match &paths.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                crate::ValidationError::IoError(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                ))
            })?;
            (Settings::parse_json(&raw)?, Some(raw))
        }
        None => (Settings::default(), None),
    };

    settings.apply_env_overrides();

    let snapshot = ConfigSnapshot::new(&settings, &paths, raw.as_deref());
    Ok(LoadedSettings {
        settings,
        paths,
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_source_display() {
        assert_eq!(format!("{}", ConfigSource::CliArgument), "CLI argument");
        assert_eq!(
            format!("{}", ConfigSource::Environment),
            "environment variable"
        );
        assert_eq!(format!("{}", ConfigSource::XdgConfig), "XDG config");
        assert_eq!(format!("{}", ConfigSource::SystemConfig), "system config");
        assert_eq!(
            format!("{}", ConfigSource::BuiltinDefault),
            "builtin default"
        );
    }

    #[test]
    fn test_cli_path_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.json");
        std::fs::write(&path, "{}").unwrap();

        let paths = resolve_config(Some(&path));
        assert_eq!(paths.config.as_deref(), Some(path.as_path()));
        assert_eq!(paths.source, ConfigSource::CliArgument);
    }

    #[test]
    fn test_missing_cli_path_is_error() {
        let err = load_settings(Some(Path::new("/nonexistent/cube-export.json"))).unwrap_err();
        assert!(matches!(err, crate::ValidationError::IoError(_)));
    }

    #[test]
    fn test_system_config_dir() {
        assert_eq!(system_config_dir(), PathBuf::from("/etc/cube-export"));
    }

    #[test]
    fn test_xdg_config_dir() {
        if let Some(path) = xdg_config_dir() {
            assert!(path.ends_with(APP_NAME));
        }
    }
}
