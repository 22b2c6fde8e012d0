//! No-mock configuration resolution + loading tests.
//!
//! Covers:
//! - Resolution order (CLI > env path > env dir > XDG)
//! - Environment overrides layered over file values
//! - Validation failures surfacing from `load_settings`

use cube_config::resolve::{ENV_CONFIG_DIR, ENV_CONFIG_PATH};
use cube_config::settings::{ENV_BASE_URL, ENV_PASSWORD, ENV_USERNAME};
use cube_config::{load_settings, resolve_config, ConfigSource, ValidationError};
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, OnceLock};
use tempfile::TempDir;

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const ALL_KEYS: &[&str] = &[
    ENV_CONFIG_PATH,
    ENV_CONFIG_DIR,
    ENV_BASE_URL,
    ENV_USERNAME,
    ENV_PASSWORD,
    "XDG_CONFIG_HOME",
];

struct EnvGuard {
    keys: Vec<String>,
    saved: Vec<Option<String>>,
}

impl EnvGuard {
    fn new(keys: &[&str]) -> Self {
        let mut saved = Vec::with_capacity(keys.len());
        for key in keys {
            saved.push(env::var(key).ok());
        }
        Self {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            saved,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (idx, key) in self.keys.iter().enumerate() {
            match self.saved.get(idx).and_then(|v| v.as_ref()) {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }
}

fn with_env_lock<T>(f: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK
        .get_or_init(|| Mutex::new(()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    f()
}

fn clean_env(xdg_home: &Path) -> EnvGuard {
    let guard = EnvGuard::new(ALL_KEYS);
    for key in ALL_KEYS {
        env::remove_var(key);
    }
    env::set_var("XDG_CONFIG_HOME", xdg_home);
    guard
}

const VALID_CONFIG: &str = r#"{
    "schema_version": "1.0.0",
    "server": {"base_url": "https://bi.example.com/api"},
    "credentials": {"username": "file-user", "password": "file-secret"},
    "target": {"project_name": "Sales", "dataset_name": "orders"},
    "upload": {"buffer_size": 250}
}"#;

fn write_config(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    fs::create_dir_all(dir).expect("create config dir");
    let path = dir.join(name);
    fs::write(&path, body).expect("write config");
    path
}

#[test]
fn cli_path_takes_precedence_over_env() {
    with_env_lock(|| {
        let tmp = TempDir::new().expect("tempdir");
        let _guard = clean_env(&tmp.path().join("xdg"));

        let cli = write_config(&tmp.path().join("cli"), "config.json", VALID_CONFIG);
        let env_path = write_config(&tmp.path().join("env"), "config.json", VALID_CONFIG);
        env::set_var(ENV_CONFIG_PATH, &env_path);

        let paths = resolve_config(Some(&cli));
        assert_eq!(paths.source, ConfigSource::CliArgument);
        assert_eq!(paths.config.as_deref(), Some(cli.as_path()));
    });
}

#[test]
fn env_path_beats_env_dir() {
    with_env_lock(|| {
        let tmp = TempDir::new().expect("tempdir");
        let _guard = clean_env(&tmp.path().join("xdg"));

        let direct = write_config(&tmp.path().join("direct"), "custom.json", VALID_CONFIG);
        let dir = tmp.path().join("dir");
        write_config(&dir, "config.json", VALID_CONFIG);
        env::set_var(ENV_CONFIG_PATH, &direct);
        env::set_var(ENV_CONFIG_DIR, &dir);

        let paths = resolve_config(None);
        assert_eq!(paths.source, ConfigSource::Environment);
        assert_eq!(paths.config.as_deref(), Some(direct.as_path()));

        env::remove_var(ENV_CONFIG_PATH);
        let paths = resolve_config(None);
        assert_eq!(paths.source, ConfigSource::Environment);
        assert_eq!(paths.config, Some(dir.join("config.json")));
    });
}

#[test]
fn xdg_config_is_found() {
    with_env_lock(|| {
        let tmp = TempDir::new().expect("tempdir");
        let xdg = tmp.path().join("xdg");
        let _guard = clean_env(&xdg);

        let expected = write_config(&xdg.join("cube-export"), "config.json", VALID_CONFIG);

        let paths = resolve_config(None);
        assert_eq!(paths.source, ConfigSource::XdgConfig);
        assert_eq!(paths.config, Some(expected));
    });
}

#[test]
fn load_applies_env_overrides_and_snapshot_hides_secret() {
    with_env_lock(|| {
        let tmp = TempDir::new().expect("tempdir");
        let _guard = clean_env(&tmp.path().join("xdg"));

        let path = write_config(tmp.path(), "config.json", VALID_CONFIG);
        env::set_var(ENV_USERNAME, "env-user");
        env::set_var(ENV_PASSWORD, "env-secret");

        let loaded = load_settings(Some(&path)).expect("load settings");
        let export = &loaded.settings.export;
        assert_eq!(export.credentials.username, "env-user");
        assert_eq!(export.credentials.password, "env-secret");
        assert_eq!(export.upload.buffer_size, 250);
        assert_eq!(loaded.paths.source, ConfigSource::CliArgument);

        let snapshot = serde_json::to_string(&loaded.snapshot).expect("serialize snapshot");
        assert!(!snapshot.contains("env-secret"));
        assert!(!snapshot.contains("file-secret"));
        assert_eq!(loaded.snapshot.summary.username, "env-user");
        assert!(loaded.snapshot.config_hash.is_some());
    });
}

#[test]
fn load_without_file_uses_env_only() {
    with_env_lock(|| {
        let tmp = TempDir::new().expect("tempdir");
        let _guard = clean_env(&tmp.path().join("xdg"));

        env::set_var(ENV_BASE_URL, "https://env.example.com/api");
        env::set_var(ENV_USERNAME, "env-user");
        env::set_var(ENV_PASSWORD, "env-secret");

        // Target is still required, so defaults plus env are not enough.
        let err = load_settings(None).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField(_)));
    });
}

#[test]
fn load_reports_invalid_file() {
    with_env_lock(|| {
        let tmp = TempDir::new().expect("tempdir");
        let _guard = clean_env(&tmp.path().join("xdg"));

        let bad = write_config(tmp.path(), "bad.json", "{\"server\": ");
        assert!(matches!(
            load_settings(Some(&bad)),
            Err(ValidationError::ParseError(_))
        ));

        let no_url = write_config(
            tmp.path(),
            "no_url.json",
            r#"{"credentials": {"username": "u", "password": "p"},
                "target": {"project_id": "P1", "dataset_name": "d"}}"#,
        );
        assert!(matches!(
            load_settings(Some(&no_url)),
            Err(ValidationError::MissingField(ref f)) if f == "server.base_url"
        ));
    });
}
