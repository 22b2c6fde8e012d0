//! CLI end-to-end tests for the cube-export binary.
//!
//! These tests run the real binary with temporary configuration files and
//! check exit codes plus the structured output contract. Server-facing cases
//! run against a loopback server.

mod common;

use assert_cmd::Command;
use common::{login_route, LoopbackServer, Route};
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

const ENV_KEYS: &[&str] = &[
    "CUBE_EXPORT_CONFIG",
    "CUBE_EXPORT_CONFIG_DIR",
    "CUBE_EXPORT_BASE_URL",
    "CUBE_EXPORT_USERNAME",
    "CUBE_EXPORT_PASSWORD",
    "CUBE_LOG",
    "RUST_LOG",
];

/// Get a Command for the cube-export binary with a clean environment.
fn cube_export() -> Command {
    let mut cmd = Command::cargo_bin("cube-export").expect("cube-export binary should exist");
    for key in ENV_KEYS {
        cmd.env_remove(key);
    }
    cmd
}

fn write_config(dir: &TempDir, json: &str) -> PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, json).expect("write config");
    path
}

fn valid_config(dir: &TempDir) -> PathBuf {
    write_config(
        dir,
        r#"{
            "server": {"base_url": "http://127.0.0.1:1/api", "timeout_secs": 2},
            "credentials": {"username": "etl", "password": "hunter2"},
            "target": {"project_name": "Sales", "dataset_name": "orders"},
            "upload": {"buffer_size": 100}
        }"#,
    )
}

// ============================================================================
// Version
// ============================================================================

mod version {
    use super::*;

    #[test]
    fn json_version() {
        cube_export()
            .arg("version")
            .assert()
            .success()
            .stdout(predicate::str::contains("\"name\": \"cube-export\""))
            .stdout(predicate::str::contains("config_schema_version"));
    }

    #[test]
    fn human_version() {
        cube_export()
            .args(["--format", "human", "version"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("cube-export "));
    }

    #[test]
    fn unknown_command_fails() {
        cube_export()
            .arg("nonexistent-command")
            .assert()
            .failure()
            .stderr(predicate::str::contains("error"));
    }
}

// ============================================================================
// Check
// ============================================================================

mod check {
    use super::*;

    #[test]
    fn valid_config_reports_ok_without_password() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);

        cube_export()
            .arg("check")
            .arg("--config")
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains("\"status\": \"ok\""))
            .stdout(predicate::str::contains("\"dataset_name\": \"orders\""))
            .stdout(predicate::str::contains("hunter2").not());
    }

    #[test]
    fn human_check_summary() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);

        cube_export()
            .args(["--format", "human", "check", "--config"])
            .arg(&config)
            .assert()
            .success()
            .stdout(predicate::str::contains("configuration ok"))
            .stdout(predicate::str::contains("Sales / orders"));
    }

    #[test]
    fn missing_password_exits_with_args_error() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            r#"{
                "server": {"base_url": "https://bi.example.com/api"},
                "credentials": {"username": "etl"},
                "target": {"project_name": "Sales", "dataset_name": "orders"}
            }"#,
        );

        cube_export()
            .arg("check")
            .arg("--config")
            .arg(&config)
            .assert()
            .code(10)
            .stdout(predicate::str::contains("\"exit_code\": \"ERR_ARGS\""))
            .stdout(predicate::str::contains("credentials.password"));
    }

    #[test]
    fn password_from_environment_fills_the_gap() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            r#"{
                "server": {"base_url": "https://bi.example.com/api"},
                "credentials": {"username": "etl"},
                "target": {"project_id": "P1", "dataset_name": "orders"}
            }"#,
        );

        cube_export()
            .arg("check")
            .arg("--config")
            .arg(&config)
            .env("CUBE_EXPORT_PASSWORD", "from-env")
            .assert()
            .success()
            .stdout(predicate::str::contains("from-env").not());
    }

    #[test]
    fn missing_config_file_exits_with_args_error() {
        let dir = TempDir::new().unwrap();

        cube_export()
            .arg("check")
            .arg("--config")
            .arg(dir.path().join("absent.json"))
            .assert()
            .code(10);
    }

    #[test]
    fn malformed_config_exits_with_args_error() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, "{not json");

        cube_export()
            .arg("check")
            .arg("--config")
            .arg(&config)
            .assert()
            .code(10)
            .stdout(predicate::str::contains("\"category\": \"config\""));
    }
}

// ============================================================================
// Export and browse argument handling
// ============================================================================

mod export {
    use super::*;

    #[test]
    fn missing_schema_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);

        cube_export()
            .arg("export")
            .arg("--config")
            .arg(&config)
            .arg("--schema")
            .arg(dir.path().join("absent-schema.json"))
            .assert()
            .code(21)
            .stdout(predicate::str::contains("ERR_IO"));
    }

    #[test]
    fn empty_schema_is_args_error() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);
        let schema = dir.path().join("schema.json");
        std::fs::write(&schema, r#"{"columns": []}"#).unwrap();

        cube_export()
            .arg("export")
            .arg("--config")
            .arg(&config)
            .arg("--schema")
            .arg(&schema)
            .assert()
            .code(10)
            .stdout(predicate::str::contains("schema has no columns"));
    }

    #[test]
    fn schema_argument_is_required() {
        cube_export()
            .arg("export")
            .assert()
            .failure()
            .stderr(predicate::str::contains("--schema"));
    }

    #[test]
    fn browse_rejects_mismatched_path() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);

        cube_export()
            .arg("browse")
            .arg("--config")
            .arg(&config)
            .args(["--project", "P1", "--path", r#"{"names":["a"],"ids":[]}"#])
            .assert()
            .code(10);
    }

    fn rejecting_server() -> LoopbackServer {
        LoopbackServer::start(vec![
            login_route("tok-cli"),
            Route::new("GET", "/projects", 400, r#"{"message":"Project list disabled"}"#),
            Route::new("GET", "/auth/logout", 204, ""),
        ])
    }

    fn config_for(dir: &TempDir, base_url: &str) -> PathBuf {
        write_config(
            dir,
            &format!(
                r#"{{
                    "server": {{"base_url": "{}", "timeout_secs": 5}},
                    "credentials": {{"username": "etl", "password": "hunter2"}},
                    "target": {{"project_id": "P1", "dataset_name": "orders"}}
                }}"#,
                base_url
            ),
        )
    }

    #[test]
    fn verbose_flag_logs_the_failing_request() {
        let server = rejecting_server();
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, &server.base_url);
        let url = format!("{}/projects", server.base_url);

        cube_export()
            .args(["-v", "--log-format", "jsonl", "projects", "--config"])
            .arg(&config)
            .assert()
            .code(22)
            .stdout(predicate::str::contains("Project list disabled"))
            .stderr(predicate::str::contains(url.as_str()));
        assert_eq!(server.requests_to("GET", "/auth/logout").len(), 1);
    }

    #[test]
    fn without_verbose_the_request_url_stays_out_of_logs() {
        let server = rejecting_server();
        let dir = TempDir::new().unwrap();
        let config = config_for(&dir, &server.base_url);
        let url = format!("{}/projects", server.base_url);

        cube_export()
            .args(["--log-format", "jsonl", "projects", "--config"])
            .arg(&config)
            .assert()
            .code(22)
            .stderr(predicate::str::contains(url.as_str()).not());
    }

    #[test]
    fn unreachable_server_is_io_error() {
        let dir = TempDir::new().unwrap();
        let config = valid_config(&dir);

        cube_export()
            .arg("projects")
            .arg("--config")
            .arg(&config)
            .assert()
            .code(21)
            .stdout(predicate::str::contains("ERR_IO"));
    }
}
