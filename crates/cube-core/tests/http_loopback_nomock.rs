//! No-mock HTTP tests: the real `ureq` transport against a loopback server.
//!
//! Covers:
//! - Login body, token header and cookie replay
//! - Project header and query parameters on the wire
//! - Error statuses turned into `Error::Remote` with the server message
//! - Connection failures surfacing as transport errors
//! - Logout clearing the session
//! - Verbose mode logging the failing request

mod common;

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{login_route, LoopbackServer, Route};
use cube_common::{Error, ProjectId};
use cube_config::{CredentialsConfig, PluginConfig, ServerConfig};
use cube_core::auth::{AUTH_TOKEN_HEADER, PROJECT_HEADER};
use cube_core::http::HttpSession;
use cube_core::logging::{JsonlLayer, LogContext};
use tracing_subscriber::layer::SubscriberExt;

fn plugin(base_url: &str, verbose: bool) -> PluginConfig {
    PluginConfig {
        server: ServerConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
            verbose,
            ..ServerConfig::default()
        },
    }
}

fn session(base_url: &str) -> HttpSession {
    session_with(base_url, false)
}

fn session_with(base_url: &str, verbose: bool) -> HttpSession {
    HttpSession::connect(
        &plugin(base_url, verbose),
        CredentialsConfig::new("etl", "secret"),
        Duration::from_secs(3000),
        LogContext::new("run-loopback"),
    )
}

#[test]
fn login_then_token_and_cookies_on_every_call() {
    let server = LoopbackServer::start(vec![
        login_route("tok-loop"),
        Route::new("GET", "/projects", 200, r#"[{"id":"P1","name":"Sales"}]"#),
    ]);
    let mut http = session(&server.base_url);

    let projects: serde_json::Value = http.get("/projects", None, &[]).unwrap().json().unwrap();
    assert_eq!(projects[0]["id"], "P1");

    let logins = server.requests_to("POST", "/auth/login");
    assert_eq!(logins.len(), 1);
    let body = logins[0].json();
    assert_eq!(body["username"], "etl");
    assert_eq!(body["password"], "secret");
    assert_eq!(body["loginMode"], 1);
    assert!(logins[0]
        .header("Content-Type")
        .unwrap()
        .starts_with("application/json"));

    let call = &server.requests_to("GET", "/projects")[0];
    assert_eq!(call.header(AUTH_TOKEN_HEADER), Some("tok-loop"));
    assert_eq!(
        call.header("Cookie"),
        Some("JSESSIONID=loop-session;iSession=loop-i")
    );
}

#[test]
fn project_header_and_query_reach_the_server() {
    let server = LoopbackServer::start(vec![
        login_route("tok-loop"),
        Route::new("GET", "/searches/results", 200, r#"{"totalItems":0,"result":[]}"#),
    ]);
    let mut http = session(&server.base_url);
    let project = ProjectId::new("P1");

    http.get(
        "/searches/results",
        Some(&project),
        &[("name", "orders"), ("pattern", "EXACT")],
    )
    .unwrap();

    let call = &server.requests_to("GET", "/searches/results")[0];
    assert_eq!(call.header(PROJECT_HEADER), Some("P1"));
    assert!(call.query.contains("name=orders"), "query: {}", call.query);
    assert!(call.query.contains("pattern=EXACT"), "query: {}", call.query);
}

#[test]
fn error_status_carries_server_message() {
    let server = LoopbackServer::start(vec![
        login_route("tok-loop"),
        Route::new(
            "POST",
            "/datasets",
            400,
            r#"{"code":"ERR001","message":"Invalid definition"}"#,
        ),
        Route::new("GET", "/broken", 502, "<html>Bad Gateway</html>"),
    ]);
    let mut http = session(&server.base_url);

    match http.post("/datasets", None, serde_json::json!({})) {
        Err(Error::Remote { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "Error 400. Invalid definition");
        }
        other => panic!("expected remote error, got {:?}", other),
    }

    match http.get("/broken", None, &[]) {
        Err(Error::Remote { status, message }) => {
            assert_eq!(status, 502);
            assert_eq!(message, "Error 502");
        }
        other => panic!("expected remote error, got {:?}", other),
    }
}

#[test]
fn rejected_login_is_auth_error() {
    let server = LoopbackServer::start(vec![Route::new(
        "POST",
        "/auth/login",
        401,
        r#"{"message":"Bad credentials"}"#,
    )]);
    let mut http = session(&server.base_url);

    let err = http.get("/projects", None, &[]).unwrap_err();
    assert!(matches!(err, Error::Auth(ref m) if m == "Error 401. Bad credentials"));
    assert!(server.requests_to("GET", "/projects").is_empty());
}

#[test]
fn unreachable_server_is_transport_error() {
    let base_url = {
        let server = LoopbackServer::start(Vec::new());
        server.base_url.clone()
    };
    let mut http = session(&base_url);

    let err = http.get("/projects", None, &[]).unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "got {:?}", err);
}

#[test]
fn logout_sends_token_and_forgets_it() {
    let server = LoopbackServer::start(vec![
        login_route("tok-loop"),
        Route::new("GET", "/projects", 200, "[]"),
        Route::new("GET", "/auth/logout", 204, ""),
    ]);
    let mut http = session(&server.base_url);

    http.get("/projects", None, &[]).unwrap();
    assert_eq!(http.logout(), Some(204));
    assert!(http.authenticator().token().is_none());
    assert_eq!(http.logout(), None);

    let logouts = server.requests_to("GET", "/auth/logout");
    assert_eq!(logouts.len(), 1);
    assert_eq!(logouts[0].header(AUTH_TOKEN_HEADER), Some("tok-loop"));
}

struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Run `f` with a JSONL subscriber and return the `http.error` lines.
fn http_errors_logged(f: impl FnOnce()) -> Vec<serde_json::Value> {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let subscriber =
        tracing_subscriber::registry().with(JsonlLayer::new(SharedBuf(buffer.clone())));
    tracing::subscriber::with_default(subscriber, f);

    let output = buffer.lock().unwrap();
    String::from_utf8_lossy(&output)
        .lines()
        .filter_map(|line| serde_json::from_str::<serde_json::Value>(line).ok())
        .filter(|line| line["event"] == "http.error")
        .collect()
}

fn rejected_create(server: &LoopbackServer, verbose: bool) -> Vec<serde_json::Value> {
    let base_url = server.base_url.clone();
    http_errors_logged(move || {
        let mut http = session_with(&base_url, verbose);
        let result = http.post("/datasets", None, serde_json::json!({"name": "orders"}));
        assert!(matches!(result, Err(Error::Remote { status: 400, .. })));
    })
}

#[test]
fn verbose_mode_logs_the_failing_request() {
    let server = LoopbackServer::start(vec![
        login_route("tok-loop"),
        Route::new("POST", "/datasets", 400, r#"{"message":"Invalid definition"}"#),
    ]);

    let lines = rejected_create(&server, true);
    assert_eq!(lines.len(), 1);
    let fields = &lines[0]["fields"];
    assert_eq!(fields["method"], "POST");
    assert_eq!(fields["url"], format!("{}/datasets", server.base_url));
    assert!(fields["request_body"].as_str().unwrap().contains("orders"));
    assert!(fields["response_body"]
        .as_str()
        .unwrap()
        .contains("Invalid definition"));
    assert_eq!(lines[0]["message"], "Error 400. Invalid definition");
}

#[test]
fn quiet_mode_logs_only_method_and_status() {
    let server = LoopbackServer::start(vec![
        login_route("tok-loop"),
        Route::new("POST", "/datasets", 400, r#"{"message":"Invalid definition"}"#),
    ]);

    let lines = rejected_create(&server, false);
    assert_eq!(lines.len(), 1);
    let fields = &lines[0]["fields"];
    assert_eq!(fields["status"], 400);
    assert!(fields.get("url").is_none());
    assert!(fields.get("request_body").is_none());
}
