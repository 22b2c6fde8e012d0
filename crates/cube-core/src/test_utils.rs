//! Test utilities for cube-core.
//!
//! This module provides test infrastructure including:
//! - A scripted in-memory [`MockTransport`] standing in for the REST server
//! - Configuration builders pointing at the mock
//! - Payload decoding for asserting on uploaded chunks
//! - Common assertions

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use cube_common::Result;
use cube_config::{CredentialsConfig, ExporterConfig, PluginConfig, ServerConfig, TargetConfig, UploadConfig};

use crate::auth::AUTH_TOKEN_HEADER;
use crate::http::{HttpTransport, Method, Request, Response};

// ============================================================================
// Macros (must be defined first for use in this module)
// ============================================================================

/// Assert that a Result is Ok and return the value.
#[macro_export]
macro_rules! assert_ok {
    ($expr:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($expr:expr, $msg:expr) => {
        match $expr {
            Ok(val) => val,
            Err(e) => panic!("{}: {:?}", $msg, e),
        }
    };
}

/// Assert that a Result is Err and return the error.
#[macro_export]
macro_rules! assert_err {
    ($expr:expr) => {
        match $expr {
            Ok(val) => panic!("Expected Err, got Ok: {:?}", val),
            Err(e) => e,
        }
    };
    ($expr:expr, $msg:expr) => {
        match $expr {
            Ok(val) => panic!("{}: got Ok({:?})", $msg, val),
            Err(e) => e,
        }
    };
}

// ============================================================================
// Mock transport
// ============================================================================

#[derive(Default)]
struct Route {
    once: VecDeque<Response>,
    sticky: Option<Response>,
}

#[derive(Default)]
struct MockState {
    routes: HashMap<(Method, String), Route>,
    requests: Vec<Request>,
}

/// Scripted stand-in for the REST server.
///
/// Routes are keyed by method and path (the URL minus [`Self::BASE_URL`],
/// query excluded). A route answers with its queued one-shot responses first,
/// then with its standing response. Unscripted routes answer 404.
///
/// Clones share state, so a test keeps one handle while the session owns
/// another.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub const BASE_URL: &'static str = "http://mock.local/api";

    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the requests from the others.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Standing JSON response for a route. `Value::Null` sends an empty body.
    pub fn on(&self, method: Method, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.respond(method, path, json_response(status, body))
    }

    /// Standing response for a route, replacing any previous one.
    pub fn respond(&self, method: Method, path: &str, response: Response) -> &Self {
        self.lock()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .sticky = Some(response);
        self
    }

    /// One-shot JSON response, served before the standing one.
    pub fn once(&self, method: Method, path: &str, status: u16, body: serde_json::Value) -> &Self {
        self.respond_once(method, path, json_response(status, body))
    }

    pub fn respond_once(&self, method: Method, path: &str, response: Response) -> &Self {
        self.lock()
            .routes
            .entry((method, path.to_string()))
            .or_default()
            .once
            .push_back(response);
        self
    }

    /// Successful login handing out `token` and two session cookies.
    pub fn with_login(&self, token: &str) -> &Self {
        self.respond(
            Method::Post,
            "/auth/login",
            Response::new(204, "")
                .with_header(AUTH_TOKEN_HEADER, token)
                .with_header("Set-Cookie", "JSESSIONID=mock-session; Path=/; HttpOnly")
                .with_header("Set-Cookie", "iSession=mock-i"),
        )
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    /// Requests received on one route, in order.
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Request> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && path_of(&r.url) == path)
            .cloned()
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    /// JSON bodies sent to one route, in order.
    pub fn bodies(&self, method: Method, path: &str) -> Vec<serde_json::Value> {
        self.requests_to(method, path)
            .into_iter()
            .map(|r| r.body.unwrap_or(serde_json::Value::Null))
            .collect()
    }

    pub fn last_request(&self, method: Method, path: &str) -> Option<Request> {
        self.requests_to(method, path).pop()
    }

    /// `METHOD /path` for every request, handy for asserting call order.
    pub fn call_log(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(|r| format!("{} {}", r.method, path_of(&r.url)))
            .collect()
    }
}

impl HttpTransport for MockTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let mut state = self.lock();
        state.requests.push(request.clone());

        let path = path_of(&request.url).to_string();
        let scripted = state
            .routes
            .get_mut(&(request.method, path.clone()))
            .and_then(|route| route.once.pop_front().or_else(|| route.sticky.clone()));

        Ok(scripted.unwrap_or_else(|| {
            json_response(
                404,
                serde_json::json!({
                    "message": format!("no route for {} {}", request.method, path)
                }),
            )
        }))
    }
}

fn path_of(url: &str) -> &str {
    let path = url.strip_prefix(MockTransport::BASE_URL).unwrap_or(url);
    path.split('?').next().unwrap_or(path)
}

fn json_response(status: u16, body: serde_json::Value) -> Response {
    let body = match body {
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    };
    Response::new(status, body).with_header("Content-Type", "application/json")
}

// ============================================================================
// Configuration builders
// ============================================================================

/// Plugin config pointing at the mock server.
pub fn plugin_config() -> PluginConfig {
    PluginConfig {
        server: ServerConfig {
            base_url: MockTransport::BASE_URL.to_string(),
            ..ServerConfig::default()
        },
    }
}

/// Export config for project `P1`, dataset `orders`, no polling delay.
pub fn exporter_config(buffer_size: usize) -> ExporterConfig {
    ExporterConfig {
        credentials: CredentialsConfig::new("etl", "secret"),
        target: TargetConfig {
            project_id: Some("P1".to_string()),
            dataset_name: "orders".to_string(),
            ..TargetConfig::default()
        },
        upload: UploadConfig {
            buffer_size,
            publish_poll_interval_ms: 0,
            ..UploadConfig::default()
        },
    }
}

/// Decode the `data` field of an uploaded chunk into its JSON rows.
pub fn decode_payload(data: &str) -> serde_json::Value {
    match crate::encode::decode_data(data) {
        Ok(value) => value,
        Err(e) => panic!("chunk payload does not decode: {}", e),
    }
}
