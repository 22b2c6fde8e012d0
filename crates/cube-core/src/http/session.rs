//! Authenticated session over a transport.
//!
//! Every REST call of an export goes through one [`HttpSession`]: it logs in
//! lazily on the first call, decorates each request with the token and
//! cookies, and turns error statuses into [`Error::Remote`].

use std::time::Duration;

use cube_common::{Error, ProjectId, Result};
use cube_config::{CredentialsConfig, PluginConfig};

use super::transport::{HttpTransport, Method, Request, Response};
use super::ureq_transport::UreqTransport;
use crate::auth::{Authenticator, PROJECT_HEADER};
use crate::log_event;
use crate::logging::{event_names, truncate_for_log, LogContext, Stage};

/// Longest request or response body written to verbose logs.
const VERBOSE_BODY_LIMIT: usize = 4096;

/// Base URL, transport, and the token state of one server session.
pub struct HttpSession {
    base_url: String,
    transport: Box<dyn HttpTransport>,
    auth: Authenticator,
    verbose: bool,
    log: LogContext,
}

impl HttpSession {
    /// Session over the blocking `ureq` transport.
    pub fn connect(
        plugin: &PluginConfig,
        credentials: CredentialsConfig,
        lease: Duration,
        log: LogContext,
    ) -> Self {
        let transport = Box::new(UreqTransport::new(plugin.server.timeout()));
        Self::with_transport(plugin, credentials, lease, transport, log)
    }

    /// Session over any transport.
    pub fn with_transport(
        plugin: &PluginConfig,
        credentials: CredentialsConfig,
        lease: Duration,
        transport: Box<dyn HttpTransport>,
        log: LogContext,
    ) -> Self {
        let base_url = plugin.server.normalized_base_url();
        let auth = Authenticator::new(base_url.clone(), credentials, lease, log.clone());
        HttpSession {
            base_url,
            transport,
            auth,
            verbose: plugin.server.verbose,
            log,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path such as `/projects`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn log(&self) -> &LogContext {
        &self.log
    }

    /// Replace the correlation fields, e.g. once the project is known.
    pub fn set_log_context(&mut self, log: LogContext) {
        self.auth.set_log_context(log.clone());
        self.log = log;
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    pub fn get(
        &mut self,
        path: &str,
        project: Option<&ProjectId>,
        query: &[(&str, &str)],
    ) -> Result<Response> {
        let mut request = self.request(Method::Get, path, project);
        for (name, value) in query {
            request = request.query(*name, *value);
        }
        self.execute(request)
    }

    pub fn post(
        &mut self,
        path: &str,
        project: Option<&ProjectId>,
        body: serde_json::Value,
    ) -> Result<Response> {
        let request = self.request(Method::Post, path, project).json(body);
        self.execute(request)
    }

    pub fn put(
        &mut self,
        path: &str,
        project: Option<&ProjectId>,
        body: serde_json::Value,
    ) -> Result<Response> {
        let request = self.request(Method::Put, path, project).json(body);
        self.execute(request)
    }

    pub fn patch(
        &mut self,
        path: &str,
        project: Option<&ProjectId>,
        body: serde_json::Value,
    ) -> Result<Response> {
        let request = self.request(Method::Patch, path, project).json(body);
        self.execute(request)
    }

    /// Keep the token alive ahead of a long call. Returns whether a renewal
    /// was needed.
    pub fn renew_if_expired(&mut self) -> Result<bool> {
        if !self.auth.is_expired() {
            return Ok(false);
        }
        self.auth.renew(self.transport.as_ref())?;
        Ok(true)
    }

    /// Best-effort logout.
    pub fn logout(&mut self) -> Option<u16> {
        self.auth.logout(self.transport.as_ref())
    }

    fn request(&self, method: Method, path: &str, project: Option<&ProjectId>) -> Request {
        let mut request = Request::new(method, self.url(path));
        if let Some(project) = project {
            request = request.header(PROJECT_HEADER, project.as_str());
        }
        request
    }

    /// Log in if needed, decorate, send and check the status.
    fn execute(&mut self, request: Request) -> Result<Response> {
        self.auth.ensure_authenticated(self.transport.as_ref())?;
        let request = self.auth.decorate(request);
        let response = self.transport.send(&request)?;
        self.check_response(&request, response)
    }

    fn check_response(&self, request: &Request, response: Response) -> Result<Response> {
        if response.status < 400 {
            return Ok(response);
        }

        let message = error_message(response.status, &response.body);
        if self.verbose {
            let request_body = request
                .body
                .as_ref()
                .map(|b| truncate_for_log(&b.to_string(), VERBOSE_BODY_LIMIT))
                .unwrap_or_default();
            log_event!(
                self.log,
                ERROR,
                event_names::HTTP_ERROR,
                Stage::Upload,
                &message,
                method = request.method.as_str(),
                url = request.url.as_str(),
                request_body = request_body.as_str(),
                response_body = truncate_for_log(&response.body, VERBOSE_BODY_LIMIT).as_str()
            );
        } else {
            log_event!(
                self.log,
                ERROR,
                event_names::HTTP_ERROR,
                Stage::Upload,
                &message,
                method = request.method.as_str(),
                status = response.status as u64
            );
        }

        Err(Error::Remote {
            status: response.status,
            message,
        })
    }
}

/// Error text for a failed call: `Error <status>. <message>`.
///
/// The JSON `message` is used when present; other JSON bodies are appended
/// compact; bodies that are not JSON add nothing.
pub fn error_message(status: u16, body: &str) -> String {
    let mut message = format!("Error {}", status);
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(json) => match json.get("message").and_then(|m| m.as_str()) {
            Some(text) if !text.is_empty() => {
                message.push_str(". ");
                message.push_str(text);
            }
            _ if is_empty_json(&json) => {}
            _ => {
                message.push_str(". ");
                message.push_str(&json.to_string());
            }
        },
        Err(_) => {}
    }
    message
}

fn is_empty_json(json: &serde_json::Value) -> bool {
    match json {
        serde_json::Value::Null => true,
        serde_json::Value::Object(map) => map.is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AUTH_TOKEN_HEADER;
    use crate::test_utils::{plugin_config, MockTransport};

    fn session(mock: &MockTransport) -> HttpSession {
        HttpSession::with_transport(
            &plugin_config(),
            CredentialsConfig::new("etl", "secret"),
            Duration::from_secs(3000),
            Box::new(mock.clone()),
            LogContext::new("run-test"),
        )
    }

    #[test]
    fn test_error_message_formats() {
        assert_eq!(
            error_message(400, r#"{"code":"ERR001","message":"Bad cube"}"#),
            "Error 400. Bad cube"
        );
        assert_eq!(
            error_message(500, r#"{"code":"ERR009"}"#),
            r#"Error 500. {"code":"ERR009"}"#
        );
        assert_eq!(error_message(502, "<html>Bad Gateway</html>"), "Error 502");
        assert_eq!(error_message(404, ""), "Error 404");
        assert_eq!(error_message(404, "{}"), "Error 404");
    }

    #[test]
    fn test_first_call_logs_in_once() {
        let mock = MockTransport::new();
        mock.with_login("tok-1");
        mock.on(Method::Get, "/projects", 200, serde_json::json!([]));
        let mut session = session(&mock);

        session.get("/projects", None, &[]).unwrap();
        session.get("/projects", None, &[]).unwrap();

        assert_eq!(mock.count(Method::Post, "/auth/login"), 1);
        let req = mock.last_request(Method::Get, "/projects").unwrap();
        assert_eq!(req.header_value(AUTH_TOKEN_HEADER), Some("tok-1"));
    }

    #[test]
    fn test_project_header_and_query() {
        let mock = MockTransport::new();
        mock.with_login("tok-1");
        mock.on(Method::Get, "/searches/results", 200, serde_json::json!({}));
        let mut session = session(&mock);

        let project = ProjectId::new("P1");
        session
            .get("/searches/results", Some(&project), &[("name", "orders")])
            .unwrap();

        let req = mock.last_request(Method::Get, "/searches/results").unwrap();
        assert_eq!(req.header_value(PROJECT_HEADER), Some("P1"));
        assert_eq!(req.query, vec![("name".to_string(), "orders".to_string())]);
    }

    #[test]
    fn test_error_status_becomes_remote_error() {
        let mock = MockTransport::new();
        mock.with_login("tok-1");
        mock.on(
            Method::Post,
            "/datasets",
            400,
            serde_json::json!({"message": "Invalid definition"}),
        );
        let mut session = session(&mock);

        let err = session
            .post("/datasets", None, serde_json::json!({}))
            .unwrap_err();
        match err {
            Error::Remote { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "Error 400. Invalid definition");
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[test]
    fn test_renew_if_expired_only_when_needed() {
        let mock = MockTransport::new();
        mock.with_login("tok-1");
        mock.on(Method::Get, "/projects", 200, serde_json::json!([]));
        mock.on(Method::Put, "/sessions", 204, serde_json::Value::Null);
        let mut session = session(&mock);

        // Not logged in yet: renewal performs the login.
        assert!(session.renew_if_expired().unwrap());
        assert_eq!(mock.count(Method::Post, "/auth/login"), 1);

        assert!(!session.renew_if_expired().unwrap());
        assert_eq!(mock.count(Method::Put, "/sessions"), 0);
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let mut plugin = plugin_config();
        plugin.server.base_url = format!("{}///", MockTransport::BASE_URL);
        let session = HttpSession::with_transport(
            &plugin,
            CredentialsConfig::new("etl", "secret"),
            Duration::from_secs(3000),
            Box::new(MockTransport::new()),
            LogContext::new("run-test"),
        );
        assert_eq!(session.url("/projects"), format!("{}/projects", MockTransport::BASE_URL));
    }
}
