//! Token authentication against the REST API.
//!
//! The server hands out an auth token in a response header plus a set of
//! session cookies; both must accompany every later call. Tokens are
//! trusted for a fixed lease, after which a keep-alive re-arms them.

use std::time::{Duration, Instant};

use cube_common::{Error, Result};
use cube_config::CredentialsConfig;

use crate::http::transport::{HttpTransport, Method, Request};
use crate::http::error_message;
use crate::log_event;
use crate::logging::{event_names, LogContext, Stage};

/// Header carrying the session token, in both directions.
pub const AUTH_TOKEN_HEADER: &str = "X-MSTR-AuthToken";

/// Header scoping a call to one project.
pub const PROJECT_HEADER: &str = "X-MSTR-ProjectID";

/// Standard-auth login mode.
const LOGIN_MODE_STANDARD: u8 = 1;

/// How long a token is trusted before a keep-alive.
pub const DEFAULT_TOKEN_LEASE: Duration = Duration::from_secs(50 * 60);

/// Holds the token and cookies of one server session.
pub struct Authenticator {
    base_url: String,
    credentials: CredentialsConfig,
    lease: Duration,
    token: Option<String>,
    cookies: Vec<(String, String)>,
    expires_at: Option<Instant>,
    logins: u32,
    renewals: u32,
    log: LogContext,
}

impl Authenticator {
    pub fn new(
        base_url: impl Into<String>,
        credentials: CredentialsConfig,
        lease: Duration,
        log: LogContext,
    ) -> Self {
        Authenticator {
            base_url: base_url.into(),
            credentials,
            lease,
            token: None,
            cookies: Vec::new(),
            expires_at: None,
            logins: 0,
            renewals: 0,
            log,
        }
    }

    /// Log in with the configured credentials.
    ///
    /// Replaces the token and cookie set and re-arms the lease.
    pub fn authenticate(&mut self, transport: &dyn HttpTransport) -> Result<()> {
        let url = format!("{}/auth/login", self.base_url);
        let request = Request::new(Method::Post, url).json(serde_json::json!({
            "username": self.credentials.username,
            "password": self.credentials.password,
            "loginMode": LOGIN_MODE_STANDARD,
        }));

        let response = transport.send(&request)?;
        if !response.is_success() {
            let message = error_message(response.status, &response.body);
            log_event!(
                self.log,
                ERROR,
                event_names::AUTH_LOGIN_FAILED,
                Stage::Auth,
                &message,
                username = self.credentials.username.as_str(),
                password = self.credentials.masked_password().as_str(),
                status = response.status as u64
            );
            return Err(Error::Auth(message));
        }

        let token = response
            .header(AUTH_TOKEN_HEADER)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Error::Auth(format!(
                    "login succeeded with status {} but returned no {} header",
                    response.status, AUTH_TOKEN_HEADER
                ))
            })?
            .to_string();

        self.cookies.clear();
        for raw in response.header_all("Set-Cookie") {
            if let Some((name, value)) = parse_set_cookie(raw) {
                upsert_cookie(&mut self.cookies, name, value);
            }
        }
        self.token = Some(token);
        self.arm();
        self.logins += 1;

        log_event!(
            self.log,
            INFO,
            event_names::AUTH_LOGIN,
            Stage::Auth,
            "Logged in",
            username = self.credentials.username.as_str(),
            cookies = self.cookies.len() as u64
        );
        Ok(())
    }

    /// Log in unless a token is already held.
    pub fn ensure_authenticated(&mut self, transport: &dyn HttpTransport) -> Result<()> {
        if self.token.is_none() {
            self.authenticate(transport)?;
        }
        Ok(())
    }

    /// Add the token header and the cookie header to a request.
    pub fn decorate(&self, request: Request) -> Request {
        let mut request = request;
        if let Some(token) = &self.token {
            request = request.header(AUTH_TOKEN_HEADER, token.as_str());
        }
        if !self.cookies.is_empty() {
            request = request.header("Cookie", cookie_string(&self.cookies));
        }
        request
    }

    /// True if never authenticated or the lease has run out.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(deadline) => Instant::now() >= deadline,
            None => true,
        }
    }

    /// Extend the session with a keep-alive, falling back to a full login.
    pub fn renew(&mut self, transport: &dyn HttpTransport) -> Result<()> {
        if self.token.is_none() {
            return self.authenticate(transport);
        }

        let url = format!("{}/sessions", self.base_url);
        let request = self.decorate(Request::new(Method::Put, url));
        let failure = match transport.send(&request) {
            Ok(response) if response.is_success() => {
                for raw in response.header_all("Set-Cookie") {
                    if let Some((name, value)) = parse_set_cookie(raw) {
                        upsert_cookie(&mut self.cookies, name, value);
                    }
                }
                self.arm();
                self.renewals += 1;
                log_event!(
                    self.log,
                    DEBUG,
                    event_names::AUTH_RENEWED,
                    Stage::Auth,
                    "Session extended"
                );
                return Ok(());
            }
            Ok(response) => error_message(response.status, &response.body),
            Err(e) => e.to_string(),
        };

        log_event!(
            self.log,
            WARN,
            event_names::AUTH_RENEW_FALLBACK,
            Stage::Auth,
            "Keep-alive failed, logging in again",
            reason = failure.as_str()
        );
        self.authenticate(transport).map_err(|e| {
            Error::SessionRenewal(format!("keep-alive failed ({}); re-login failed: {}", failure, e))
        })
    }

    /// Best-effort logout. Local state is cleared whatever the outcome.
    ///
    /// Returns the logout status when the server answered.
    pub fn logout(&mut self, transport: &dyn HttpTransport) -> Option<u16> {
        if self.token.is_none() {
            return None;
        }
        let url = format!("{}/auth/logout", self.base_url);
        let request = self.decorate(Request::new(Method::Get, url));
        let status = match transport.send(&request) {
            Ok(response) => Some(response.status),
            Err(_) => None,
        };
        log_event!(
            self.log,
            INFO,
            event_names::AUTH_LOGOUT,
            Stage::Auth,
            match status {
                Some(code) => format!("Logout returned status {}", code),
                None => "Logout request failed".to_string(),
            }
        );

        self.token = None;
        self.cookies.clear();
        self.expires_at = None;
        status
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn cookies(&self) -> &[(String, String)] {
        &self.cookies
    }

    /// Number of full logins performed.
    pub fn login_count(&self) -> u32 {
        self.logins
    }

    /// Number of successful keep-alives.
    pub fn renew_count(&self) -> u32 {
        self.renewals
    }

    pub fn set_log_context(&mut self, log: LogContext) {
        self.log = log;
    }

    fn arm(&mut self) {
        self.expires_at = Some(Instant::now() + self.lease);
    }
}

/// Name and value of a `Set-Cookie` header; attributes are dropped.
pub fn parse_set_cookie(header: &str) -> Option<(String, String)> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), value.trim().to_string()))
}

/// Cookies joined as `name=value;name=value`.
pub fn cookie_string(cookies: &[(String, String)]) -> String {
    cookies
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(";")
}

fn upsert_cookie(cookies: &mut Vec<(String, String)>, name: String, value: String) {
    match cookies.iter_mut().find(|(n, _)| *n == name) {
        Some(existing) => existing.1 = value,
        None => cookies.push((name, value)),
    }
}
