//! Blocking transport over `ureq`.

use std::time::Duration;

use cube_common::{Error, Result};

use super::transport::{HttpTransport, Request, Response};

/// Production transport. One agent per exporter; connections are pooled.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    /// Transport whose every request gives up after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("cube-export/", env!("CARGO_PKG_VERSION")))
            .build();
        UreqTransport { agent }
    }
}

impl HttpTransport for UreqTransport {
    fn send(&self, request: &Request) -> Result<Response> {
        let mut call = self.agent.request(request.method.as_str(), &request.url);
        for (name, value) in &request.query {
            call = call.query(name, value);
        }
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let result = match &request.body {
            Some(body) => call
                .set("Content-Type", "application/json")
                .send_string(&body.to_string()),
            None => call.call(),
        };

        match result {
            Ok(resp) => read_response(resp),
            // Non-2xx is still a response; the session decides what it means.
            Err(ureq::Error::Status(_, resp)) => read_response(resp),
            Err(ureq::Error::Transport(t)) => Err(Error::Transport(format!(
                "{} {}: {}",
                request.method, request.url, t
            ))),
        }
    }
}

fn read_response(resp: ureq::Response) -> Result<Response> {
    let status = resp.status();
    let mut names = resp.headers_names();
    // One name per header line; repeated `Set-Cookie` would be read twice.
    let mut seen = std::collections::HashSet::new();
    names.retain(|name| seen.insert(name.to_ascii_lowercase()));

    let mut headers = Vec::new();
    for name in names {
        for value in resp.all(&name) {
            headers.push((name.clone(), value.to_string()));
        }
    }
    let body = resp.into_string()?;
    Ok(Response {
        status,
        headers,
        body,
    })
}
