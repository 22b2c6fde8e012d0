//! Loopback REST server for tests that go through the real `ureq` transport.
//!
//! Routes are scripted up front; every request is recorded with its raw
//! query string, headers and body.

#![allow(dead_code)]

use std::io::Read;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use tiny_http::{Header, Response, Server};

/// One scripted answer.
#[derive(Clone)]
pub struct Route {
    pub method: &'static str,
    pub path: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Route {
    pub fn new(method: &'static str, path: &str, status: u16, body: &str) -> Self {
        Route {
            method,
            path: path.to_string(),
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.to_string(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Recorded {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body should be JSON")
    }
}

pub struct LoopbackServer {
    server: Arc<Server>,
    requests: Arc<Mutex<Vec<Recorded>>>,
    handle: Option<JoinHandle<()>>,
    pub base_url: String,
}

impl LoopbackServer {
    /// Serve `routes` under `/api` on an ephemeral port.
    pub fn start(routes: Vec<Route>) -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").expect("bind loopback server"));
        let addr = server
            .server_addr()
            .to_ip()
            .expect("loopback server has an IP address");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let server = Arc::clone(&server);
            let requests = Arc::clone(&requests);
            std::thread::spawn(move || {
                for mut request in server.incoming_requests() {
                    let url = request.url().to_string();
                    let (path, query) = match url.split_once('?') {
                        Some((p, q)) => (p.to_string(), q.to_string()),
                        None => (url.clone(), String::new()),
                    };
                    let mut body = String::new();
                    let _ = request.as_reader().read_to_string(&mut body);
                    let method = request.method().to_string();
                    let headers = request
                        .headers()
                        .iter()
                        .map(|h| (h.field.as_str().to_string(), h.value.as_str().to_string()))
                        .collect();

                    requests.lock().unwrap().push(Recorded {
                        method: method.clone(),
                        path: path.clone(),
                        query,
                        headers,
                        body,
                    });

                    let route = routes
                        .iter()
                        .find(|r| r.method == method && format!("/api{}", r.path) == path);
                    let response = match route {
                        Some(route) => {
                            let mut response = Response::from_string(route.body.clone())
                                .with_status_code(route.status);
                            for (name, value) in &route.headers {
                                let header = Header::from_bytes(name.as_bytes(), value.as_bytes())
                                    .expect("valid header");
                                response.add_header(header);
                            }
                            response
                        }
                        None => Response::from_string(
                            serde_json::json!({"message": format!("no route for {} {}", method, path)})
                                .to_string(),
                        )
                        .with_status_code(404),
                    };
                    let _ = request.respond(response);
                }
            })
        };

        LoopbackServer {
            server,
            requests,
            handle: Some(handle),
            base_url: format!("http://{}/api", addr),
        }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests to `path` (relative to `/api`).
    pub fn requests_to(&self, method: &str, path: &str) -> Vec<Recorded> {
        let full = format!("/api{}", path);
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == full)
            .collect()
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Login answering with a token and two session cookies.
pub fn login_route(token: &str) -> Route {
    Route::new("POST", "/auth/login", 204, "")
        .header("X-MSTR-AuthToken", token)
        .header("Set-Cookie", "JSESSIONID=loop-session; Path=/; HttpOnly")
        .header("Set-Cookie", "iSession=loop-i")
}
