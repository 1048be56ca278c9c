//! Transport abstraction shared by every provider adapter.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

/// Authentication applied to outgoing HTTP requests. Keyless providers and
/// query-string keys need none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpAuth {
    BearerToken(String),
}

impl HttpAuth {
    pub fn apply(&self, headers: &mut BTreeMap<String, String>) {
        match self {
            Self::BearerToken(token) => {
                headers.insert(String::from("authorization"), format!("Bearer {token}"));
            }
        }
    }
}

/// GET request issued by an adapter.
///
/// Requests carry no deadline of their own: the executor bounds each provider
/// call, crumb round-trips included, with the configured call timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_auth(mut self, auth: &HttpAuth) -> Self {
        auth.apply(&mut self.headers);
        self
    }
}

/// HTTP response envelope returned by an adapter transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok_json(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport-level HTTP error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    message: String,
    timed_out: bool,
}

impl HttpError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            timed_out: true,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn timed_out(&self) -> bool {
        self.timed_out
    }
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HttpError {}

pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>>;

/// Adapter transport contract.
pub trait HttpClient: Send + Sync {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a>;
}

/// Production HTTP client using reqwest.
///
/// The cookie store is enabled because Yahoo's crumb endpoint only answers
/// requests that carry the session cookie set by its consent host.
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    client: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self {
            client: Arc::new(
                reqwest::Client::builder()
                    .user_agent(concat!("fincheck/", env!("CARGO_PKG_VERSION")))
                    .cookie_store(true)
                    .build()
                    .unwrap_or_else(|_| reqwest::Client::new()),
            ),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client: Arc::new(client),
        }
    }
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for ReqwestHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let mut builder = self.client.get(&request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name, value);
            }

            let response = builder.send().await.map_err(|error| {
                if error.is_timeout() {
                    HttpError::timeout(format!("request timeout: {error}"))
                } else if error.is_connect() {
                    HttpError::new(format!("connection failed: {error}"))
                } else {
                    HttpError::new(format!("request failed: {error}"))
                }
            })?;

            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .map_err(|error| HttpError::new(format!("failed to read response body: {error}")))?;

            Ok(HttpResponse { status, body })
        })
    }
}

#[derive(Debug, Clone)]
struct FixtureRoute {
    pattern: String,
    replies: VecDeque<Result<HttpResponse, HttpError>>,
}

/// Scripted transport for offline tests.
///
/// Each route matches requests whose URL contains its pattern; the first
/// registered match wins. A route with several replies hands them out in
/// order and keeps repeating the last one. Unmatched requests get a 404.
/// Every request is recorded.
#[derive(Debug, Default)]
pub struct FixtureHttpClient {
    routes: Mutex<Vec<FixtureRoute>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FixtureHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, pattern: impl Into<String>, body: impl Into<String>) -> Self {
        self.with_reply(pattern, Ok(HttpResponse::ok_json(body)))
    }

    pub fn with_status(self, pattern: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.with_reply(pattern, Ok(HttpResponse::new(status, body)))
    }

    pub fn with_transport_error(self, pattern: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_reply(pattern, Err(HttpError::new(message)))
    }

    pub fn with_reply(self, pattern: impl Into<String>, reply: Result<HttpResponse, HttpError>) -> Self {
        self.with_sequence(pattern, vec![reply])
    }

    pub fn with_sequence(
        self,
        pattern: impl Into<String>,
        replies: Vec<Result<HttpResponse, HttpError>>,
    ) -> Self {
        self.push_route(FixtureRoute {
            pattern: pattern.into(),
            replies: replies.into(),
        });
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("fixture request log is not poisoned")
            .clone()
    }

    pub fn request_count(&self, pattern: &str) -> usize {
        self.requests
            .lock()
            .expect("fixture request log is not poisoned")
            .iter()
            .filter(|request| request.url.contains(pattern))
            .count()
    }

    fn push_route(&self, route: FixtureRoute) {
        self.routes
            .lock()
            .expect("fixture routes are not poisoned")
            .push(route);
    }

    fn next_reply(&self, url: &str) -> Result<HttpResponse, HttpError> {
        let mut routes = self.routes.lock().expect("fixture routes are not poisoned");
        let Some(route) = routes.iter_mut().find(|route| url.contains(&route.pattern)) else {
            return Ok(HttpResponse::new(404, "{}"));
        };

        let reply = if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        };
        reply.unwrap_or_else(|| Ok(HttpResponse::new(404, "{}")))
    }
}

impl HttpClient for FixtureHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let reply = self.next_reply(&request.url);
        self.requests
            .lock()
            .expect("fixture request log is not poisoned")
            .push(request);

        Box::pin(async move { reply })
    }
}
