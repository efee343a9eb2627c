//! HTTP transport layer
//!
//! Abstracts request execution for testability. Provides:
//! - HttpExecutor trait: sends one request, returns one fully-read response
//! - ReqwestExecutor: blocking `reqwest` client for production
//! - ResilientTransport: header injection and bounded retry of safe requests

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

/// Client identity sent on every request
pub fn user_agent() -> String {
    format!("kyper-cli/{}", env!("CARGO_PKG_VERSION"))
}

/// HTTP methods used by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Safe methods may be repeated without side effects
    pub fn is_idempotent(&self) -> bool {
        matches!(self, Method::Get | Method::Head)
    }
}

/// A file attached to a multipart body, streamed from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    /// Form field name
    pub name: String,
    /// File name reported to the server
    pub file_name: String,
    /// Location on disk
    pub path: PathBuf,
}

/// Multipart form body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    pub fields: Vec<(String, String)>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    pub fn file(
        mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.files.push(FilePart {
            name: name.into(),
            file_name: file_name.into(),
            path: path.into(),
        });
        self
    }

    /// Look up a text field
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestBody {
    Empty,
    Json(Vec<u8>),
    Multipart(MultipartForm),
}

/// An outbound request. `path` is relative to the API host and may carry a
/// query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl HttpRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: vec![("Accept".to_string(), "application/json".to_string())],
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Attach a JSON body
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, TransportError> {
        self.body = RequestBody::Json(serde_json::to_vec(body)?);
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    /// Attach a multipart body
    pub fn multipart(mut self, form: MultipartForm) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    /// Case-insensitive header lookup (last value wins)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Path without the query string
    pub fn route(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }

    /// Query string, if any
    pub fn query(&self) -> Option<&str> {
        self.path.split_once('?').map(|(_, q)| q)
    }
}

/// A response with its body fully read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        // Serializing plain data structures cannot fail
        let body = serde_json::to_vec(value).unwrap_or_default();
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    Client(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_connect() || err.is_request() {
            TransportError::ConnectionFailed(err.to_string())
        } else {
            TransportError::Client(err.to_string())
        }
    }
}

/// Executes one HTTP request
pub trait HttpExecutor: Send + Sync {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking `reqwest` executor for production use
pub struct ReqwestExecutor {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl ReqwestExecutor {
    /// Create an executor rooted at `base_url` (e.g. `https://kyper.shop`)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_form(form: &MultipartForm) -> Result<reqwest::blocking::multipart::Form, TransportError> {
        use reqwest::blocking::multipart::{Form, Part};

        let mut out = Form::new();
        for (name, value) in &form.fields {
            out = out.text(name.clone(), value.clone());
        }
        for file in &form.files {
            let part = Part::file(&file.path)?.file_name(file.file_name.clone());
            out = out.part(file.name.clone(), part);
        }
        Ok(out)
    }
}

impl HttpExecutor for ReqwestExecutor {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(method, &url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(bytes) => builder.body(bytes.clone()),
            RequestBody::Multipart(form) => builder.multipart(Self::build_form(form)?),
        };

        let response = builder.send()?;
        let status = response.status().as_u16();
        // Reading the body to the end releases the connection back to the pool
        let body = response.bytes()?.to_vec();

        Ok(HttpResponse { status, body })
    }
}

/// Delays before each attempt of a safe request.
///
/// The first entry is normally zero (immediate first attempt); the number of
/// entries is the maximum number of attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delays: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delays: vec![
                Duration::ZERO,
                Duration::from_secs(1),
                Duration::from_secs(2),
            ],
        }
    }
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self { delays }
    }

    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            delays: vec![Duration::ZERO],
        }
    }

    /// `attempts` attempts with no delay between them
    pub fn immediate(attempts: usize) -> Self {
        Self {
            delays: vec![Duration::ZERO; attempts.max(1)],
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.delays.len().max(1)
    }
}

/// Wraps an executor with identity headers and retry of safe requests.
///
/// GET and HEAD follow the retry policy and stop at the first response
/// below 500. Every other method is sent exactly once. A transport-level
/// error is returned immediately without retry.
#[derive(Clone)]
pub struct ResilientTransport {
    inner: Arc<dyn HttpExecutor>,
    token: Option<String>,
    policy: RetryPolicy,
}

impl ResilientTransport {
    pub fn new(inner: Arc<dyn HttpExecutor>, token: Option<String>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            token: token.filter(|t| !t.is_empty()),
            policy,
        }
    }

    /// Same executor and policy with a different credential
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self::new(self.inner.clone(), token, self.policy.clone())
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a request. The caller's request is never modified.
    pub fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut prepared = request.clone();
        prepared
            .headers
            .push(("User-Agent".to_string(), user_agent()));
        if let Some(token) = &self.token {
            prepared
                .headers
                .push(("Authorization".to_string(), format!("Bearer {}", token)));
        }

        if !prepared.method.is_idempotent() {
            return self.inner.execute(&prepared);
        }

        let delays: &[Duration] = if self.policy.delays.is_empty() {
            &[Duration::ZERO]
        } else {
            &self.policy.delays
        };

        let mut last = None;
        for (attempt, delay) in delays.iter().enumerate() {
            if !delay.is_zero() {
                thread::sleep(*delay);
            }

            let response = self.inner.execute(&prepared)?;
            if response.status < 500 {
                return Ok(response);
            }

            debug!(
                method = prepared.method.as_str(),
                path = %prepared.route(),
                status = response.status,
                attempt = attempt + 1,
                "server error on safe request"
            );
            // Drops the previous attempt's body
            last = Some(response);
        }

        match last {
            Some(response) => {
                warn!(
                    path = %prepared.route(),
                    status = response.status,
                    attempts = delays.len(),
                    "retries exhausted"
                );
                Ok(response)
            }
            None => Err(TransportError::Client("no attempt was made".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Replays a fixed list of statuses and records what it saw
    struct Scripted {
        statuses: Mutex<Vec<u16>>,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(statuses: &[u16]) -> Arc<Self> {
            let mut statuses = statuses.to_vec();
            statuses.reverse();
            Arc::new(Self {
                statuses: Mutex::new(statuses),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn attempts(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    impl HttpExecutor for Scripted {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request.clone());
            let status = self.statuses.lock().unwrap().pop().unwrap_or(200);
            Ok(HttpResponse::new(status, format!("status {}", status)))
        }
    }

    struct Refused(Mutex<usize>);

    impl HttpExecutor for Refused {
        fn execute(&self, _request: &HttpRequest) -> Result<HttpResponse, TransportError> {
            *self.0.lock().unwrap() += 1;
            Err(TransportError::ConnectionFailed("connection refused".to_string()))
        }
    }

    #[test]
    fn test_get_retries_until_success() {
        let exec = Scripted::new(&[503, 503, 200]);
        let transport = ResilientTransport::new(exec.clone(), None, RetryPolicy::immediate(3));

        let response = transport.execute(&HttpRequest::get("/api/v1/me")).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(exec.attempts(), 3);
    }

    #[test]
    fn test_client_error_not_retried() {
        let exec = Scripted::new(&[404]);
        let transport = ResilientTransport::new(exec.clone(), None, RetryPolicy::immediate(3));

        let response = transport.execute(&HttpRequest::get("/api/v1/apps/x")).unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(exec.attempts(), 1);
    }

    #[test]
    fn test_post_never_retried() {
        let exec = Scripted::new(&[500, 200]);
        let transport = ResilientTransport::new(exec.clone(), None, RetryPolicy::immediate(3));

        let response = transport.execute(&HttpRequest::post("/api/v1/apps")).unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(exec.attempts(), 1);
    }

    #[test]
    fn test_exhausted_returns_last_response() {
        let exec = Scripted::new(&[500, 502, 503, 200]);
        let transport = ResilientTransport::new(exec.clone(), None, RetryPolicy::immediate(3));

        let response = transport.execute(&HttpRequest::get("/api/v1/me")).unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"status 503".to_vec());
        assert_eq!(exec.attempts(), 3);
    }

    #[test]
    fn test_connection_error_not_retried() {
        let exec = Arc::new(Refused(Mutex::new(0)));
        let transport = ResilientTransport::new(exec.clone(), None, RetryPolicy::immediate(3));

        let result = transport.execute(&HttpRequest::get("/api/v1/me"));
        assert!(matches!(result, Err(TransportError::ConnectionFailed(_))));
        assert_eq!(*exec.0.lock().unwrap(), 1);
    }

    #[test]
    fn test_headers_injected_on_copy() {
        let exec = Scripted::new(&[200]);
        let transport = ResilientTransport::new(
            exec.clone(),
            Some("tok_abc".to_string()),
            RetryPolicy::none(),
        );

        let request = HttpRequest::get("/api/v1/me");
        transport.execute(&request).unwrap();

        assert!(request.header("Authorization").is_none());
        let seen = exec.seen.lock().unwrap();
        assert_eq!(seen[0].header("authorization"), Some("Bearer tok_abc"));
        assert_eq!(seen[0].header("User-Agent"), Some(user_agent().as_str()));
    }

    #[test]
    fn test_empty_token_sends_no_auth() {
        let exec = Scripted::new(&[200]);
        let transport = ResilientTransport::new(exec.clone(), Some(String::new()), RetryPolicy::none());

        transport.execute(&HttpRequest::get("/api/v1/me")).unwrap();
        assert!(exec.seen.lock().unwrap()[0].header("Authorization").is_none());
    }

    #[test]
    fn test_default_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delays[0], Duration::ZERO);
        assert_eq!(policy.delays[2], Duration::from_secs(2));
    }

    #[test]
    fn test_request_route_and_query() {
        let request = HttpRequest::get("/api/v1/versions/7/build_log?cursor=42");
        assert_eq!(request.route(), "/api/v1/versions/7/build_log");
        assert_eq!(request.query(), Some("cursor=42"));
    }

    #[test]
    fn test_json_body_sets_content_type() {
        let request = HttpRequest::post("/api/v1/apps")
            .json(&serde_json::json!({"app": {"title": "x"}}))
            .unwrap();
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert!(matches!(request.body, RequestBody::Json(_)));
    }
}
