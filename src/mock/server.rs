//! Mock Server Implementation
//!
//! In-process stand-in for the build service API. Plugs into the same
//! `HttpExecutor` seam as the real HTTP client.

use std::fs::File;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use kyper_api::{
    App, AppStatus, BuildLog, DeviceGrant, MessageResponse, TokenResponse, User, VersionInfo,
    VersionResponse, VersionStatus, API_PREFIX,
};
use serde_json::{json, Value};

use crate::host::transport::RequestBody;
use crate::host::{HttpExecutor, HttpRequest, HttpResponse, Method, TransportError};
use crate::project::slugify;

use super::failure::{FailureConfig, FailureInjector, Injected};
use super::state::{BuildScript, DeviceFlow, MockState, MockVersion, UploadRecord};

/// A request as seen by the mock server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: Method,
    /// Path without the query string
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub user_agent: Option<String>,
}

impl RecordedRequest {
    /// Value of a query parameter
    pub fn param(&self, name: &str) -> Option<&str> {
        query_param(self.query.as_deref(), name)
    }
}

/// Configurable mock server for testing
#[derive(Clone, Default)]
pub struct MockServer {
    /// Mutable state (wrapped for interior mutability)
    state: Arc<Mutex<MockState>>,
    /// Failure injector
    failures: Arc<Mutex<FailureInjector>>,
    /// Every request received, in order
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockServer {
    /// Create a new mock server with no apps
    pub fn new() -> Self {
        Self::default()
    }

    // === Public API for test configuration ===

    /// Script used for versions uploaded from now on
    pub fn set_build_script(&self, script: BuildScript) {
        lock(&self.state).build_script = script;
    }

    /// Script a version switches to when retried
    pub fn set_retry_script(&self, script: BuildScript) {
        lock(&self.state).retry_script = script;
    }

    /// Configure the device handshake
    pub fn set_device_flow(&self, flow: DeviceFlow) {
        lock(&self.state).device = flow;
    }

    /// Register an existing app
    pub fn add_app(&self, slug: &str, title: &str) {
        let app = App {
            slug: slug.to_string(),
            title: title.to_string(),
            status: "draft".to_string(),
            ..Default::default()
        };
        lock(&self.state).apps.insert(slug.to_string(), app);
    }

    /// Register an existing version with a fixed status; returns its id
    pub fn add_version(&self, slug: &str, version: &str, status: VersionStatus) -> u64 {
        let mut state = lock(&self.state);
        let created = state.add_version(slug, version);
        created.status = status;
        created.id
    }

    /// Inject a failure for a method and path prefix
    pub fn inject_failure(&self, method: Method, prefix: &str, config: FailureConfig) {
        lock(&self.failures).inject(method, prefix, config);
    }

    /// Clear all failure injections
    pub fn clear_failures(&self) {
        lock(&self.failures).clear();
    }

    // === Public API for test assertions ===

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    /// Requests with this method whose path starts with `prefix`
    pub fn requests_to(&self, method: Method, prefix: &str) -> Vec<RecordedRequest> {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.path.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn uploads(&self) -> Vec<UploadRecord> {
        lock(&self.state).uploads.clone()
    }

    pub fn app(&self, slug: &str) -> Option<App> {
        lock(&self.state).apps.get(slug).cloned()
    }

    pub fn version(&self, id: u64) -> Option<MockVersion> {
        lock(&self.state).versions.get(&id).cloned()
    }

    // === Request handling ===

    fn record(&self, request: &HttpRequest) {
        lock(&self.requests).push(RecordedRequest {
            method: request.method,
            path: request.route().to_string(),
            query: request.query().map(str::to_string),
            authorization: request.header("Authorization").map(str::to_string),
            user_agent: request.header("User-Agent").map(str::to_string),
        });
    }

    /// Handle one request
    pub fn handle_request(&self, request: &HttpRequest) -> HttpResponse {
        let Some(rest) = request.route().strip_prefix(API_PREFIX) else {
            return error(404, "No route");
        };
        let segments: Vec<&str> = rest.trim_matches('/').split('/').collect();
        let authorized = request
            .header("Authorization")
            .is_some_and(|v| v.starts_with("Bearer ") && v.len() > "Bearer ".len());
        let query = request.query();

        match (request.method, segments.as_slice()) {
            (Method::Post, ["device", "authorize"]) => self.device_authorize(),
            (Method::Get, ["device", "token"]) => {
                self.device_token(query_param(query, "code").unwrap_or_default())
            }
            _ if !authorized => error(401, "Unauthorized"),
            (Method::Get, ["me"]) => {
                let email = lock(&self.state).user_email.clone();
                HttpResponse::json(
                    200,
                    &User {
                        id: 1,
                        email,
                        role: "developer".to_string(),
                    },
                )
            }
            (Method::Get, ["apps", slug]) => match self.app(slug) {
                Some(app) => HttpResponse::json(200, &app),
                None => error(404, "App not found"),
            },
            (Method::Get, ["apps", slug, "status"]) => self.app_status(slug),
            (Method::Post, ["apps"]) => self.create_app(&request.body),
            (Method::Patch, ["apps", slug]) => self.update_app(slug, &request.body),
            (Method::Post, ["apps", slug, "versions"]) => self.create_version(slug, &request.body),
            (Method::Get, ["versions", id, "build_log"]) => {
                let cursor = query_param(query, "cursor")
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                self.with_version(id, |v| build_log(v, cursor))
            }
            (Method::Post, ["versions", id, "retry"]) => self.with_version(id, |v| {
                if v.status != VersionStatus::BuildFailed {
                    return error(422, "Only failed builds can be retried");
                }
                v.restart();
                message(v.id, "Build retry queued")
            }),
            (Method::Post, ["versions", id, "cancel"]) => self.with_version(id, |v| {
                if !v.status.is_in_progress() {
                    return error(422, "Only pending or building versions can be cancelled");
                }
                v.status = VersionStatus::Cancelled;
                message(v.id, "Build cancelled")
            }),
            (Method::Delete, ["versions", id]) => {
                let removed = id
                    .parse::<u64>()
                    .ok()
                    .and_then(|id| lock(&self.state).versions.remove(&id));
                match removed {
                    Some(v) => message(v.id, "Version withdrawn"),
                    None => error(404, "Version not found"),
                }
            }
            _ => error(404, "No route"),
        }
    }

    fn with_version<F>(&self, id: &str, f: F) -> HttpResponse
    where
        F: FnOnce(&mut MockVersion) -> HttpResponse,
    {
        let Ok(id) = id.parse::<u64>() else {
            return error(404, "Version not found");
        };
        let mut state = lock(&self.state);
        match state.versions.get_mut(&id) {
            Some(version) => f(version),
            None => error(404, "Version not found"),
        }
    }

    fn device_authorize(&self) -> HttpResponse {
        let state = lock(&self.state);
        HttpResponse::json(
            201,
            &DeviceGrant {
                code: state.device.code.clone(),
                verification_uri: state.device.verification_uri.clone(),
            },
        )
    }

    fn device_token(&self, code: &str) -> HttpResponse {
        let mut state = lock(&self.state);
        let device = &mut state.device;
        if device.expired || device.code != code {
            return error(404, "Device code not found");
        }
        if device.pending_polls > 0 {
            device.pending_polls -= 1;
            return HttpResponse::json(
                200,
                &TokenResponse {
                    api_token: String::new(),
                    pending: true,
                },
            );
        }
        HttpResponse::json(
            200,
            &TokenResponse {
                api_token: device.token.clone(),
                pending: false,
            },
        )
    }

    fn app_status(&self, slug: &str) -> HttpResponse {
        let state = lock(&self.state);
        let Some(app) = state.apps.get(slug) else {
            return error(404, "App not found");
        };
        let latest_version = state.latest_version(slug).map(|v| VersionInfo {
            id: v.id,
            version: v.version.clone(),
            status: v.status,
            review_notes: String::new(),
        });
        HttpResponse::json(
            200,
            &AppStatus {
                app: app.clone(),
                status: app.status.clone(),
                latest_version,
            },
        )
    }

    fn create_app(&self, body: &RequestBody) -> HttpResponse {
        let params = match app_params(body) {
            Some(params) => params,
            None => return error(400, "Expected JSON body with an app object"),
        };
        let title = params["title"].as_str().unwrap_or_default();
        if title.is_empty() {
            return HttpResponse::json(422, &json!({"errors": ["Title can't be blank"]}));
        }

        let slug = slugify(title);
        let mut state = lock(&self.state);
        if state.apps.contains_key(&slug) {
            return HttpResponse::json(409, &json!({"errors": ["Slug has already been taken"]}));
        }

        let mut app = App {
            slug: slug.clone(),
            title: title.to_string(),
            status: "draft".to_string(),
            ..Default::default()
        };
        apply_params(&mut app, &params);
        state.apps.insert(slug, app.clone());
        HttpResponse::json(201, &app)
    }

    fn update_app(&self, slug: &str, body: &RequestBody) -> HttpResponse {
        let params = match app_params(body) {
            Some(params) => params,
            None => return error(400, "Expected JSON body with an app object"),
        };
        let mut state = lock(&self.state);
        let Some(app) = state.apps.get_mut(slug) else {
            return error(404, "App not found");
        };
        apply_params(app, &params);
        HttpResponse::json(200, &app.clone())
    }

    fn create_version(&self, slug: &str, body: &RequestBody) -> HttpResponse {
        let RequestBody::Multipart(form) = body else {
            return error(400, "Expected multipart body");
        };
        let Some(descriptor) = form.field("kyper_yml") else {
            return HttpResponse::json(422, &json!({"errors": ["kyper_yml is required"]}));
        };
        let Some(part) = form.files.iter().find(|f| f.name == "source_zip") else {
            return HttpResponse::json(422, &json!({"errors": ["source_zip is required"]}));
        };

        let (entries, size) = match read_package(&part.path) {
            Ok(read) => read,
            Err(e) => return error(422, &format!("Invalid package: {}", e)),
        };

        let version = serde_yaml::from_str::<Value>(descriptor)
            .ok()
            .and_then(|v| v["version"].as_str().map(str::to_string))
            .unwrap_or_else(|| "0.0.0".to_string());

        let mut state = lock(&self.state);
        if !state.apps.contains_key(slug) {
            return error(404, "App not found");
        }

        state.uploads.push(UploadRecord {
            slug: slug.to_string(),
            descriptor: descriptor.to_string(),
            file_name: part.file_name.clone(),
            entries,
            size,
        });

        let created = state.add_version(slug, &version);
        HttpResponse::json(
            201,
            &VersionResponse {
                id: created.id,
                app: slug.to_string(),
                version: created.version.clone(),
                status: created.status,
                message: "Version submitted for build".to_string(),
            },
        )
    }
}

impl HttpExecutor for MockServer {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.record(request);

        let (delay, injected) = lock(&self.failures).check(request.method, request.route());
        if let Some(delay) = delay {
            thread::sleep(delay);
        }
        match injected {
            Some(Injected::Status(status, msg)) => return Ok(error(status, &msg)),
            Some(Injected::Connection(msg)) => return Err(TransportError::ConnectionFailed(msg)),
            None => {}
        }

        Ok(self.handle_request(request))
    }
}

fn build_log(version: &mut MockVersion, cursor: u64) -> HttpResponse {
    let (text, complete) = version.advance();
    let bytes = text.as_bytes();
    let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(bytes.len());

    HttpResponse::json(
        200,
        &BuildLog {
            status: version.status,
            log: String::from_utf8_lossy(&bytes[start..]).into_owned(),
            cursor: bytes.len() as u64,
            complete,
        },
    )
}

fn read_package(path: &std::path::Path) -> Result<(Vec<String>, u64), zip::result::ZipError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let archive = zip::ZipArchive::new(file)?;
    let entries = archive.file_names().map(str::to_string).collect();
    Ok((entries, size))
}

fn app_params(body: &RequestBody) -> Option<Value> {
    let RequestBody::Json(bytes) = body else {
        return None;
    };
    let value: Value = serde_json::from_slice(bytes).ok()?;
    let app = value.get("app")?;
    app.is_object().then(|| app.clone())
}

fn apply_params(app: &mut App, params: &Value) {
    let text = |key: &str| params.get(key).and_then(Value::as_str).map(str::to_string);
    if let Some(v) = text("description") {
        app.description = v;
    }
    if let Some(v) = text("category") {
        app.category = v;
    }
    if let Some(v) = text("tagline") {
        app.tagline = v;
    }
    if let Some(v) = text("pricing_type") {
        app.pricing_type = v;
    }
    if let Some(v) = text("tech_stack") {
        app.tech_stack = v;
    }
}

fn query_param<'a>(query: Option<&'a str>, name: &str) -> Option<&'a str> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

fn error(status: u16, msg: &str) -> HttpResponse {
    HttpResponse::json(status, &json!({ "error": msg }))
}

fn message(id: u64, msg: &str) -> HttpResponse {
    HttpResponse::json(
        200,
        &MessageResponse {
            id,
            message: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authed(request: HttpRequest) -> HttpRequest {
        let mut request = request;
        request
            .headers
            .push(("Authorization".to_string(), "Bearer tok".to_string()));
        request
    }

    #[test]
    fn test_requests_recorded_with_query() {
        let server = MockServer::new();
        server
            .execute(&authed(HttpRequest::get("/api/v1/versions/5/build_log?cursor=12")))
            .unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].path, "/api/v1/versions/5/build_log");
        assert_eq!(requests[0].param("cursor"), Some("12"));
    }

    #[test]
    fn test_missing_auth_rejected() {
        let server = MockServer::new();
        server.add_app("demo", "Demo");

        let response = server.execute(&HttpRequest::get("/api/v1/apps/demo")).unwrap();
        assert_eq!(response.status, 401);
    }

    #[test]
    fn test_build_log_delta_from_cursor() {
        let server = MockServer::new();
        server.set_build_script(BuildScript::new(["abc", "def"], VersionStatus::Built));
        server.add_app("demo", "Demo");
        let id = lock(&server.state).add_version("demo", "1.0.0").id;

        let first = server
            .execute(&authed(HttpRequest::get(format!(
                "/api/v1/versions/{}/build_log?cursor=0",
                id
            ))))
            .unwrap();
        let page: BuildLog = serde_json::from_slice(&first.body).unwrap();
        assert_eq!(page.log, "abc");
        assert_eq!(page.cursor, 3);
        assert!(!page.complete);

        let second = server
            .execute(&authed(HttpRequest::get(format!(
                "/api/v1/versions/{}/build_log?cursor=3",
                id
            ))))
            .unwrap();
        let page: BuildLog = serde_json::from_slice(&second.body).unwrap();
        assert_eq!(page.log, "def");
        assert_eq!(page.cursor, 6);
        assert!(page.complete);
        assert_eq!(page.status, VersionStatus::Built);
    }

    #[test]
    fn test_injected_failure_then_success() {
        let server = MockServer::new();
        server.inject_failure(
            Method::Get,
            "/api/v1/me",
            FailureConfig::unavailable().with_fail_count(1),
        );

        let first = server.execute(&authed(HttpRequest::get("/api/v1/me"))).unwrap();
        assert_eq!(first.status, 503);
        let second = server.execute(&authed(HttpRequest::get("/api/v1/me"))).unwrap();
        assert_eq!(second.status, 200);
    }

    #[test]
    fn test_retry_only_for_failed_builds() {
        let server = MockServer::new();
        let id = server.add_version("demo", "1.0.0", VersionStatus::Built);

        let response = server
            .execute(&authed(HttpRequest::post(format!("/api/v1/versions/{}/retry", id))))
            .unwrap();
        assert_eq!(response.status, 422);
    }

    #[test]
    fn test_device_token_expired() {
        let server = MockServer::new();
        server.set_device_flow(DeviceFlow {
            expired: true,
            ..Default::default()
        });

        let response = server
            .execute(&HttpRequest::get("/api/v1/device/token?code=DEVICE-CODE-1"))
            .unwrap();
        assert_eq!(response.status, 404);
    }
}
