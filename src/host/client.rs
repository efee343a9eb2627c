//! Typed API client
//!
//! One method per remote endpoint. Every call goes through the
//! `ResilientTransport`; responses with status >= 400 become `ApiError`.

use std::path::Path;
use std::sync::Arc;

use kyper_api::{
    ApiError, App, AppParams, AppStatus, BuildLog, DeviceGrant, MessageResponse, TokenResponse,
    User, VersionResponse, API_PREFIX,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::transport::{
    HttpExecutor, HttpRequest, HttpResponse, MultipartForm, ReqwestExecutor, ResilientTransport,
    RetryPolicy, TransportError,
};
use crate::config::ClientConfig;

/// API client errors
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    /// The API error, if the server answered with one
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.api().is_some_and(ApiError::is_not_found)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.api().is_some_and(ApiError::is_unauthorized)
    }

    pub fn is_conflict(&self) -> bool {
        self.api().is_some_and(ApiError::is_conflict)
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Api(err) if err.is_unauthorized() => 3,
            ClientError::Api(err) if err.is_not_found() => 4,
            ClientError::Api(_) => 1,
            ClientError::Transport(_) => 8,
            ClientError::Decode { .. } => 8,
        }
    }
}

/// Result type for API calls
pub type ClientResult<T> = Result<T, ClientError>;

/// Client for the build service API
#[derive(Clone)]
pub struct ApiClient {
    transport: ResilientTransport,
}

impl ApiClient {
    /// Create a client over the given transport
    pub fn new(transport: ResilientTransport) -> Self {
        Self { transport }
    }

    /// Create a client over any executor with the given credential
    pub fn with_executor(
        executor: Arc<dyn HttpExecutor>,
        token: Option<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self::new(ResilientTransport::new(executor, token, policy))
    }

    /// Create a production client from resolved configuration
    pub fn from_config(config: &ClientConfig) -> ClientResult<Self> {
        let executor = ReqwestExecutor::new(config.host.clone(), config.request_timeout())?;
        Ok(Self::with_executor(
            Arc::new(executor),
            config.api_token.clone(),
            config.retry_policy(),
        ))
    }

    /// Same transport, different credential
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self::new(self.transport.with_token(Some(token.into())))
    }

    pub fn has_token(&self) -> bool {
        self.transport.has_token()
    }

    // === Auth ===

    pub fn device_authorize(&self) -> ClientResult<DeviceGrant> {
        self.send(HttpRequest::post(api_path("/device/authorize")))
    }

    pub fn device_token(&self, code: &str) -> ClientResult<TokenResponse> {
        self.send(HttpRequest::get(api_path(&format!(
            "/device/token?code={}",
            encode_query(code)
        ))))
    }

    pub fn me(&self) -> ClientResult<User> {
        self.send(HttpRequest::get(api_path("/me")))
    }

    // === Apps ===

    pub fn get_app(&self, slug: &str) -> ClientResult<App> {
        self.send(HttpRequest::get(api_path(&format!("/apps/{}", slug))))
    }

    pub fn app_status(&self, slug: &str) -> ClientResult<AppStatus> {
        self.send(HttpRequest::get(api_path(&format!("/apps/{}/status", slug))))
    }

    pub fn create_app(&self, params: &AppParams) -> ClientResult<App> {
        let request = HttpRequest::post(api_path("/apps")).json(&params.to_body())?;
        self.send(request)
    }

    pub fn update_app(&self, slug: &str, params: &AppParams) -> ClientResult<App> {
        let request =
            HttpRequest::patch(api_path(&format!("/apps/{}", slug))).json(&params.to_body())?;
        self.send(request)
    }

    // === Versions ===

    /// Upload a package with the raw descriptor text
    pub fn create_version(
        &self,
        slug: &str,
        descriptor: &str,
        archive: &Path,
    ) -> ClientResult<VersionResponse> {
        let file_name = archive
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source.zip".to_string());

        let form = MultipartForm::new()
            .text("kyper_yml", descriptor)
            .file("source_zip", file_name, archive);

        let request =
            HttpRequest::post(api_path(&format!("/apps/{}/versions", slug))).multipart(form);
        self.send(request)
    }

    pub fn build_log(&self, version_id: u64, cursor: u64) -> ClientResult<BuildLog> {
        self.send(HttpRequest::get(api_path(&format!(
            "/versions/{}/build_log?cursor={}",
            version_id, cursor
        ))))
    }

    pub fn retry_version(&self, version_id: u64) -> ClientResult<MessageResponse> {
        self.send(HttpRequest::post(api_path(&format!(
            "/versions/{}/retry",
            version_id
        ))))
    }

    pub fn cancel_version(&self, version_id: u64) -> ClientResult<MessageResponse> {
        self.send(HttpRequest::post(api_path(&format!(
            "/versions/{}/cancel",
            version_id
        ))))
    }

    pub fn delete_version(&self, version_id: u64) -> ClientResult<MessageResponse> {
        self.send(HttpRequest::delete(api_path(&format!("/versions/{}", version_id))))
    }

    // === Internal Helpers ===

    fn send<T: DeserializeOwned>(&self, request: HttpRequest) -> ClientResult<T> {
        let response = self.transport.execute(&request)?;
        debug!(
            method = request.method.as_str(),
            path = %request.route(),
            status = response.status,
            "api response"
        );
        decode(&request, response)
    }
}

fn decode<T: DeserializeOwned>(request: &HttpRequest, response: HttpResponse) -> ClientResult<T> {
    if response.status >= 400 {
        return Err(ApiError::parse(response.status, &response.body).into());
    }

    let body: &[u8] = if response.body.is_empty() {
        b"{}"
    } else {
        &response.body
    };

    serde_json::from_slice(body).map_err(|source| ClientError::Decode {
        path: request.route().to_string(),
        source,
    })
}

fn api_path(rest: &str) -> String {
    format!("{}{}", API_PREFIX, rest)
}

/// Percent-encode a query value (RFC 3986 unreserved characters pass through)
fn encode_query(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}
