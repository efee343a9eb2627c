//! Transport retry integration tests
//!
//! Exercises `ResilientTransport` through the mock service with injected
//! failures: safe requests are retried on 5xx only, everything else is sent
//! exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use kyper_cli::host::{
    ApiClient, ClientError, HttpRequest, Method, ResilientTransport, RetryPolicy, TransportError,
};
use kyper_cli::mock::{FailureConfig, MockServer};

// =============================================================================
// Test Helpers
// =============================================================================

fn transport(server: &MockServer, attempts: usize) -> ResilientTransport {
    ResilientTransport::new(
        Arc::new(server.clone()),
        Some("tok_test".to_string()),
        RetryPolicy::immediate(attempts),
    )
}

fn seeded() -> MockServer {
    let server = MockServer::new();
    server.add_app("demo-app", "Demo App");
    server
}

// =============================================================================
// Safe Requests
// =============================================================================

#[test]
fn test_get_recovers_after_two_unavailable() {
    let server = seeded();
    server.inject_failure(
        Method::Get,
        "/api/v1/apps/demo-app",
        FailureConfig::unavailable().with_fail_count(2),
    );

    let response = transport(&server, 3)
        .execute(&HttpRequest::get("/api/v1/apps/demo-app"))
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(server.requests_to(Method::Get, "/api/v1/apps/demo-app").len(), 3);
}

#[test]
fn test_get_returns_last_response_when_exhausted() {
    let server = seeded();
    server.inject_failure(Method::Get, "/api/v1/apps/demo-app", FailureConfig::unavailable());

    let response = transport(&server, 3)
        .execute(&HttpRequest::get("/api/v1/apps/demo-app"))
        .unwrap();

    assert_eq!(response.status, 503);
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn test_client_errors_are_final() {
    let server = seeded();

    let response = transport(&server, 3)
        .execute(&HttpRequest::get("/api/v1/apps/missing"))
        .unwrap();

    assert_eq!(response.status, 404);
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_connection_failure_not_retried() {
    let server = seeded();
    server.inject_failure(Method::Get, "/api/v1/apps/demo-app", FailureConfig::connection());

    let err = transport(&server, 3)
        .execute(&HttpRequest::get("/api/v1/apps/demo-app"))
        .unwrap_err();

    assert!(matches!(err, TransportError::ConnectionFailed(_)));
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_policy_delays_are_honoured() {
    let server = seeded();
    server.inject_failure(
        Method::Get,
        "/api/v1/apps/demo-app",
        FailureConfig::unavailable().with_fail_count(1),
    );
    let transport = ResilientTransport::new(
        Arc::new(server.clone()),
        Some("tok_test".to_string()),
        RetryPolicy::new(vec![Duration::ZERO, Duration::from_millis(30)]),
    );

    let started = Instant::now();
    let response = transport
        .execute(&HttpRequest::get("/api/v1/apps/demo-app"))
        .unwrap();

    assert_eq!(response.status, 200);
    assert!(started.elapsed() >= Duration::from_millis(30));
}

// =============================================================================
// Unsafe Requests
// =============================================================================

#[test]
fn test_post_sent_once_on_server_error() {
    let server = seeded();
    server.inject_failure(Method::Post, "/api/v1/versions", FailureConfig::status(500, "boom"));

    let response = transport(&server, 3)
        .execute(&HttpRequest::post("/api/v1/versions/1/retry"))
        .unwrap();

    assert_eq!(response.status, 500);
    assert_eq!(server.requests().len(), 1);
}

#[test]
fn test_delete_sent_once() {
    let server = seeded();
    server.inject_failure(Method::Delete, "/api/v1/versions", FailureConfig::unavailable());

    transport(&server, 3)
        .execute(&HttpRequest::delete("/api/v1/versions/1"))
        .unwrap();

    assert_eq!(server.requests().len(), 1);
}

// =============================================================================
// Identity Headers
// =============================================================================

#[test]
fn test_headers_on_every_attempt() {
    let server = seeded();
    server.inject_failure(
        Method::Get,
        "/api/v1/apps/demo-app",
        FailureConfig::unavailable().with_fail_count(1),
    );

    transport(&server, 2)
        .execute(&HttpRequest::get("/api/v1/apps/demo-app"))
        .unwrap();

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert_eq!(request.authorization.as_deref(), Some("Bearer tok_test"));
        assert_eq!(
            request.user_agent.as_deref(),
            Some(format!("kyper-cli/{}", env!("CARGO_PKG_VERSION")).as_str())
        );
    }
}

#[test]
fn test_no_authorization_without_token() {
    let server = seeded();
    let transport = ResilientTransport::new(Arc::new(server.clone()), None, RetryPolicy::none());

    let response = transport
        .execute(&HttpRequest::get("/api/v1/apps/demo-app"))
        .unwrap();

    assert_eq!(response.status, 401);
    assert!(server.requests()[0].authorization.is_none());
    assert!(server.requests()[0].user_agent.is_some());
}

#[test]
fn test_empty_token_treated_as_absent() {
    let server = seeded();
    let transport =
        ResilientTransport::new(Arc::new(server.clone()), Some(String::new()), RetryPolicy::none());

    assert!(!transport.has_token());
}

// =============================================================================
// Typed Client
// =============================================================================

#[test]
fn test_client_surfaces_api_error_after_retries() {
    let server = seeded();
    server.inject_failure(Method::Get, "/api/v1/apps/demo-app/status", FailureConfig::unavailable());
    let client = ApiClient::with_executor(
        Arc::new(server.clone()),
        Some("tok_test".to_string()),
        RetryPolicy::immediate(3),
    );

    let err = client.app_status("demo-app").unwrap_err();

    match &err {
        ClientError::Api(api) => assert_eq!(api.status, 503),
        other => panic!("expected api error, got {:?}", other),
    }
    assert_eq!(server.requests().len(), 3);
}

#[test]
fn test_client_not_found_exit_code() {
    let server = seeded();
    let client = ApiClient::with_executor(
        Arc::new(server.clone()),
        Some("tok_test".to_string()),
        RetryPolicy::immediate(3),
    );

    let err = client.get_app("missing").unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.exit_code(), 4);
}
