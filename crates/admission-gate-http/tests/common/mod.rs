// crates/admission-gate-http/tests/common/mod.rs
// ============================================================================
// Module: Common HTTP Test Fixtures
// Description: Gateway servers, request builders, and response readers.
// Purpose: Drive the router in-process with simulated client addresses.
// Dependencies: admission-gate-{config, core, http}, axum, tower
// ============================================================================

//! ## Overview
//! Requests are sent with `tower::ServiceExt::oneshot` and a
//! `MockConnectInfo` layer standing in for the peer address. Servers use a
//! static webhook range source so allow-list state is deterministic.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::sync::Arc;

use admission_gate_config::AdmissionGateConfig;
use admission_gate_core::RangeCategory;
use admission_gate_core::RangeSource;
use admission_gate_core::SessionId;
use admission_gate_core::StaticRangeSource;
use admission_gate_http::GatewayServer;
use axum::Router;
use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::Request;
use axum::http::Response;
use axum::http::header::COOKIE;
use axum::http::header::SET_COOKIE;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Override secret configured for test servers.
pub const OVERRIDE_SECRET: &str = "override-secret-for-tests-0123";
/// Published webhook address.
pub const STRIPE_IP: [u8; 4] = [3, 18, 12, 63];
/// Address outside every published range.
pub const OUTSIDE_IP: [u8; 4] = [203, 0, 113, 7];
/// Ordinary browser client.
pub const BROWSER_IP: [u8; 4] = [198, 51, 100, 20];

/// Configuration shared by the router tests.
pub const TEST_CONFIG: &str = r#"
[ip_allowlist]
filter_enabled = true
override_secret = "override-secret-for-tests-0123"

[[policy_store.seed.assignments]]
member = "ops-lead"
role = "admin"

[[policy_store.seed.assignments]]
member = "dana"
role = "analyst"

[[policy_store.seed.rules]]
role = "analyst"
resource = "gateway"
action = "read"

[audit]
sink = "none"
"#;

// ============================================================================
// SECTION: Servers
// ============================================================================

/// Parses a configuration without consulting the process environment.
pub fn config(content: &str) -> AdmissionGateConfig {
    AdmissionGateConfig::from_toml_with_env(content, &|_: &str| -> Option<String> { None })
        .unwrap()
}

/// Builds a server whose allow-list holds the published webhook address.
pub fn server() -> GatewayServer {
    server_with(TEST_CONFIG)
}

/// Builds a server from `content` with a refreshed static allow-list.
pub fn server_with(content: &str) -> GatewayServer {
    let source: Arc<dyn RangeSource> = Arc::new(StaticRangeSource::new(
        "webhooks",
        RangeCategory::Webhooks,
        vec!["3.18.12.63/32".parse().unwrap(), "3.130.192.0/26".parse().unwrap()],
    ));
    let server = GatewayServer::with_range_sources(config(content), vec![source]).unwrap();
    assert!(server.state().pipeline.allowlist().refresh().replaced());
    server
}

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Sends `request` through `router` from `peer`.
pub async fn send_via(router: Router, peer: [u8; 4], request: Request<Body>) -> Response<Body> {
    let addr = SocketAddr::from((Ipv4Addr::from(peer), 40_000));
    router.layer(MockConnectInfo(addr)).oneshot(request).await.unwrap()
}

/// Sends `request` through the server's default router from `peer`.
pub async fn send(
    server: &GatewayServer,
    peer: [u8; 4],
    request: Request<Body>,
) -> Response<Body> {
    send_via(server.router(), peer, request).await
}

/// Builds a GET request, optionally carrying a session cookie.
pub fn get(path: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

/// Builds a POST request with optional cookie and CSRF header.
pub fn post(path: &str, cookie: Option<&str>, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(path);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    if let Some(token) = token {
        builder = builder.header("x-csrf-token", token);
    }
    builder.body(Body::empty()).unwrap()
}

/// Builds a webhook POST with the given user agent.
pub fn webhook(user_agent: &str, override_secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("user-agent", user_agent)
        .header("content-type", "application/json");
    if let Some(secret) = override_secret {
        builder = builder.header("x-stripe-override", secret);
    }
    builder.body(Body::from(r#"{"type":"invoice.paid"}"#)).unwrap()
}

// ============================================================================
// SECTION: Responses
// ============================================================================

/// Returns the `name=value` pair of the session cookie set by a response.
pub fn session_cookie(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("ag_session="))
        .and_then(|value| value.split(';').next())
        .map(ToString::to_string)
}

/// Returns the session id inside a `name=value` cookie pair.
pub fn session_id(cookie: &str) -> SessionId {
    SessionId::new(cookie.trim_start_matches("ag_session="))
}

/// Returns the CSRF token header of a response.
pub fn csrf_token(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("x-csrf-token")
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
}

/// Reads the full response body.
pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

/// Reads the response body as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Opens a browser session; returns the cookie pair and its CSRF token.
pub async fn open_session(server: &GatewayServer, peer: [u8; 4]) -> (String, String) {
    let response = send(server, peer, get("/", None)).await;
    assert_eq!(response.status(), 200);
    let cookie = session_cookie(&response).unwrap();
    let token = csrf_token(&response).unwrap();
    (cookie, token)
}
