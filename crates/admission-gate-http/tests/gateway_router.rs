// crates/admission-gate-http/tests/gateway_router.rs
// ============================================================================
// Module: Gateway Router Tests
// Description: End-to-end admission through the axum router.
// Purpose: Verify HTTP mapping of every gateway verdict.
// Dependencies: admission-gate-{core, http}, axum, tower
// ============================================================================

//! ## Overview
//! Drives the full router in-process: sessions and CSRF tokens flow through
//! cookies and headers, and client addresses come from `MockConnectInfo`.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    reason = "Test-only assertions and helpers are permitted."
)]

mod common;

use admission_gate_core::SubjectId;
use admission_gate_http::bind_subject;
use admission_gate_http::routes::gated_routes;
use admission_gate_http::routes::gateway_router;
use axum::body::Body;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::LOCATION;
use axum::http::header::RETRY_AFTER;
use axum::routing::get as get_route;

use crate::common::BROWSER_IP;
use crate::common::OUTSIDE_IP;
use crate::common::OVERRIDE_SECRET;
use crate::common::STRIPE_IP;
use crate::common::body_bytes;
use crate::common::body_json;
use crate::common::csrf_token;
use crate::common::get;
use crate::common::open_session;
use crate::common::post;
use crate::common::send;
use crate::common::send_via;
use crate::common::server;
use crate::common::session_cookie;
use crate::common::session_id;
use crate::common::webhook;

// ============================================================================
// SECTION: Sessions and CSRF
// ============================================================================

#[tokio::test]
async fn landing_mints_session_and_token() {
    let server = server();
    let response = send(&server, BROWSER_IP, get("/", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let set_cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap().to_string();
    assert!(set_cookie.contains("HttpOnly"));
    assert!(set_cookie.contains("SameSite=Lax"));
    let header_token = csrf_token(&response).unwrap();
    let body = body_json(response).await;
    assert_eq!(body["csrf_token"], header_token.as_str());
}

#[tokio::test]
async fn returning_session_keeps_token_without_new_cookie() {
    let server = server();
    let (cookie, token) = open_session(&server, BROWSER_IP).await;
    let response = send(&server, BROWSER_IP, get("/", Some(&cookie))).await;
    assert!(session_cookie(&response).is_none());
    assert_eq!(csrf_token(&response).as_deref(), Some(token.as_str()));
}

#[tokio::test]
async fn csrf_header_is_single_use() {
    let server = server();
    let (cookie, token) = open_session(&server, BROWSER_IP).await;

    let accepted = send(&server, BROWSER_IP, post("/register", Some(&cookie), Some(&token))).await;
    assert_eq!(accepted.status(), StatusCode::OK);
    let rotated = csrf_token(&accepted).unwrap();
    assert_ne!(rotated, token);

    let replayed = send(&server, BROWSER_IP, post("/register", Some(&cookie), Some(&token))).await;
    assert_eq!(replayed.status(), StatusCode::FORBIDDEN);
    assert!(body_bytes(replayed).await.is_empty());
}

#[tokio::test]
async fn csrf_form_field_is_accepted() {
    let server = server();
    let (cookie, token) = open_session(&server, BROWSER_IP).await;
    let request = Request::builder()
        .method("POST")
        .uri("/register")
        .header("cookie", &cookie)
        .header("content-type", "application/x-www-form-urlencoded")
        .body(Body::from(format!("email=a%40example.com&csrf_token={token}")))
        .unwrap();
    let response = send(&server, BROWSER_IP, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["path"], "/register");
}

#[tokio::test]
async fn missing_csrf_token_is_forbidden() {
    let server = server();
    let (cookie, _) = open_session(&server, BROWSER_IP).await;
    let response = send(&server, BROWSER_IP, post("/register", Some(&cookie), None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let cookieless = send(&server, BROWSER_IP, post("/register", None, None)).await;
    assert_eq!(cookieless.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn oversized_form_is_rejected() {
    let server = server();
    let (cookie, _) = open_session(&server, BROWSER_IP).await;
    let body = "a".repeat(70 * 1024);
    let request = Request::builder()
        .method("POST")
        .uri("/register")
        .header("cookie", &cookie)
        .header("content-type", "application/x-www-form-urlencoded")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();
    let response = send(&server, BROWSER_IP, request).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

#[tokio::test]
async fn sixth_login_redirects_with_flash() {
    let server = server();
    let (cookie, mut token) = open_session(&server, BROWSER_IP).await;
    for _ in 0 .. 5 {
        let response = send(&server, BROWSER_IP, post("/login", Some(&cookie), Some(&token))).await;
        assert_eq!(response.status(), StatusCode::OK);
        token = csrf_token(&response).unwrap();
    }

    let sixth = send(&server, BROWSER_IP, post("/login", Some(&cookie), Some(&token))).await;
    assert_eq!(sixth.status(), StatusCode::SEE_OTHER);
    assert_eq!(sixth.headers().get(LOCATION).unwrap(), "/");

    let flash = send(&server, BROWSER_IP, get("/gateway/flash", Some(&cookie))).await;
    let body = body_json(flash).await;
    assert_eq!(body["notices"][0]["category"], "warning");
    assert_eq!(body["notices"][0]["message"], "Too many attempts. Please try again later.");

    let drained = send(&server, BROWSER_IP, get("/gateway/flash", Some(&cookie))).await;
    assert_eq!(body_json(drained).await["notices"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn login_limit_is_per_client() {
    let server = server();
    for _ in 0 .. 6 {
        let _ = send(&server, BROWSER_IP, post("/login", None, None)).await;
    }
    let other = send(&server, OUTSIDE_IP, post("/login", None, None)).await;
    assert_eq!(other.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn cookieless_throttle_still_delivers_flash() {
    let server = server();
    for _ in 0 .. 5 {
        let response = send(&server, BROWSER_IP, post("/login", None, None)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
    let sixth = send(&server, BROWSER_IP, post("/login", None, None)).await;
    assert_eq!(sixth.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&sixth).unwrap();
    let flash = send(&server, BROWSER_IP, get("/gateway/flash", Some(&cookie))).await;
    assert_eq!(body_json(flash).await["notices"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn throttled_login_is_rejected_before_body_is_read() {
    let server = server();
    for _ in 0 .. 5 {
        let _ = send(&server, BROWSER_IP, post("/login", None, None)).await;
    }
    let body = "a".repeat(70 * 1024);
    let request = Request::builder()
        .method("POST")
        .uri("/login")
        .header("content-type", "application/x-www-form-urlencoded")
        .header("content-length", body.len())
        .body(Body::from(body))
        .unwrap();
    let response = send(&server, BROWSER_IP, request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn webhook_flood_gets_json_429() {
    let server = server();
    for _ in 0 .. 10 {
        let response = send(&server, STRIPE_IP, webhook("curl/8.0", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = send(&server, STRIPE_IP, webhook("curl/8.0", None)).await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 =
        response.headers().get(RETRY_AFTER).unwrap().to_str().unwrap().parse().unwrap();
    assert!((1 ..= 60).contains(&retry_after));
    let body = body_json(response).await;
    assert_eq!(body["error"], "Rate limit exceeded");
}

#[tokio::test]
async fn trusted_agent_is_not_throttled() {
    let server = server();
    for _ in 0 .. 15 {
        let response = send(&server, STRIPE_IP, webhook("Stripe/1.0", None)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// ============================================================================
// SECTION: Webhook Allow-List
// ============================================================================

#[tokio::test]
async fn unknown_webhook_source_is_forbidden() {
    let server = server();
    let response = send(&server, OUTSIDE_IP, webhook("GenericBot", None)).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn override_secret_admits_unknown_source() {
    let server = server();
    let response = send(&server, OUTSIDE_IP, webhook("GenericBot", Some(OVERRIDE_SECRET))).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["override_used"], true);

    let wrong_secret = webhook("GenericBot", Some("not-the-secret-value"));
    let wrong = send(&server, OUTSIDE_IP, wrong_secret).await;
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn published_source_is_admitted() {
    let server = server();
    let response = send(&server, STRIPE_IP, webhook("Stripe/1.0", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["override_used"], false);
}

// ============================================================================
// SECTION: Observability Endpoints
// ============================================================================

#[tokio::test]
async fn stats_require_login() {
    let server = server();
    let response = send(&server, BROWSER_IP, get("/gateway/stats/rate-limits", None)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let cookie = session_cookie(&response).unwrap();
    let flash = send(&server, BROWSER_IP, get("/gateway/flash", Some(&cookie))).await;
    let body = body_json(flash).await;
    assert_eq!(body["notices"][0]["category"], "info");
}

#[tokio::test]
async fn stats_forbid_subjects_without_grant() {
    let server = server();
    let (cookie, _) = open_session(&server, BROWSER_IP).await;
    let sessions = server.state().sessions.as_ref();
    bind_subject(sessions, &session_id(&cookie), &SubjectId::new("mallory")).unwrap();
    let request = get("/gateway/status/ip-allowlist", Some(&cookie));
    let response = send(&server, BROWSER_IP, request).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let flash = send(&server, BROWSER_IP, get("/gateway/flash", Some(&cookie))).await;
    assert_eq!(body_json(flash).await["notices"][0]["category"], "danger");
}

#[tokio::test]
async fn analyst_reads_but_cannot_reset() {
    let server = server();
    let _ = send(&server, STRIPE_IP, webhook("curl/8.0", None)).await;
    let (cookie, token) = open_session(&server, BROWSER_IP).await;
    let sessions = server.state().sessions.as_ref();
    bind_subject(sessions, &session_id(&cookie), &SubjectId::new("dana")).unwrap();

    let stats = send(&server, BROWSER_IP, get("/gateway/stats/rate-limits", Some(&cookie))).await;
    assert_eq!(stats.status(), StatusCode::OK);
    let request = get("/gateway/status/ip-allowlist", Some(&cookie));
    let status = send(&server, BROWSER_IP, request).await;
    assert_eq!(status.status(), StatusCode::OK);
    let body = body_json(status).await;
    assert_eq!(body["range_count"], 2);
    assert_eq!(body["degraded"], false);

    let reset = post("/gateway/stats/rate-limits/reset", Some(&cookie), Some(&token));
    let response = send(&server, BROWSER_IP, reset).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn admin_resets_statistics() {
    let server = server();
    for _ in 0 .. 11 {
        let _ = send(&server, STRIPE_IP, webhook("curl/8.0", None)).await;
    }
    let (cookie, token) = open_session(&server, BROWSER_IP).await;
    let sessions = server.state().sessions.as_ref();
    bind_subject(sessions, &session_id(&cookie), &SubjectId::new("ops-lead")).unwrap();

    let before = send(&server, BROWSER_IP, get("/gateway/stats/rate-limits", Some(&cookie))).await;
    let snapshot = body_json(before).await;
    assert_eq!(snapshot["total_blocked"], 1);

    let reset = post("/gateway/stats/rate-limits/reset", Some(&cookie), Some(&token));
    let response = send(&server, BROWSER_IP, reset).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let after = send(&server, BROWSER_IP, get("/gateway/stats/rate-limits", Some(&cookie))).await;
    assert_eq!(body_json(after).await["total_blocked"], 0);
}

// ============================================================================
// SECTION: Health and Failures
// ============================================================================

#[tokio::test]
async fn health_bypasses_admission() {
    let server = server();
    let response = send(&server, OUTSIDE_IP, get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none());
    assert_eq!(body_json(response).await["status"], "ok");
}

/// Handler that always panics.
async fn boom() -> &'static str {
    panic!("handler exploded")
}

#[tokio::test]
async fn handler_panic_becomes_opaque_500() {
    let server = server();
    let router = gateway_router(
        gated_routes().route("/boom", get_route(boom)),
        server.state().clone(),
    );
    let response = send_via(router, BROWSER_IP, get("/boom", None)).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"], "internal server error");
    assert_eq!(body["tracking_id"].as_str().unwrap().len(), 32);
    assert!(!body.to_string().contains("exploded"));
}
