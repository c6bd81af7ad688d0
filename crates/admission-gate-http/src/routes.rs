// crates/admission-gate-http/src/routes.rs
// ============================================================================
// Module: Gateway Routes
// Description: Router assembly, observability endpoints, and acknowledgements.
// Purpose: Expose gateway state over HTTP behind the admission middleware.
// Dependencies: admission-gate-core, axum, tower-http
// ============================================================================

//! ## Overview
//! `/health` sits outside the admission middleware. Every other route runs
//! behind it, and the whole router sits inside a panic catcher. The
//! `/gateway/stats` and `/gateway/status` trees are protected by
//! authorization in the default configuration. `/gateway/flash` stays open so
//! a client can read the notice left by a redirect.
//!
//! Business handlers are out of scope here. The sensitive endpoints
//! (`/login`, `/register`, `/password-reset`, `/webhook`) answer with a plain
//! acknowledgement so the gateway can be exercised end to end.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use admission_gate_core::Admission;
use axum::Extension;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::middleware::from_fn_with_state;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use serde_json::Value;
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;

use crate::middleware::GatewayState;
use crate::middleware::admission_middleware;
use crate::middleware::internal_error;
use crate::middleware::panic_response;
use crate::session::RequestSession;
use crate::session::drain_flash;

// ============================================================================
// SECTION: Router Assembly
// ============================================================================

/// Routes served behind the admission middleware.
#[must_use]
pub fn gated_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/", get(landing))
        .route("/login", post(acknowledge))
        .route("/register", post(acknowledge))
        .route("/password-reset", post(acknowledge))
        .route("/webhook", post(acknowledge))
        .route("/gateway/flash", get(flash))
        .route("/gateway/stats/rate-limits", get(rate_limit_stats))
        .route("/gateway/stats/rate-limits/reset", post(reset_rate_limit_stats))
        .route("/gateway/status/ip-allowlist", get(allowlist_status))
}

/// Wraps `routes` in the admission middleware and adds `/health`.
///
/// Embedders can pass their own routes; they see the [`Admission`] and
/// [`RequestSession`] request extensions.
pub fn gateway_router(routes: Router<Arc<GatewayState>>, state: Arc<GatewayState>) -> Router {
    let gated = routes
        .layer(from_fn_with_state(Arc::clone(&state), admission_middleware))
        .with_state(state);
    Router::new()
        .route("/health", get(health))
        .merge(gated)
        .layer(CatchPanicLayer::custom(panic_response))
}

/// Builds the default gateway router.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    gateway_router(gated_routes(), state)
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// Liveness check.
async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Landing page; hands the session's CSRF token to the client.
async fn landing(Extension(admission): Extension<Admission>) -> Json<Value> {
    let csrf_token = admission.csrf_token.as_ref().map(|token| token.as_str().to_string());
    Json(json!({ "status": "ok", "csrf_token": csrf_token }))
}

/// Acknowledges an admitted request to a sensitive endpoint.
async fn acknowledge(uri: Uri, Extension(admission): Extension<Admission>) -> Json<Value> {
    Json(json!({
        "accepted": true,
        "path": uri.path(),
        "override_used": admission.override_used,
    }))
}

/// Drains pending flash notices.
async fn flash(
    State(state): State<Arc<GatewayState>>,
    Extension(session): Extension<RequestSession>,
) -> Response {
    let Some(session) = session.0 else {
        return Json(json!({ "notices": [] })).into_response();
    };
    match drain_flash(state.sessions.as_ref(), &session) {
        Ok(notices) => Json(json!({ "notices": notices })).into_response(),
        Err(err) => internal_error(&err),
    }
}

/// Rate-limit statistics snapshot.
async fn rate_limit_stats(State(state): State<Arc<GatewayState>>) -> Response {
    Json(state.pipeline.limiter().statistics()).into_response()
}

/// Clears rate-limit statistics.
async fn reset_rate_limit_stats(State(state): State<Arc<GatewayState>>) -> StatusCode {
    state.pipeline.limiter().reset_statistics();
    info!("rate limit statistics reset");
    StatusCode::NO_CONTENT
}

/// Allow-list status snapshot.
async fn allowlist_status(State(state): State<Arc<GatewayState>>) -> Response {
    Json(state.pipeline.allowlist().status()).into_response()
}
