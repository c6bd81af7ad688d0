// crates/admission-gate-http/src/middleware.rs
// ============================================================================
// Module: Admission Middleware
// Description: axum middleware running the gateway pipeline per request.
// Purpose: Translate HTTP requests into gateway decisions and back.
// Dependencies: admission-gate-core, axum, serde_json, tracing, url
// ============================================================================

//! ## Overview
//! [`admission_middleware`] runs in front of every gated route. It resolves
//! the client address and session cookie, and it reads the CSRF token from
//! the `X-CSRF-Token` header or a buffered url-encoded form body. Rate
//! limiting runs first through [`GatewayPipeline::throttle`], before any body
//! is read; the remaining stages run through [`GatewayPipeline::admit`]. The
//! verdict maps onto HTTP as follows:
//!
//! | Verdict | Response |
//! |---|---|
//! | proceed | handler response, plus `X-CSRF-Token` when a token applies |
//! | browser throttle, unauthenticated, forbidden | 303 to the landing path with a flash notice |
//! | machine throttle | 429 `{"error": ...}` with `Retry-After` |
//! | CSRF or webhook source failure | 403 with an empty body |
//! | session store failure | 500 with an opaque tracking id |
//!
//! Security posture: headers and bodies are untrusted. `X-Forwarded-For` is
//! honored only when the deployment opts in.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::any::Any;
use std::fmt::Display;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gate_core::Admission;
use admission_gate_core::Anonymous;
use admission_gate_core::GatewayOutcome;
use admission_gate_core::GatewayPipeline;
use admission_gate_core::GatewayRequest;
use admission_gate_core::Rejection;
use admission_gate_core::SessionId;
use admission_gate_core::SessionStore;
use admission_gate_core::is_safe_method;
use admission_gate_core::normalize_ip;
use admission_gate_core::runtime::csrf::CSRF_BYPASS_HEADER;
use admission_gate_core::runtime::csrf::CSRF_FORM_FIELD;
use admission_gate_core::runtime::csrf::CSRF_HEADER;
use admission_gate_core::runtime::pipeline::DEFAULT_LANDING_PATH;
use admission_gate_core::runtime::pipeline::OVERRIDE_HEADER;
use axum::Json;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::CONTENT_LENGTH;
use axum::http::header::CONTENT_TYPE;
use axum::http::header::RETRY_AFTER;
use axum::http::header::SET_COOKIE;
use axum::http::header::USER_AGENT;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Redirect;
use axum::response::Response;
use rand::RngCore;
use rand::rngs::OsRng;
use serde_json::json;
use tracing::error;
use tracing::warn;

use crate::session::FlashNotice;
use crate::session::RequestSession;
use crate::session::SessionCookie;
use crate::session::SessionIdentity;
use crate::session::new_session_id;
use crate::session::push_flash;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Header carrying the original client address behind a proxy.
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
/// Media type of HTML form posts.
const FORM_MEDIA_TYPE: &str = "application/x-www-form-urlencoded";

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared state for the admission middleware and gateway routes.
pub struct GatewayState {
    /// Admission pipeline.
    pub pipeline: Arc<GatewayPipeline>,
    /// Session store shared with the CSRF guard.
    pub sessions: Arc<dyn SessionStore>,
    /// Session cookie settings.
    pub cookie: SessionCookie,
    /// Maximum buffered request body, in bytes.
    pub max_body_bytes: usize,
    /// Take the client address from `X-Forwarded-For`.
    pub trust_forwarded_for: bool,
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Runs the admission pipeline ahead of the wrapped handlers.
pub async fn admission_middleware(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().as_str().to_string();
    let path = request.uri().path().to_string();
    let safe = is_safe_method(&method);
    let client_ip = normalize_ip(client_address(&state, peer, request.headers()));
    let client = client_ip.to_string();
    let user_agent = header_string(request.headers(), USER_AGENT.as_str());
    let override_secret = header_string(request.headers(), OVERRIDE_HEADER);
    let csrf_bypass = header_string(request.headers(), CSRF_BYPASS_HEADER)
        .is_some_and(|value| value == "1" || value.eq_ignore_ascii_case("true"));

    let existing = state.cookie.read(request.headers());
    let minted = if existing.is_none() && safe { Some(new_session_id()) } else { None };
    let session = existing.or_else(|| minted.clone());

    // Throttle before buffering the body or touching the session store.
    let throttled = {
        let attempt = GatewayRequest {
            method: &method,
            path: &path,
            client: &client,
            client_ip: Some(client_ip),
            user_agent: user_agent.as_deref(),
            session: session.as_ref(),
            principal: &Anonymous,
            csrf_token: None,
            csrf_bypass,
            override_secret: override_secret.as_deref(),
        };
        state.pipeline.throttle(&attempt)
    };
    if let Some(rejection) = throttled {
        return reject(&state, &rejection, session, minted);
    }

    let (request, csrf_token) =
        match extract_csrf_token(request, safe, state.max_body_bytes).await {
            Ok(extracted) => extracted,
            Err(response) => return response,
        };
    let identity = match SessionIdentity::load(state.sessions.as_ref(), session.as_ref()) {
        Ok(identity) => identity,
        Err(err) => return internal_error(&err),
    };

    let outcome = {
        let gateway_request = GatewayRequest {
            method: &method,
            path: &path,
            client: &client,
            client_ip: Some(client_ip),
            user_agent: user_agent.as_deref(),
            session: session.as_ref(),
            principal: &identity,
            csrf_token: csrf_token.as_deref(),
            csrf_bypass,
            override_secret: override_secret.as_deref(),
        };
        state.pipeline.admit(&gateway_request)
    };

    match outcome {
        Ok(GatewayOutcome::Proceed(admission)) => {
            proceed(&state, request, next, admission, session, minted).await
        }
        Ok(GatewayOutcome::Reject(rejection)) => reject(&state, &rejection, session, minted),
        Err(err) => internal_error(&err),
    }
}

/// Forwards an admitted request and decorates the response.
async fn proceed(
    state: &GatewayState,
    mut request: Request<Body>,
    next: Next,
    admission: Admission,
    session: Option<SessionId>,
    minted: Option<SessionId>,
) -> Response {
    let token = admission.csrf_token.clone();
    request.extensions_mut().insert(RequestSession(session));
    request.extensions_mut().insert(admission);
    let mut response = next.run(request).await;
    if let Some(token) = token
        && let Ok(value) = HeaderValue::from_str(token.as_str())
    {
        response.headers_mut().insert(HeaderName::from_static(CSRF_HEADER), value);
    }
    if let Some(session) = minted {
        set_session_cookie(&mut response, &state.cookie, &session);
    }
    response
}

/// Maps a rejection onto its HTTP response.
fn reject(
    state: &GatewayState,
    rejection: &Rejection,
    session: Option<SessionId>,
    minted: Option<SessionId>,
) -> Response {
    match rejection {
        Rejection::RateLimitJson {
            message,
            retry_after,
        } => {
            let mut response =
                (StatusCode::TOO_MANY_REQUESTS, Json(json!({ "error": message }))).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after_secs(*retry_after)));
            response
        }
        Rejection::CsrfFailed(_) | Rejection::WebhookSourceDenied => {
            StatusCode::FORBIDDEN.into_response()
        }
        Rejection::RateLimitRedirect {
            ..
        }
        | Rejection::Unauthenticated {
            ..
        }
        | Rejection::Forbidden {
            ..
        } => redirect_with_flash(state, rejection, session, minted),
    }
}

/// Stores the rejection notice and redirects to the landing path.
fn redirect_with_flash(
    state: &GatewayState,
    rejection: &Rejection,
    session: Option<SessionId>,
    minted: Option<SessionId>,
) -> Response {
    let (session, minted) = match session {
        Some(session) => (session, minted),
        None => {
            let fresh = new_session_id();
            (fresh.clone(), Some(fresh))
        }
    };
    if let Some(message) = rejection.flash_notice() {
        let notice = FlashNotice::new(flash_category(rejection), message);
        if let Err(err) = push_flash(state.sessions.as_ref(), &session, notice) {
            warn!(error = %err, "failed to store flash notice");
        }
    }
    let location = rejection.location().unwrap_or(DEFAULT_LANDING_PATH);
    let mut response = Redirect::to(location).into_response();
    if let Some(session) = minted {
        set_session_cookie(&mut response, &state.cookie, &session);
    }
    response
}

/// Returns the flash category for a redirecting rejection.
const fn flash_category(rejection: &Rejection) -> &'static str {
    match rejection {
        Rejection::RateLimitRedirect {
            ..
        } => "warning",
        Rejection::Unauthenticated {
            ..
        } => "info",
        _ => "danger",
    }
}

// ============================================================================
// SECTION: Request Helpers
// ============================================================================

/// Resolves the client address, honoring `X-Forwarded-For` when trusted.
fn client_address(state: &GatewayState, peer: SocketAddr, headers: &HeaderMap) -> IpAddr {
    if state.trust_forwarded_for
        && let Some(forwarded) = header_string(headers, FORWARDED_FOR_HEADER)
        && let Some(first) = forwarded.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return ip;
    }
    peer.ip()
}

/// Returns a trimmed, non-empty header value.
fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

/// Returns true when the body is an url-encoded form.
fn is_form(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case(FORM_MEDIA_TYPE))
}

/// Reads the presented CSRF token, buffering form bodies when needed.
async fn extract_csrf_token(
    request: Request<Body>,
    safe: bool,
    max_body_bytes: usize,
) -> Result<(Request<Body>, Option<String>), Response> {
    if let Some(token) = header_string(request.headers(), CSRF_HEADER) {
        return Ok((request, Some(token)));
    }
    if safe || !is_form(request.headers()) {
        return Ok((request, None));
    }
    let declared = request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());
    if declared.is_some_and(|len| len > max_body_bytes) {
        return Err(StatusCode::PAYLOAD_TOO_LARGE.into_response());
    }
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|_| StatusCode::BAD_REQUEST.into_response())?;
    let token = url::form_urlencoded::parse(&bytes)
        .find(|(name, _)| name == CSRF_FORM_FIELD)
        .map(|(_, value)| value.into_owned());
    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

// ============================================================================
// SECTION: Response Helpers
// ============================================================================

/// Appends the session cookie to a response.
fn set_session_cookie(response: &mut Response, cookie: &SessionCookie, session: &SessionId) {
    if let Ok(value) = HeaderValue::from_str(&cookie.header_value(session)) {
        response.headers_mut().append(SET_COOKIE, value);
    }
}

/// Rounds a retry delay up to whole seconds, at least one.
fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

/// Returns a random hex identifier correlating a 500 with its log record.
fn tracking_id() -> String {
    let mut bytes = [0_u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Builds an opaque 500 response carrying a tracking id.
fn server_error(tracking_id: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "internal server error", "tracking_id": tracking_id })),
    )
        .into_response()
}

/// Logs an internal failure and answers with an opaque 500.
pub(crate) fn internal_error(err: &dyn Display) -> Response {
    let tracking_id = tracking_id();
    error!(tracking_id = tracking_id.as_str(), error = %err, "gateway request failed");
    server_error(&tracking_id)
}

/// Converts a caught panic into an opaque 500.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    let tracking_id = tracking_id();
    error!(tracking_id = tracking_id.as_str(), panic = detail.as_str(), "request handler panicked");
    server_error(&tracking_id)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
