// crates/admission-gate-core/src/runtime/pipeline.rs
// ============================================================================
// Module: Gateway Pipeline
// Description: Ordered admission chain over limiter, CSRF, allow-list, and authz.
// Purpose: Turn one inbound request into Proceed or a typed rejection.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! Every request passes the stages in a fixed order and stops at the first
//! rejection:
//! 1. rate limiting (before any session work),
//! 2. CSRF (safe methods ensure a token, unsafe methods validate it),
//! 3. webhook source allow-listing (webhook paths only, when enabled),
//! 4. authorization (configured protected routes only).
//!
//! The pipeline is transport-neutral: it consumes a [`GatewayRequest`] and
//! yields a [`GatewayOutcome`]. Transports that buffer request bodies call
//! [`GatewayPipeline::throttle`] first and [`GatewayPipeline::admit`] once
//! the body is read, so throttled callers cost no body read. Mapping
//! rejections to HTTP responses and flash notices is the transport's job.
//!
//! Security posture: rejections never carry internal detail; policy-store
//! failures surface only as a generic notice.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::core::Audience;
use crate::core::AuditDecision;
use crate::core::GatewayAuditEvent;
use crate::core::GatewayAuditKind;
use crate::core::GatewayAuditSink;
use crate::core::ResourceName;
use crate::core::SessionId;
use crate::core::action_for_method;
use crate::core::is_safe_method;
use crate::core::path_within_prefix;
use crate::core::secret_fingerprint;
use crate::core::secrets_match;
use crate::interfaces::Clock;
use crate::interfaces::Principal;
use crate::interfaces::SessionError;
use crate::runtime::allowlist::IpAllowList;
use crate::runtime::authz::AuthorizationEngine;
use crate::runtime::authz::AuthzDecision;
use crate::runtime::authz::AuthzReason;
use crate::runtime::csrf::CsrfGuard;
use crate::runtime::csrf::CsrfRejection;
use crate::runtime::csrf::CsrfToken;
use crate::runtime::csrf::CsrfVerdict;
use crate::runtime::rate_limit::RateAttempt;
use crate::runtime::rate_limit::Quota;
use crate::runtime::rate_limit::QuotaDecision;
use crate::runtime::rate_limit::RateLimitPolicy;
use crate::runtime::rate_limit::RateLimiter;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Landing page that browser rejections redirect to.
pub const DEFAULT_LANDING_PATH: &str = "/";
/// Header carrying the allow-list override secret.
pub const OVERRIDE_HEADER: &str = "x-stripe-override";
/// Default webhook path prefixes.
pub const DEFAULT_WEBHOOK_PREFIXES: [&str; 1] = ["/webhook"];
/// Notice shown to unauthenticated callers on protected routes.
pub const NOTICE_LOGIN_REQUIRED: &str = "Please log in to access this page.";
/// Notice shown when authorization denies a request.
pub const NOTICE_FORBIDDEN: &str = "You do not have permission to access this page.";
/// Notice shown when the policy store cannot answer.
pub const NOTICE_TRY_LATER: &str =
    "We could not verify your access right now. Please try again later.";

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Route whose requests require authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRoute {
    /// Path prefix, matched on segment boundaries.
    pub path_prefix: String,
    /// Resource checked for requests under the prefix.
    pub resource: ResourceName,
    /// Use the flexible fallback chain instead of the canonical check.
    pub flexible: bool,
}

impl ProtectedRoute {
    /// Returns true when the path is the prefix or lies beneath it.
    #[must_use]
    pub fn covers(&self, path: &str) -> bool {
        path_within_prefix(path, &self.path_prefix)
    }
}

/// Webhook allow-listing settings.
#[derive(Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    /// Enforce the allow-list on webhook paths.
    pub filter_enabled: bool,
    /// Path prefixes treated as webhooks.
    pub path_prefixes: Vec<String>,
    /// Pre-shared secret that skips the allow-list.
    pub override_secret: Option<String>,
}

impl std::fmt::Debug for WebhookSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookSettings")
            .field("filter_enabled", &self.filter_enabled)
            .field("path_prefixes", &self.path_prefixes)
            .field("override_secret", &self.override_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self {
            filter_enabled: false,
            path_prefixes: DEFAULT_WEBHOOK_PREFIXES.iter().map(ToString::to_string).collect(),
            override_secret: None,
        }
    }
}

impl WebhookSettings {
    /// Returns true when the path is webhook-shaped.
    #[must_use]
    pub fn is_webhook(&self, path: &str) -> bool {
        self.path_prefixes.iter().any(|prefix| path_within_prefix(path, prefix))
    }
}

/// Pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Redirect target for browser rejections.
    pub landing_path: String,
    /// Rate-limit policies, checked in order.
    pub rate_limits: Vec<RateLimitPolicy>,
    /// Webhook allow-listing.
    pub webhook: WebhookSettings,
    /// Routes requiring authorization.
    pub protected_routes: Vec<ProtectedRoute>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            rate_limits: RateLimitPolicy::defaults(),
            webhook: WebhookSettings::default(),
            protected_routes: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Requests and Outcomes
// ============================================================================

/// Transport-neutral view of an inbound request.
#[derive(Clone, Copy)]
pub struct GatewayRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Request path (no query string).
    pub path: &'a str,
    /// Client identifier used for rate limiting.
    pub client: &'a str,
    /// Client address for allow-listing.
    pub client_ip: Option<IpAddr>,
    /// Caller user-agent.
    pub user_agent: Option<&'a str>,
    /// Browser session, when one exists.
    pub session: Option<&'a SessionId>,
    /// Caller identity.
    pub principal: &'a dyn Principal,
    /// CSRF token presented by form field or header.
    pub csrf_token: Option<&'a str>,
    /// Caller asked for a CSRF bypass.
    pub csrf_bypass: bool,
    /// Allow-list override secret presented.
    pub override_secret: Option<&'a str>,
}

/// Details of an admitted request.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Admission {
    /// Current CSRF token for the session, when one applies.
    pub csrf_token: Option<CsrfToken>,
    /// The allow-list was skipped through the override secret.
    pub override_used: bool,
    /// Authorization decision for protected routes.
    pub authorization: Option<AuthzDecision>,
}

/// Why a request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Browser endpoint throttled: redirect with a notice.
    RateLimitRedirect {
        /// Redirect target.
        location: String,
        /// Flash notice.
        notice: String,
    },
    /// Machine endpoint throttled: 429 with a JSON error.
    RateLimitJson {
        /// Error message.
        message: String,
        /// Time until a slot frees up.
        retry_after: Duration,
    },
    /// CSRF check failed.
    CsrfFailed(CsrfRejection),
    /// Webhook caller is outside the allow-list.
    WebhookSourceDenied,
    /// Protected route needs an authenticated subject.
    Unauthenticated {
        /// Redirect target.
        location: String,
        /// Flash notice.
        notice: String,
    },
    /// Authorization denied the request.
    Forbidden {
        /// Redirect target.
        location: String,
        /// Flash notice.
        notice: String,
        /// Decision reason.
        reason: AuthzReason,
    },
}

impl Rejection {
    /// Returns the HTTP status code for the rejection.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::RateLimitRedirect {
                ..
            }
            | Self::Unauthenticated {
                ..
            }
            | Self::Forbidden {
                ..
            } => 303,
            Self::RateLimitJson {
                ..
            } => 429,
            Self::CsrfFailed(_) | Self::WebhookSourceDenied => 403,
        }
    }

    /// Returns the flash notice to store, if the rejection redirects.
    #[must_use]
    pub fn flash_notice(&self) -> Option<&str> {
        match self {
            Self::RateLimitRedirect {
                notice, ..
            }
            | Self::Unauthenticated {
                notice, ..
            }
            | Self::Forbidden {
                notice, ..
            } => Some(notice.as_str()),
            _ => None,
        }
    }

    /// Returns the redirect target, if the rejection redirects.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::RateLimitRedirect {
                location, ..
            }
            | Self::Unauthenticated {
                location, ..
            }
            | Self::Forbidden {
                location, ..
            } => Some(location.as_str()),
            _ => None,
        }
    }
}

/// Pipeline verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Forward to the handler.
    Proceed(Admission),
    /// Short-circuit with a rejection.
    Reject(Rejection),
}

/// Pipeline errors that are not admission decisions.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session store failed while handling CSRF state.
    #[error(transparent)]
    Session(#[from] SessionError),
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Ordered admission pipeline.
pub struct GatewayPipeline {
    /// Time source for audit timestamps.
    clock: Arc<dyn Clock>,
    /// Rate limiter.
    limiter: Arc<RateLimiter>,
    /// CSRF guard.
    csrf: CsrfGuard,
    /// Webhook allow-list.
    allowlist: Arc<IpAllowList>,
    /// Authorization engine.
    authz: AuthorizationEngine,
    /// Audit sink.
    audit: Arc<dyn GatewayAuditSink>,
    /// Pipeline settings.
    settings: PipelineSettings,
}

/// Components assembled into a pipeline.
pub struct PipelineParts {
    /// Time source.
    pub clock: Arc<dyn Clock>,
    /// Rate limiter.
    pub limiter: Arc<RateLimiter>,
    /// CSRF guard.
    pub csrf: CsrfGuard,
    /// Webhook allow-list.
    pub allowlist: Arc<IpAllowList>,
    /// Authorization engine.
    pub authz: AuthorizationEngine,
    /// Audit sink.
    pub audit: Arc<dyn GatewayAuditSink>,
}

impl GatewayPipeline {
    /// Assembles a pipeline.
    #[must_use]
    pub fn new(parts: PipelineParts, settings: PipelineSettings) -> Self {
        Self {
            clock: parts.clock,
            limiter: parts.limiter,
            csrf: parts.csrf,
            allowlist: parts.allowlist,
            authz: parts.authz,
            audit: parts.audit,
            settings,
        }
    }

    /// Returns the rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Returns the allow-list.
    #[must_use]
    pub const fn allowlist(&self) -> &Arc<IpAllowList> {
        &self.allowlist
    }

    /// Returns the authorization engine.
    #[must_use]
    pub const fn authz(&self) -> &AuthorizationEngine {
        &self.authz
    }

    /// Returns the CSRF guard.
    #[must_use]
    pub const fn csrf(&self) -> &CsrfGuard {
        &self.csrf
    }

    /// Returns the pipeline settings.
    #[must_use]
    pub const fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Runs every stage for one request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the session store fails during CSRF
    /// handling; callers should answer with an opaque server error.
    pub fn evaluate(&self, request: &GatewayRequest<'_>) -> Result<GatewayOutcome, GatewayError> {
        if let Some(rejection) = self.throttle(request) {
            return Ok(GatewayOutcome::Reject(rejection));
        }
        self.admit(request)
    }

    /// Runs the stages after rate limiting.
    ///
    /// Callers must have run [`Self::throttle`] for the same request.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError`] when the session store fails during CSRF
    /// handling.
    pub fn admit(&self, request: &GatewayRequest<'_>) -> Result<GatewayOutcome, GatewayError> {
        let csrf_token = match self.check_csrf(request)? {
            Ok(token) => token,
            Err(rejection) => return Ok(GatewayOutcome::Reject(rejection)),
        };
        let override_used = match self.check_webhook_source(request) {
            Ok(used) => used,
            Err(rejection) => return Ok(GatewayOutcome::Reject(rejection)),
        };
        let authorization = match self.check_authorization(request) {
            Ok(decision) => decision,
            Err(rejection) => return Ok(GatewayOutcome::Reject(rejection)),
        };
        Ok(GatewayOutcome::Proceed(Admission {
            csrf_token,
            override_used,
            authorization,
        }))
    }

    /// Stage 1: rate limiting. Only method, path, client, and user-agent are read.
    ///
    /// Every matching policy keeps its own window, and the request is counted
    /// in all of them or, when any policy denies, in none.
    pub fn throttle(&self, request: &GatewayRequest<'_>) -> Option<Rejection> {
        let attempt = RateAttempt {
            client: request.client,
            path: request.path,
            user_agent: request.user_agent,
        };
        let policies: Vec<&RateLimitPolicy> = self
            .settings
            .rate_limits
            .iter()
            .filter(|policy| {
                policy.matches(request.method, request.path) && !policy.exempts(request.user_agent)
            })
            .collect();
        let quotas: Vec<Quota<'_>> = policies
            .iter()
            .map(|policy| Quota {
                scope: policy.name.as_str(),
                limit: policy.limit,
                window: policy.window,
            })
            .collect();
        let QuotaDecision::Deny {
            quota,
            retry_after,
        } = self.limiter.check_quotas(&attempt, &quotas)
        else {
            return None;
        };
        let policy = policies.get(quota)?;
        info!(
            client = request.client,
            path = request.path,
            policy = policy.name.as_str(),
            "rate limit exceeded"
        );
        let reason = policy.name.as_str();
        self.record(request, GatewayAuditKind::RateLimit, AuditDecision::Deny, reason);
        Some(match policy.audience {
            Audience::Browser => Rejection::RateLimitRedirect {
                location: self.settings.landing_path.clone(),
                notice: policy.message.clone(),
            },
            Audience::Machine => Rejection::RateLimitJson {
                message: policy.message.clone(),
                retry_after,
            },
        })
    }

    /// Stage 2: CSRF issuance and validation.
    fn check_csrf(
        &self,
        request: &GatewayRequest<'_>,
    ) -> Result<Result<Option<CsrfToken>, Rejection>, GatewayError> {
        if self.csrf.settings().is_exempt(request.path) {
            return Ok(Ok(None));
        }
        if is_safe_method(request.method) {
            return match request.session {
                Some(session) => Ok(Ok(Some(self.csrf.issue_or_get(session)?))),
                None => Ok(Ok(None)),
            };
        }
        let Some(session) = request.session else {
            self.record(request, GatewayAuditKind::Csrf, AuditDecision::Deny, "no_session");
            return Ok(Err(Rejection::CsrfFailed(CsrfRejection::NoSessionToken)));
        };
        match self.csrf.check_unsafe(session, request.csrf_token, request.csrf_bypass)? {
            CsrfVerdict::Accepted {
                next,
            } => Ok(Ok(Some(next))),
            CsrfVerdict::Bypassed => {
                self.record(request, GatewayAuditKind::Csrf, AuditDecision::Bypass, "test_mode");
                Ok(Ok(Some(self.csrf.issue_or_get(session)?)))
            }
            CsrfVerdict::Rejected(reason) => {
                info!(
                    client = request.client,
                    path = request.path,
                    reason = reason.as_str(),
                    "csrf rejected"
                );
                self.record(request, GatewayAuditKind::Csrf, AuditDecision::Deny, reason.as_str());
                Ok(Err(Rejection::CsrfFailed(reason)))
            }
        }
    }

    /// Stage 3: webhook source allow-listing. Returns whether the override was used.
    fn check_webhook_source(&self, request: &GatewayRequest<'_>) -> Result<bool, Rejection> {
        let webhook = &self.settings.webhook;
        if !webhook.filter_enabled || !webhook.is_webhook(request.path) {
            return Ok(false);
        }
        if let (Some(expected), Some(presented)) =
            (webhook.override_secret.as_deref(), request.override_secret)
            && secrets_match(expected, presented)
        {
            let event = self
                .event(request, GatewayAuditKind::OverrideUsed, AuditDecision::Bypass)
                .with_reason("override_secret")
                .with_secret_fingerprint(secret_fingerprint(presented));
            self.audit.record(&event);
            return Ok(true);
        }
        if request.client_ip.is_some_and(|ip| self.allowlist.is_allowed(ip)) {
            return Ok(false);
        }
        let reason = if request.override_secret.is_some() {
            "override_mismatch"
        } else {
            "source_not_allowed"
        };
        info!(client = request.client, path = request.path, reason, "webhook source denied");
        self.record(request, GatewayAuditKind::WebhookSource, AuditDecision::Deny, reason);
        Err(Rejection::WebhookSourceDenied)
    }

    /// Stage 4: authorization for protected routes.
    fn check_authorization(
        &self,
        request: &GatewayRequest<'_>,
    ) -> Result<Option<AuthzDecision>, Rejection> {
        let route = self
            .settings
            .protected_routes
            .iter()
            .filter(|route| route.covers(request.path))
            .max_by_key(|route| route.path_prefix.len());
        let Some(route) = route else {
            return Ok(None);
        };
        let subject = request.principal.subject();
        let action = action_for_method(request.method);
        let decision = if route.flexible {
            self.authz.flexible_decide(subject, &route.resource, &action)
        } else {
            self.authz.decide(subject, &route.resource, &action)
        };
        if decision.allowed {
            return Ok(Some(decision));
        }
        self.record(
            request,
            GatewayAuditKind::Authorization,
            AuditDecision::Deny,
            decision.reason.as_str(),
        );
        let location = self.settings.landing_path.clone();
        Err(match decision.reason {
            AuthzReason::Unauthenticated => Rejection::Unauthenticated {
                location,
                notice: NOTICE_LOGIN_REQUIRED.to_string(),
            },
            AuthzReason::StoreUnavailable => Rejection::Forbidden {
                location,
                notice: NOTICE_TRY_LATER.to_string(),
                reason: decision.reason,
            },
            _ => Rejection::Forbidden {
                location,
                notice: NOTICE_FORBIDDEN.to_string(),
                reason: decision.reason,
            },
        })
    }

    /// Builds a request-scoped audit event.
    fn event(
        &self,
        request: &GatewayRequest<'_>,
        kind: GatewayAuditKind,
        decision: AuditDecision,
    ) -> GatewayAuditEvent {
        GatewayAuditEvent::new(kind, decision, self.clock.unix_millis())
            .with_request(request.method, request.path, request.client)
            .with_subject(request.principal.subject().map(|subject| subject.as_str()))
    }

    /// Records a request-scoped audit event with a reason.
    fn record(
        &self,
        request: &GatewayRequest<'_>,
        kind: GatewayAuditKind,
        decision: AuditDecision,
        reason: &str,
    ) {
        let event = self.event(request, kind, decision).with_reason(reason);
        self.audit.record(&event);
    }
}
