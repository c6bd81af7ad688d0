// crates/admission-gate-core/src/core/audit.rs
// ============================================================================
// Module: Gateway Audit Events
// Description: Structured audit payloads for gateway admission decisions.
// Purpose: Record rejections, bypasses, and overrides without leaking secrets.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every security-relevant gateway decision (rate-limit denial, CSRF
//! rejection or bypass, webhook source denial, override use, authorization
//! denial, range refresh result) produces a [`GatewayAuditEvent`]. Sinks
//! decide where events go; the core only ships a no-op sink.
//!
//! Security posture: events carry secret fingerprints, never secrets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Gateway stage that produced an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayAuditKind {
    /// Rate limiter denial.
    RateLimit,
    /// CSRF rejection or test-mode bypass.
    Csrf,
    /// Webhook caller outside the allow-list.
    WebhookSource,
    /// Allow-list skipped through the override secret.
    OverrideUsed,
    /// Authorization decision for a protected route.
    Authorization,
    /// Allow-list refresh result.
    RangeRefresh,
}

/// Outcome recorded on an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    /// Request admitted by the stage.
    Allow,
    /// Request rejected by the stage.
    Deny,
    /// Stage skipped by an explicit bypass.
    Bypass,
}

/// Gateway audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Stage that produced the event.
    pub kind: GatewayAuditKind,
    /// Decision outcome.
    pub decision: AuditDecision,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Request method, when request-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Request path, when request-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Client identifier (peer address).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    /// Authenticated subject, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Machine-readable reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// sha256 fingerprint of a presented secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_fingerprint: Option<String>,
}

impl GatewayAuditEvent {
    /// Builds an event with no request context.
    #[must_use]
    pub const fn new(kind: GatewayAuditKind, decision: AuditDecision, timestamp_ms: u64) -> Self {
        Self {
            event: "gateway_decision",
            kind,
            decision,
            timestamp_ms,
            method: None,
            path: None,
            client: None,
            subject: None,
            reason: None,
            secret_fingerprint: None,
        }
    }

    /// Attaches request context.
    #[must_use]
    pub fn with_request(mut self, method: &str, path: &str, client: &str) -> Self {
        self.method = Some(method.to_string());
        self.path = Some(path.to_string());
        self.client = Some(client.to_string());
        self
    }

    /// Attaches the authenticated subject.
    #[must_use]
    pub fn with_subject(mut self, subject: Option<&str>) -> Self {
        self.subject = subject.map(ToString::to_string);
        self
    }

    /// Attaches a reason label.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a secret fingerprint.
    #[must_use]
    pub fn with_secret_fingerprint(mut self, fingerprint: String) -> Self {
        self.secret_fingerprint = Some(fingerprint);
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for gateway events.
pub trait GatewayAuditSink: Send + Sync {
    /// Record a gateway audit event.
    fn record(&self, event: &GatewayAuditEvent);
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl GatewayAuditSink for NoopAuditSink {
    fn record(&self, _event: &GatewayAuditEvent) {}
}
