// crates/admission-gate-core/tests/pipeline.rs
// ============================================================================
// Module: Gateway Pipeline Tests
// Description: Ordered admission over limiter, CSRF, allow-list, and authz.
// Purpose: Ensure stage ordering and the rejection shapes transports rely on.
// Dependencies: admission-gate-core
// ============================================================================

//! Gateway pipeline tests.

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::use_debug,
    reason = "Test setup uses unwraps and panics for clarity."
)]

mod common;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gate_core::Admission;
use admission_gate_core::Anonymous;
use admission_gate_core::Audience;
use admission_gate_core::AuthzReason;
use admission_gate_core::CsrfRejection;
use admission_gate_core::CsrfSettings;
use admission_gate_core::GatewayAuditKind;
use admission_gate_core::GatewayOutcome;
use admission_gate_core::GatewayRequest;
use admission_gate_core::InMemoryPolicyStore;
use admission_gate_core::PipelineSettings;
use admission_gate_core::PolicyRule;
use admission_gate_core::PolicySnapshot;
use admission_gate_core::Principal;
use admission_gate_core::ProtectedRoute;
use admission_gate_core::RangeCategory;
use admission_gate_core::RangeSource;
use admission_gate_core::RateLimitPolicy;
use admission_gate_core::Rejection;
use admission_gate_core::RoleAssignment;
use admission_gate_core::SessionId;
use admission_gate_core::StaticRangeSource;
use admission_gate_core::SubjectId;
use admission_gate_core::WebhookSettings;
use admission_gate_core::parse_range_entry;
use common::FailingPolicyStore;
use common::Harness;
use common::HarnessOptions;
use common::harness;

const OVERRIDE: &str = "let-me-in-for-testing";

fn request<'a>(
    method: &'a str,
    path: &'a str,
    session: Option<&'a SessionId>,
    principal: &'a dyn Principal,
) -> GatewayRequest<'a> {
    GatewayRequest {
        method,
        path,
        client: "198.51.100.20",
        client_ip: Some("198.51.100.20".parse().unwrap()),
        user_agent: Some("Mozilla/5.0"),
        session,
        principal,
        csrf_token: None,
        csrf_bypass: false,
        override_secret: None,
    }
}

fn proceed(outcome: GatewayOutcome) -> Admission {
    match outcome {
        GatewayOutcome::Proceed(admission) => admission,
        GatewayOutcome::Reject(rejection) => panic!("expected proceed, got {rejection:?}"),
    }
}

fn reject(outcome: GatewayOutcome) -> Rejection {
    match outcome {
        GatewayOutcome::Reject(rejection) => rejection,
        GatewayOutcome::Proceed(admission) => panic!("expected reject, got {admission:?}"),
    }
}

fn eval(h: &Harness, req: &GatewayRequest<'_>) -> GatewayOutcome {
    h.pipeline.evaluate(req).unwrap()
}

fn webhook_harness() -> Harness {
    let pinned: Arc<dyn RangeSource> = Arc::new(StaticRangeSource::new(
        "webhooks",
        RangeCategory::Webhooks,
        vec![parse_range_entry("54.187.174.169").unwrap()],
    ));
    let h = harness(HarnessOptions {
        settings: PipelineSettings {
            webhook: WebhookSettings {
                filter_enabled: true,
                override_secret: Some(OVERRIDE.to_string()),
                ..WebhookSettings::default()
            },
            ..PipelineSettings::default()
        },
        sources: vec![pinned],
        ..HarnessOptions::default()
    });
    h.allowlist.refresh();
    h
}

fn webhook_request<'a>(ip: &'a str, agent: &'a str, secret: Option<&'a str>) -> GatewayRequest<'a> {
    GatewayRequest {
        method: "POST",
        path: "/webhook",
        client: ip,
        client_ip: Some(ip.parse::<IpAddr>().unwrap()),
        user_agent: Some(agent),
        session: None,
        principal: &Anonymous,
        csrf_token: None,
        csrf_bypass: false,
        override_secret: secret,
    }
}

#[test]
fn sixth_login_is_redirected_with_notice() {
    let h = harness(HarnessOptions::default());
    let session = SessionId::new("browser");
    let landing = proceed(eval(&h, &request("GET", "/", Some(&session), &Anonymous)));
    let mut token = landing.csrf_token.unwrap();
    for _ in 0 .. 5 {
        let mut login = request("POST", "/login", Some(&session), &Anonymous);
        login.csrf_token = Some(token.as_str());
        let admission = proceed(eval(&h, &login));
        token = admission.csrf_token.unwrap();
    }
    let mut sixth = request("POST", "/login", Some(&session), &Anonymous);
    sixth.csrf_token = Some(token.as_str());
    let rejection = reject(eval(&h, &sixth));
    assert_eq!(rejection.status_code(), 303);
    assert_eq!(rejection.location(), Some("/"));
    assert_eq!(rejection.flash_notice(), Some("Too many attempts. Please try again later."));
    assert_eq!(h.audit.count(GatewayAuditKind::RateLimit), 1);
    assert_eq!(h.pipeline.limiter().statistics().total_blocked, 1);
}

#[test]
fn rate_limit_runs_before_csrf() {
    let h = harness(HarnessOptions::default());
    let session = SessionId::new("browser");
    for _ in 0 .. 5 {
        let outcome = eval(&h, &request("POST", "/login", Some(&session), &Anonymous));
        assert_eq!(reject(outcome), Rejection::CsrfFailed(CsrfRejection::NoSessionToken));
    }
    let outcome = eval(&h, &request("POST", "/login", Some(&session), &Anonymous));
    assert!(matches!(reject(outcome), Rejection::RateLimitRedirect { .. }));
}

fn api_policy(name: &str, limit: u32, window_secs: u64) -> RateLimitPolicy {
    RateLimitPolicy {
        name: name.to_string(),
        paths: vec!["/api/data".to_string()],
        methods: Vec::new(),
        limit,
        window: Duration::from_secs(window_secs),
        audience: Audience::Machine,
        exempt_user_agent_prefixes: Vec::new(),
        message: format!("{name} exceeded"),
    }
}

#[test]
fn overlapping_policies_each_keep_their_own_window() {
    let h = harness(HarnessOptions {
        settings: PipelineSettings {
            rate_limits: vec![api_policy("per_minute", 5, 60), api_policy("per_hour", 20, 3_600)],
            ..PipelineSettings::default()
        },
        ..HarnessOptions::default()
    });
    let session = SessionId::new("api");
    for _ in 0 .. 5 {
        proceed(eval(&h, &request("GET", "/api/data", Some(&session), &Anonymous)));
    }
    let throttled = reject(eval(&h, &request("GET", "/api/data", Some(&session), &Anonymous)));
    assert_eq!(
        throttled,
        Rejection::RateLimitJson {
            message: "per_minute exceeded".to_string(),
            retry_after: Duration::from_secs(60),
        }
    );
    let stats = h.pipeline.limiter().statistics();
    assert_eq!(stats.total_attempts, 6);
    assert_eq!(stats.total_blocked, 1);

    h.clock.advance(Duration::from_secs(60));
    proceed(eval(&h, &request("GET", "/api/data", Some(&session), &Anonymous)));
}

#[test]
fn webhook_lookalike_paths_still_require_csrf() {
    let h = harness(HarnessOptions::default());
    let session = SessionId::new("browser");
    proceed(eval(&h, &request("GET", "/", Some(&session), &Anonymous)));
    for path in ["/webhook-settings/delete-all", "/webhooks/admin", "/webhookconfig"] {
        let rejection = reject(eval(&h, &request("POST", path, Some(&session), &Anonymous)));
        assert_eq!(rejection, Rejection::CsrfFailed(CsrfRejection::MissingToken), "{path}");
    }
    let delivery = proceed(eval(&h, &request("POST", "/webhook/stripe", None, &Anonymous)));
    assert!(delivery.csrf_token.is_none());

    let webhook = &h.pipeline.settings().webhook;
    assert!(webhook.is_webhook("/webhook"));
    assert!(webhook.is_webhook("/webhook/stripe"));
    assert!(!webhook.is_webhook("/webhook-settings/delete-all"));
}

#[test]
fn unsafe_request_without_session_is_rejected() {
    let h = harness(HarnessOptions::default());
    let outcome = eval(&h, &request("POST", "/orders", None, &Anonymous));
    let rejection = reject(outcome);
    assert_eq!(rejection, Rejection::CsrfFailed(CsrfRejection::NoSessionToken));
    assert_eq!(rejection.status_code(), 403);
}

#[test]
fn csrf_bypass_header_needs_test_mode() {
    let strict = harness(HarnessOptions::default());
    let session = SessionId::new("s");
    let mut bypass = request("POST", "/orders", Some(&session), &Anonymous);
    bypass.csrf_bypass = true;
    assert!(matches!(reject(eval(&strict, &bypass)), Rejection::CsrfFailed(_)));

    let test_mode = harness(HarnessOptions {
        csrf: CsrfSettings {
            test_mode: true,
            ..CsrfSettings::default()
        },
        ..HarnessOptions::default()
    });
    let admission = proceed(eval(&test_mode, &bypass));
    assert!(admission.csrf_token.is_some());
    assert_eq!(test_mode.audit.count(GatewayAuditKind::Csrf), 1);
}

#[test]
fn unknown_webhook_source_is_forbidden() {
    let h = webhook_harness();
    let outcome = eval(&h, &webhook_request("203.0.113.7", "GenericBot/2.0", None));
    let rejection = reject(outcome);
    assert_eq!(rejection, Rejection::WebhookSourceDenied);
    assert_eq!(rejection.status_code(), 403);
    assert_eq!(h.audit.count(GatewayAuditKind::WebhookSource), 1);
}

#[test]
fn override_secret_skips_allow_list_and_is_audited() {
    let h = webhook_harness();
    let outcome = eval(&h, &webhook_request("203.0.113.7", "GenericBot/2.0", Some(OVERRIDE)));
    assert!(proceed(outcome).override_used);
    let events = h.audit.events();
    let used = events.iter().find(|e| e.kind == GatewayAuditKind::OverrideUsed).unwrap();
    assert!(used.secret_fingerprint.is_some());
    assert_ne!(used.secret_fingerprint.as_deref(), Some(OVERRIDE));

    let wrong = eval(&h, &webhook_request("203.0.113.7", "GenericBot/2.0", Some("nope")));
    assert_eq!(reject(wrong), Rejection::WebhookSourceDenied);
}

#[test]
fn published_webhook_source_is_admitted() {
    let h = webhook_harness();
    let outcome = eval(&h, &webhook_request("54.187.174.169", "Stripe/1.0", None));
    let admission = proceed(outcome);
    assert!(!admission.override_used);
    assert!(admission.csrf_token.is_none());
}

#[test]
fn trusted_agent_is_exempt_from_webhook_rate_limit() {
    let h = webhook_harness();
    for _ in 0 .. 15 {
        let outcome = eval(&h, &webhook_request("54.187.174.169", "Stripe/1.0", None));
        proceed(outcome);
    }
    for _ in 0 .. 10 {
        proceed(eval(&h, &webhook_request("54.187.174.169", "curl/8.0", None)));
    }
    let throttled = reject(eval(&h, &webhook_request("54.187.174.169", "curl/8.0", None)));
    assert_eq!(throttled.status_code(), 429);
    assert!(matches!(throttled, Rejection::RateLimitJson { .. }));
}

#[test]
fn disabled_filter_admits_any_webhook_source() {
    let h = harness(HarnessOptions::default());
    proceed(eval(&h, &webhook_request("203.0.113.7", "GenericBot/2.0", None)));
}

fn protected_harness(policies: Arc<dyn admission_gate_core::PolicyStore>) -> Harness {
    harness(HarnessOptions {
        settings: PipelineSettings {
            protected_routes: vec![ProtectedRoute {
                path_prefix: "/admin".to_string(),
                resource: "admin_panel".into(),
                flexible: false,
            }],
            ..PipelineSettings::default()
        },
        policies,
        ..HarnessOptions::default()
    })
}

fn admin_policies() -> Arc<InMemoryPolicyStore> {
    Arc::new(InMemoryPolicyStore::seeded(
        PolicySnapshot {
            assignments: vec![
                RoleAssignment::new("root", "admin"),
                RoleAssignment::new("bob", "clerk"),
            ],
            rules: vec![PolicyRule::new("clerk", "admin_panel", "read")],
        },
        Vec::new(),
    ))
}

#[test]
fn protected_route_redirects_anonymous_callers() {
    let h = protected_harness(admin_policies());
    let session = SessionId::new("s");
    let rejection = reject(eval(&h, &request("GET", "/admin/users", Some(&session), &Anonymous)));
    assert_eq!(rejection.status_code(), 303);
    assert_eq!(rejection.flash_notice(), Some("Please log in to access this page."));
    assert!(matches!(rejection, Rejection::Unauthenticated { .. }));
}

#[test]
fn protected_route_checks_method_action() {
    let h = protected_harness(admin_policies());
    let session = SessionId::new("s");
    let bob = SubjectId::new("bob");
    let admission = proceed(eval(&h, &request("GET", "/admin", Some(&session), &bob)));
    assert!(admission.authorization.is_some_and(|d| d.allowed));

    let token = h.pipeline.csrf().issue_or_get(&session).unwrap();
    let mut delete = request("DELETE", "/admin/users/7", Some(&session), &bob);
    delete.csrf_token = Some(token.as_str());
    let rejection = reject(eval(&h, &delete));
    assert!(matches!(
        rejection,
        Rejection::Forbidden {
            reason: AuthzReason::NoMatchingPolicy,
            ..
        }
    ));

    let root = SubjectId::new("root");
    proceed(eval(&h, &request("GET", "/admin/anything", Some(&session), &root)));
    proceed(eval(&h, &request("GET", "/administrator", Some(&session), &Anonymous)));
}

#[test]
fn policy_store_outage_denies_with_generic_notice() {
    let h = protected_harness(Arc::new(FailingPolicyStore));
    let session = SessionId::new("s");
    let root = SubjectId::new("root");
    let rejection = reject(eval(&h, &request("GET", "/admin", Some(&session), &root)));
    assert_eq!(
        rejection.flash_notice(),
        Some("We could not verify your access right now. Please try again later.")
    );
    assert!(matches!(
        rejection,
        Rejection::Forbidden {
            reason: AuthzReason::StoreUnavailable,
            ..
        }
    ));
}
