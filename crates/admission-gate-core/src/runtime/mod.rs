// crates/admission-gate-core/src/runtime/mod.rs
// ============================================================================
// Module: Admission Gate Runtime
// Description: Gateway components and the pipeline that composes them.
// Purpose: Execute admission decisions against injected stores and clocks.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the limiter, CSRF guard, authorization engine,
//! and IP allow-list, plus in-memory stores and the ordered pipeline. All
//! state is held by explicitly constructed objects; there are no globals.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod allowlist;
pub mod authz;
pub mod clock;
pub mod csrf;
pub mod pipeline;
pub mod rate_limit;
pub mod refresher;
pub mod session;
pub mod statistics;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use allowlist::AllowListStatus;
pub use allowlist::IpAllowList;
pub use allowlist::RefreshOutcome;
pub use allowlist::SourceStatus;
pub use allowlist::StaticRangeSource;
pub use authz::AuthorizationEngine;
pub use authz::AuthzDecision;
pub use authz::AuthzReason;
pub use authz::AuthzSettings;
pub use authz::DEFAULT_ADMIN_ROLE;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use csrf::CsrfGuard;
pub use csrf::CsrfRejection;
pub use csrf::CsrfSettings;
pub use csrf::CsrfToken;
pub use csrf::CsrfVerdict;
pub use pipeline::Admission;
pub use pipeline::GatewayError;
pub use pipeline::GatewayOutcome;
pub use pipeline::GatewayPipeline;
pub use pipeline::GatewayRequest;
pub use pipeline::PipelineParts;
pub use pipeline::PipelineSettings;
pub use pipeline::ProtectedRoute;
pub use pipeline::Rejection;
pub use pipeline::WebhookSettings;
pub use rate_limit::Quota;
pub use rate_limit::QuotaDecision;
pub use rate_limit::RateAttempt;
pub use rate_limit::RateDecision;
pub use rate_limit::RateLimitPolicy;
pub use rate_limit::RateLimiter;
pub use rate_limit::RateLimiterSettings;
pub use refresher::RefresherHandle;
pub use refresher::spawn_refresher;
pub use session::InMemorySessionStore;
pub use statistics::BlockEvent;
pub use statistics::EndpointCounters;
pub use statistics::OffenderCount;
pub use statistics::RateLimitSnapshot;
pub use store::InMemoryPolicyStore;
