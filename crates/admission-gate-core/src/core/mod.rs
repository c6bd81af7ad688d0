// crates/admission-gate-core/src/core/mod.rs
// ============================================================================
// Module: Admission Gate Core Types
// Description: Canonical gateway identifiers, policy records, and range types.
// Purpose: Provide stable, serializable types shared by every gateway component.
// Dependencies: ipnet, serde
// ============================================================================

//! ## Overview
//! Core types describe who is calling (identifiers), what they may do
//! (policy records and feature flags), where machine callers may come from
//! (tagged IP ranges), and what the gateway records about each decision
//! (audit events). These types are the source of truth for the config,
//! storage, and HTTP surfaces.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod hashing;
pub mod identifiers;
pub mod methods;
pub mod policy;
pub mod ranges;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditDecision;
pub use audit::GatewayAuditEvent;
pub use audit::GatewayAuditKind;
pub use audit::GatewayAuditSink;
pub use audit::NoopAuditSink;
pub use hashing::secret_fingerprint;
pub use hashing::secrets_match;
pub use identifiers::ResourceName;
pub use identifiers::RoleName;
pub use identifiers::SessionId;
pub use identifiers::SubjectId;
pub use identifiers::WILDCARD;
pub use methods::Audience;
pub use methods::action_for_method;
pub use methods::is_safe_method;
pub use methods::path_within_prefix;
pub use policy::Action;
pub use policy::FallbackGrant;
pub use policy::FeatureFlag;
pub use policy::PolicyRule;
pub use policy::PolicySnapshot;
pub use policy::ROLE_MEMBER_PREFIX;
pub use policy::RoleAssignment;
pub use ranges::RangeCategory;
pub use ranges::TaggedRange;
pub use ranges::normalize_ip;
pub use ranges::parse_range_entry;
