// crates/admission-gate-core/src/runtime/authz.rs
// ============================================================================
// Module: Authorization Engine
// Description: Role-based decisions with a flexible fallback chain and feature flags.
// Purpose: Map (subject, resource, action) to allow or deny, failing closed.
// Dependencies: crate::{core, interfaces}, serde, tracing
// ============================================================================

//! ## Overview
//! The engine reads a fresh [`PolicySnapshot`] from the policy store for
//! every decision; there is no cache, so grants and revocations apply to
//! the next request.
//!
//! [`AuthorizationEngine::decide`] is the canonical check: the subject's
//! transitively resolved roles must carry a rule for the exact resource and
//! action (or `*` action), or the subject must be a universal admin.
//!
//! [`AuthorizationEngine::flexible_decide`] walks an ordered chain and
//! stops at the first allow:
//! 1. public feature flag named after the resource,
//! 2. specific permission,
//! 3. universal admin,
//! 4. declared fallback grant.
//!
//! A universal admin holds the configured admin role or any role carrying
//! the `(*, *)` rule. Both entry points honor either form.
//!
//! Security posture: any policy-store failure denies the request and is
//! logged with the subject, resource, and action.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::core::Action;
use crate::core::FallbackGrant;
use crate::core::PolicyRule;
use crate::core::PolicySnapshot;
use crate::core::ResourceName;
use crate::core::RoleName;
use crate::core::SubjectId;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyStoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default universal-admin role name.
pub const DEFAULT_ADMIN_ROLE: &str = "admin";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Machine-readable reason attached to each decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthzReason {
    /// Resource is a public, enabled feature.
    PublicFeature,
    /// A held role carries a rule for the resource and action.
    SpecificPermission,
    /// Subject is a universal admin.
    UniversalAdmin,
    /// A declared fallback grant covers the request.
    DeclaredFallback,
    /// No policy grants the request.
    NoMatchingPolicy,
    /// Caller has no authenticated subject.
    Unauthenticated,
    /// Policy store could not be read.
    StoreUnavailable,
}

impl AuthzReason {
    /// Returns the stable label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicFeature => "public_feature",
            Self::SpecificPermission => "specific_permission",
            Self::UniversalAdmin => "universal_admin",
            Self::DeclaredFallback => "declared_fallback",
            Self::NoMatchingPolicy => "no_matching_policy",
            Self::Unauthenticated => "unauthenticated",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

/// Authorization decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AuthzDecision {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Why.
    pub reason: AuthzReason,
}

impl AuthzDecision {
    /// Builds an allow decision.
    #[must_use]
    pub const fn allow(reason: AuthzReason) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }

    /// Builds a deny decision.
    #[must_use]
    pub const fn deny(reason: AuthzReason) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzSettings {
    /// Role treated as universal admin.
    pub admin_role: RoleName,
    /// Declared fallback grants for the flexible chain.
    pub fallback: Vec<FallbackGrant>,
}

impl Default for AuthzSettings {
    fn default() -> Self {
        Self {
            admin_role: RoleName::new(DEFAULT_ADMIN_ROLE),
            fallback: Vec::new(),
        }
    }
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Role-based authorization engine.
#[derive(Clone)]
pub struct AuthorizationEngine {
    /// Policy storage.
    store: Arc<dyn PolicyStore>,
    /// Engine settings.
    settings: AuthzSettings,
}

impl AuthorizationEngine {
    /// Creates an engine over the given policy store.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, settings: AuthzSettings) -> Self {
        Self {
            store,
            settings,
        }
    }

    /// Returns the underlying policy store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PolicyStore> {
        &self.store
    }

    /// Canonical role-based decision.
    #[must_use]
    pub fn decide(
        &self,
        subject: Option<&SubjectId>,
        resource: &ResourceName,
        action: &Action,
    ) -> AuthzDecision {
        let Some(subject) = subject else {
            return AuthzDecision::deny(AuthzReason::Unauthenticated);
        };
        let snapshot = match self.store.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => return store_failure(Some(subject), resource, action, &err),
        };
        let roles = snapshot.roles_for(subject);
        let decision = if has_specific_permission(&snapshot, &roles, resource, action) {
            AuthzDecision::allow(AuthzReason::SpecificPermission)
        } else if self.is_universal_admin(&snapshot, &roles) {
            AuthzDecision::allow(AuthzReason::UniversalAdmin)
        } else {
            AuthzDecision::deny(AuthzReason::NoMatchingPolicy)
        };
        log_decision(subject, resource, action, decision);
        decision
    }

    /// Flexible decision walking the ordered fallback chain.
    #[must_use]
    pub fn flexible_decide(
        &self,
        subject: Option<&SubjectId>,
        resource: &ResourceName,
        action: &Action,
    ) -> AuthzDecision {
        match self.store.feature_flag(resource.as_str()) {
            Ok(Some(flag)) if flag.grants_public_access() => {
                return AuthzDecision::allow(AuthzReason::PublicFeature);
            }
            Ok(_) => {}
            Err(err) => return store_failure(subject, resource, action, &err),
        }
        let Some(subject) = subject else {
            return AuthzDecision::deny(AuthzReason::Unauthenticated);
        };
        let snapshot = match self.store.load_snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => return store_failure(Some(subject), resource, action, &err),
        };
        let roles = snapshot.roles_for(subject);
        let decision = if has_specific_permission(&snapshot, &roles, resource, action) {
            AuthzDecision::allow(AuthzReason::SpecificPermission)
        } else if self.is_universal_admin(&snapshot, &roles) {
            AuthzDecision::allow(AuthzReason::UniversalAdmin)
        } else if self
            .settings
            .fallback
            .iter()
            .any(|grant| roles.contains(&grant.role) && grant.covers(resource, action))
        {
            AuthzDecision::allow(AuthzReason::DeclaredFallback)
        } else {
            AuthzDecision::deny(AuthzReason::NoMatchingPolicy)
        };
        log_decision(subject, resource, action, decision);
        decision
    }

    /// Returns true when a flag-gated feature is available to the subject.
    ///
    /// The feature must be enabled, and either public, unrestricted (no
    /// allowed roles), or allowed for one of the subject's roles. Store
    /// failures report the feature as unavailable.
    #[must_use]
    pub fn feature_enabled(&self, subject: Option<&SubjectId>, flag_name: &str) -> bool {
        let flag = match self.store.feature_flag(flag_name) {
            Ok(Some(flag)) => flag,
            Ok(None) => return false,
            Err(err) => {
                warn!(flag = flag_name, error = %err, "policy store unavailable; feature disabled");
                return false;
            }
        };
        if !flag.enabled {
            return false;
        }
        if flag.public_access || flag.allowed_roles.is_empty() {
            return true;
        }
        let Some(subject) = subject else {
            return false;
        };
        match self.roles_for(subject) {
            Ok(roles) => flag.allowed_roles.iter().any(|role| roles.contains(role)),
            Err(err) => {
                warn!(
                    flag = flag_name,
                    subject = %subject,
                    error = %err,
                    "policy store unavailable; feature disabled"
                );
                false
            }
        }
    }

    /// Resolves the subject's roles transitively.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the snapshot cannot be loaded.
    pub fn roles_for(&self, subject: &SubjectId) -> Result<BTreeSet<RoleName>, PolicyStoreError> {
        Ok(self.store.load_snapshot()?.roles_for(subject))
    }

    /// Returns true when the roles include the admin role or a `(*, *)` grant.
    fn is_universal_admin(&self, snapshot: &PolicySnapshot, roles: &BTreeSet<RoleName>) -> bool {
        roles.contains(&self.settings.admin_role)
            || snapshot.rules_for(roles).any(PolicyRule::is_universal)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when a held role has a rule for the exact resource.
fn has_specific_permission(
    snapshot: &PolicySnapshot,
    roles: &BTreeSet<RoleName>,
    resource: &ResourceName,
    action: &Action,
) -> bool {
    snapshot.rules_for(roles).any(|rule| rule.grants(resource, action))
}

/// Logs a store failure and denies.
fn store_failure(
    subject: Option<&SubjectId>,
    resource: &ResourceName,
    action: &Action,
    err: &PolicyStoreError,
) -> AuthzDecision {
    warn!(
        subject = subject.map_or("<anonymous>", SubjectId::as_str),
        resource = %resource,
        action = %action,
        error = %err,
        "policy store unavailable; denying"
    );
    AuthzDecision::deny(AuthzReason::StoreUnavailable)
}

/// Emits a debug record for a completed decision.
fn log_decision(
    subject: &SubjectId,
    resource: &ResourceName,
    action: &Action,
    decision: AuthzDecision,
) {
    debug!(
        subject = %subject,
        resource = %resource,
        action = %action,
        allowed = decision.allowed,
        reason = decision.reason.as_str(),
        "authorization decision"
    );
}
