// crates/admission-gate-core/src/core/policy.rs
// ============================================================================
// Module: Policy Records
// Description: Authorization rules, role assignments, feature flags, and snapshots.
// Purpose: Describe the data an authorization decision is computed from.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A policy rule grants a role an action on a resource. Role assignments
//! bind a member (a subject or another role) to a role, so roles resolve
//! transitively. Subjects and roles live in separate namespaces: a role
//! member is written `role:<name>` (see [`ROLE_MEMBER_PREFIX`]), so a subject
//! whose id happens to equal a role name never inherits that role's parents.
//! Feature flags can open a resource to everyone. A [`PolicySnapshot`] is the
//! rule set a single decision reads; snapshots are loaded per decision and
//! never cached.
//!
//! Security posture: policy records come from operator-controlled storage;
//! callers never supply them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::collections::VecDeque;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ResourceName;
use crate::core::identifiers::RoleName;
use crate::core::identifiers::SubjectId;
use crate::core::identifiers::WILDCARD;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix marking an assignment member as a role rather than a subject.
pub const ROLE_MEMBER_PREFIX: &str = "role:";

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Action exercised on a resource.
///
/// # Invariants
/// - String forms are lowercase; `*` is [`Action::Any`].
/// - Only `write`, `update`, and `delete` are mutating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    /// Read-only access.
    Read,
    /// Create access.
    Write,
    /// Modify access.
    Update,
    /// Remove access.
    Delete,
    /// Wildcard matching every action.
    Any,
    /// Application-specific action name.
    Named(String),
}

impl Action {
    /// Parses an action from its string form.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let lowered = value.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "read" => Self::Read,
            "write" => Self::Write,
            "update" => Self::Update,
            "delete" => Self::Delete,
            WILDCARD => Self::Any,
            _ => Self::Named(lowered),
        }
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Any => WILDCARD,
            Self::Named(name) => name.as_str(),
        }
    }

    /// Returns true for actions that change state.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        matches!(self, Self::Write | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<Action> for String {
    fn from(value: Action) -> Self {
        value.as_str().to_string()
    }
}

// ============================================================================
// SECTION: Rules and Assignments
// ============================================================================

/// Grants `role` the `action` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Role receiving the grant.
    pub role: RoleName,
    /// Resource name, or `*` for every resource.
    pub resource: ResourceName,
    /// Action granted, or `*` for every action.
    pub action: Action,
}

impl PolicyRule {
    /// Builds a policy rule.
    #[must_use]
    pub fn new(
        role: impl Into<RoleName>,
        resource: impl Into<ResourceName>,
        action: impl Into<Action>,
    ) -> Self {
        Self {
            role: role.into(),
            resource: resource.into(),
            action: action.into(),
        }
    }

    /// Returns true when this rule names the resource exactly and covers the action.
    ///
    /// A `*` resource does not match here; universal grants are checked
    /// separately through [`PolicyRule::is_universal`].
    #[must_use]
    pub fn grants(&self, resource: &ResourceName, action: &Action) -> bool {
        self.resource == *resource && (self.action == *action || self.action == Action::Any)
    }

    /// Returns true for the `(*, *)` universal grant.
    #[must_use]
    pub fn is_universal(&self) -> bool {
        self.resource.is_wildcard() && self.action == Action::Any
    }
}

/// Binds a member (subject or role) to a role.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleAssignment {
    /// Subject identifier, or `role:<name>` for a role receiving the role.
    pub member: String,
    /// Role granted to the member.
    pub role: RoleName,
}

impl RoleAssignment {
    /// Builds a role assignment.
    #[must_use]
    pub fn new(member: impl Into<String>, role: impl Into<RoleName>) -> Self {
        Self {
            member: member.into(),
            role: role.into(),
        }
    }

    /// Builds a role-to-role assignment: holders of `role` also hold `parent`.
    #[must_use]
    pub fn inherit(role: impl Into<RoleName>, parent: impl Into<RoleName>) -> Self {
        Self::new(role_member(&role.into()), parent)
    }
}

/// Returns the assignment member naming a role.
fn role_member(role: &RoleName) -> String {
    format!("{ROLE_MEMBER_PREFIX}{role}")
}

// ============================================================================
// SECTION: Feature Flags
// ============================================================================

/// Feature flag controlling access to a named feature.
///
/// # Invariants
/// - When `enabled && public_access`, the flag name acts as a resource that
///   bypasses subject-based authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFlag {
    /// Flag (and resource) name.
    pub name: String,
    /// Whether the feature is on.
    pub enabled: bool,
    /// Whether the feature is open to every caller.
    #[serde(default)]
    pub public_access: bool,
    /// Roles allowed to use the feature when it is not public.
    #[serde(default)]
    pub allowed_roles: Vec<RoleName>,
    /// Optional operator-facing description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FeatureFlag {
    /// Returns true when the flag opens its resource to every caller.
    #[must_use]
    pub const fn grants_public_access(&self) -> bool {
        self.enabled && self.public_access
    }
}

// ============================================================================
// SECTION: Fallback Grants
// ============================================================================

/// Declared fallback for the flexible authorization chain.
///
/// A role listed here may read (or request `*`) on the resource, and may
/// perform only the mutating actions listed in `write_actions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FallbackGrant {
    /// Role receiving the fallback.
    pub role: RoleName,
    /// Resource covered by the fallback.
    pub resource: ResourceName,
    /// Mutating actions the role may perform.
    #[serde(default)]
    pub write_actions: BTreeSet<Action>,
}

impl FallbackGrant {
    /// Returns true when this fallback covers the resource and action.
    #[must_use]
    pub fn covers(&self, resource: &ResourceName, action: &Action) -> bool {
        if self.resource != *resource {
            return false;
        }
        match action {
            Action::Read | Action::Any => true,
            other => self.write_actions.contains(other),
        }
    }
}

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Point-in-time view of role assignments and rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Role assignments.
    pub assignments: Vec<RoleAssignment>,
    /// Policy rules.
    pub rules: Vec<PolicyRule>,
}

impl PolicySnapshot {
    /// Resolves every role the subject holds, following role-to-role
    /// assignments transitively.
    ///
    /// Cycles terminate because each role is visited once. Subject ids in the
    /// reserved `role:` namespace hold no roles.
    #[must_use]
    pub fn roles_for(&self, subject: &SubjectId) -> BTreeSet<RoleName> {
        let mut held = BTreeSet::new();
        if subject.as_str().starts_with(ROLE_MEMBER_PREFIX) {
            return held;
        }
        let mut frontier = VecDeque::from([subject.as_str().to_string()]);
        while let Some(member) = frontier.pop_front() {
            for assignment in self.assignments.iter().filter(|a| a.member == member) {
                if held.insert(assignment.role.clone()) {
                    frontier.push_back(role_member(&assignment.role));
                }
            }
        }
        held
    }

    /// Returns the rules attached to any of the given roles.
    pub fn rules_for<'a>(
        &'a self,
        roles: &'a BTreeSet<RoleName>,
    ) -> impl Iterator<Item = &'a PolicyRule> + 'a {
        self.rules.iter().filter(move |rule| roles.contains(&rule.role))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_parses_known_and_named_forms() {
        assert_eq!(Action::parse("READ"), Action::Read);
        assert_eq!(Action::parse("*"), Action::Any);
        assert_eq!(Action::parse(" export "), Action::Named("export".to_string()));
        assert!(Action::Delete.is_mutating());
        assert!(!Action::Read.is_mutating());
    }

    #[test]
    fn roles_resolve_transitively_without_looping() {
        let snapshot = PolicySnapshot {
            assignments: vec![
                RoleAssignment::new("alice", "editor"),
                RoleAssignment::inherit("editor", "viewer"),
                RoleAssignment::inherit("viewer", "editor"),
            ],
            rules: Vec::new(),
        };
        let roles = snapshot.roles_for(&SubjectId::new("alice"));
        assert_eq!(roles.len(), 2);
        assert!(roles.contains(&RoleName::new("viewer")));
    }

    #[test]
    fn role_names_are_not_subjects_without_assignment() {
        let snapshot = PolicySnapshot {
            assignments: vec![RoleAssignment::inherit("editor", "viewer")],
            rules: Vec::new(),
        };
        assert!(snapshot.roles_for(&SubjectId::new("viewer")).is_empty());
        assert!(snapshot.roles_for(&SubjectId::new("role:editor")).is_empty());
    }

    #[test]
    fn subject_named_like_a_role_does_not_inherit_its_parents() {
        let snapshot = PolicySnapshot {
            assignments: vec![
                RoleAssignment::inherit("editor", "viewer"),
                RoleAssignment::new("editor", "intern"),
            ],
            rules: Vec::new(),
        };
        let roles = snapshot.roles_for(&SubjectId::new("editor"));
        assert_eq!(roles, BTreeSet::from([RoleName::new("intern")]));
        assert_eq!(RoleAssignment::inherit("editor", "viewer").member, "role:editor");
    }

    #[test]
    fn fallback_allows_reads_and_listed_writes_only() {
        let grant = FallbackGrant {
            role: RoleName::new("support"),
            resource: ResourceName::new("tickets"),
            write_actions: BTreeSet::from([Action::Update]),
        };
        let tickets = ResourceName::new("tickets");
        assert!(grant.covers(&tickets, &Action::Read));
        assert!(grant.covers(&tickets, &Action::Any));
        assert!(grant.covers(&tickets, &Action::Update));
        assert!(!grant.covers(&tickets, &Action::Delete));
        assert!(!grant.covers(&ResourceName::new("billing"), &Action::Read));
    }
}
