// crates/admission-gate-core/src/interfaces/mod.rs
// ============================================================================
// Module: Admission Gate Interfaces
// Description: Backend-agnostic interfaces for time, sessions, policies, and ranges.
// Purpose: Define the contracts the gateway runtime uses to reach external state.
// Dependencies: crate::core, ipnet, thiserror
// ============================================================================

//! ## Overview
//! Interfaces decouple the gateway runtime from storage, transport, and the
//! system clock. Implementations must be thread-safe; every component is
//! shared across concurrent requests.
//!
//! Security posture: session, policy, and range data are security inputs;
//! implementations must fail closed by returning errors instead of empty
//! data when they cannot answer.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Instant;

use ipnet::IpNet;
use thiserror::Error;

use crate::core::FeatureFlag;
use crate::core::PolicyRule;
use crate::core::PolicySnapshot;
use crate::core::RangeCategory;
use crate::core::RoleAssignment;
use crate::core::SessionId;
use crate::core::SubjectId;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Time source for window arithmetic and event timestamps.
pub trait Clock: Send + Sync {
    /// Returns the monotonic instant used for window arithmetic.
    fn now(&self) -> Instant;

    /// Returns wall-clock time as Unix milliseconds.
    fn unix_millis(&self) -> u64;
}

// ============================================================================
// SECTION: Principal
// ============================================================================

/// Identity presented by a request.
///
/// The gateway never inspects transport types to learn who is calling; it
/// asks the principal instead.
pub trait Principal: Send + Sync {
    /// Returns the authenticated subject, if any.
    fn subject(&self) -> Option<&SubjectId>;

    /// Returns true when the caller is authenticated.
    fn is_authenticated(&self) -> bool {
        self.subject().is_some()
    }
}

/// Principal for callers without an authenticated subject.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

impl Principal for Anonymous {
    fn subject(&self) -> Option<&SubjectId> {
        None
    }
}

impl Principal for SubjectId {
    fn subject(&self) -> Option<&SubjectId> {
        Some(self)
    }
}

// ============================================================================
// SECTION: Session Store
// ============================================================================

/// Session store errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Store is unavailable or its lock is poisoned.
    #[error("session store unavailable: {0}")]
    Unavailable(String),
    /// Store rejected the write (capacity, size limits).
    #[error("session store rejected write: {0}")]
    Rejected(String),
}

/// Key-value session storage scoped by session identifier.
pub trait SessionStore: Send + Sync {
    /// Reads a session value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store cannot be read.
    fn get(&self, session: &SessionId, key: &str) -> Result<Option<String>, SessionError>;

    /// Writes a session value, creating the session if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the write fails.
    fn put(&self, session: &SessionId, key: &str, value: String) -> Result<(), SessionError>;

    /// Removes and returns a session value.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store cannot be updated.
    fn take(&self, session: &SessionId, key: &str) -> Result<Option<String>, SessionError>;
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Policy store errors.
#[derive(Debug, Error)]
pub enum PolicyStoreError {
    /// Store I/O error.
    #[error("policy store io error: {0}")]
    Io(String),
    /// Store data is invalid.
    #[error("policy store invalid data: {0}")]
    Invalid(String),
    /// Store data version is incompatible.
    #[error("policy store version mismatch: {0}")]
    VersionMismatch(String),
    /// Store reported an error.
    #[error("policy store error: {0}")]
    Store(String),
}

/// Storage for role assignments, policy rules, and feature flags.
///
/// Mutating operations return `true` when the store changed.
pub trait PolicyStore: Send + Sync {
    /// Loads the current assignments and rules.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the snapshot cannot be read.
    fn load_snapshot(&self) -> Result<PolicySnapshot, PolicyStoreError>;

    /// Loads a feature flag by name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the flag cannot be read.
    fn feature_flag(&self, name: &str) -> Result<Option<FeatureFlag>, PolicyStoreError>;

    /// Lists every feature flag ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when flags cannot be read.
    fn list_flags(&self) -> Result<Vec<FeatureFlag>, PolicyStoreError>;

    /// Adds a role assignment.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the write fails.
    fn grant_role(&self, assignment: &RoleAssignment) -> Result<bool, PolicyStoreError>;

    /// Removes a role assignment.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the write fails.
    fn revoke_role(&self, assignment: &RoleAssignment) -> Result<bool, PolicyStoreError>;

    /// Adds a policy rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the write fails.
    fn add_rule(&self, rule: &PolicyRule) -> Result<bool, PolicyStoreError>;

    /// Removes a policy rule.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the write fails.
    fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, PolicyStoreError>;

    /// Inserts or replaces a feature flag.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the write fails.
    fn upsert_flag(&self, flag: &FeatureFlag) -> Result<(), PolicyStoreError>;

    /// Removes a feature flag.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyStoreError`] when the write fails.
    fn remove_flag(&self, name: &str) -> Result<bool, PolicyStoreError>;
}

// ============================================================================
// SECTION: Range Sources
// ============================================================================

/// Range source errors.
#[derive(Debug, Error)]
pub enum RangeSourceError {
    /// Network or transport failure.
    #[error("range source transport error: {0}")]
    Transport(String),
    /// Publisher answered with a non-success status.
    #[error("range source returned status {0}")]
    Status(u16),
    /// Response body could not be interpreted.
    #[error("range source parse error: {0}")]
    Parse(String),
    /// Response contained no usable ranges.
    #[error("range source returned no ranges")]
    Empty,
}

/// Remote publisher of IP ranges for one category.
pub trait RangeSource: Send + Sync {
    /// Returns a stable source name for status reports.
    fn name(&self) -> &str;

    /// Returns the category of ranges this source publishes.
    fn category(&self) -> RangeCategory;

    /// Fetches the current ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RangeSourceError`] when the ranges cannot be fetched.
    fn fetch(&self) -> Result<Vec<IpNet>, RangeSourceError>;
}
