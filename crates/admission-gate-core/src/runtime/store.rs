// crates/admission-gate-core/src/runtime/store.rs
// ============================================================================
// Module: In-Memory Policy Store
// Description: Mutex-protected policy store for tests and single-node deployments.
// Purpose: Provide a PolicyStore without external storage.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The in-memory store keeps assignments and rules in ordered sets so that
//! snapshots are deterministic. It is seeded from configuration at startup;
//! mutations last only as long as the process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::FeatureFlag;
use crate::core::PolicyRule;
use crate::core::PolicySnapshot;
use crate::core::RoleAssignment;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyStoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Policy records held by the in-memory store.
#[derive(Debug, Default)]
struct PolicyState {
    /// Role assignments.
    assignments: BTreeSet<RoleAssignment>,
    /// Policy rules.
    rules: BTreeSet<PolicyRule>,
    /// Feature flags keyed by name.
    flags: BTreeMap<String, FeatureFlag>,
}

/// In-memory policy store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPolicyStore {
    /// Policy records protected by a mutex.
    state: Arc<Mutex<PolicyState>>,
}

impl InMemoryPolicyStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with the given records.
    #[must_use]
    pub fn seeded(snapshot: PolicySnapshot, flags: Vec<FeatureFlag>) -> Self {
        let state = PolicyState {
            assignments: snapshot.assignments.into_iter().collect(),
            rules: snapshot.rules.into_iter().collect(),
            flags: flags.into_iter().map(|flag| (flag.name.clone(), flag)).collect(),
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Locks the policy state.
    fn lock(&self) -> Result<MutexGuard<'_, PolicyState>, PolicyStoreError> {
        self.state
            .lock()
            .map_err(|_| PolicyStoreError::Store("policy store mutex poisoned".to_string()))
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn load_snapshot(&self) -> Result<PolicySnapshot, PolicyStoreError> {
        let state = self.lock()?;
        Ok(PolicySnapshot {
            assignments: state.assignments.iter().cloned().collect(),
            rules: state.rules.iter().cloned().collect(),
        })
    }

    fn feature_flag(&self, name: &str) -> Result<Option<FeatureFlag>, PolicyStoreError> {
        Ok(self.lock()?.flags.get(name).cloned())
    }

    fn list_flags(&self) -> Result<Vec<FeatureFlag>, PolicyStoreError> {
        Ok(self.lock()?.flags.values().cloned().collect())
    }

    fn grant_role(&self, assignment: &RoleAssignment) -> Result<bool, PolicyStoreError> {
        Ok(self.lock()?.assignments.insert(assignment.clone()))
    }

    fn revoke_role(&self, assignment: &RoleAssignment) -> Result<bool, PolicyStoreError> {
        Ok(self.lock()?.assignments.remove(assignment))
    }

    fn add_rule(&self, rule: &PolicyRule) -> Result<bool, PolicyStoreError> {
        Ok(self.lock()?.rules.insert(rule.clone()))
    }

    fn remove_rule(&self, rule: &PolicyRule) -> Result<bool, PolicyStoreError> {
        Ok(self.lock()?.rules.remove(rule))
    }

    fn upsert_flag(&self, flag: &FeatureFlag) -> Result<(), PolicyStoreError> {
        self.lock()?.flags.insert(flag.name.clone(), flag.clone());
        Ok(())
    }

    fn remove_flag(&self, name: &str) -> Result<bool, PolicyStoreError> {
        Ok(self.lock()?.flags.remove(name).is_some())
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
