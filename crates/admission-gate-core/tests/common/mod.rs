// crates/admission-gate-core/tests/common/mod.rs
// ============================================================================
// Module: Common Test Fixtures
// Description: Shared stores, sources, and sinks for core gateway tests.
// Purpose: Provide reusable, deterministic test infrastructure.
// Dependencies: admission-gate-core, ipnet
// ============================================================================

//! ## Overview
//! Fixtures here build gateway components on a [`ManualClock`] so window
//! arithmetic is deterministic, and provide failing or scripted
//! collaborators to exercise fail-closed behavior.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use admission_gate_core::AuthorizationEngine;
use admission_gate_core::AuthzSettings;
use admission_gate_core::CsrfGuard;
use admission_gate_core::CsrfSettings;
use admission_gate_core::FeatureFlag;
use admission_gate_core::GatewayAuditEvent;
use admission_gate_core::GatewayAuditKind;
use admission_gate_core::GatewayAuditSink;
use admission_gate_core::GatewayPipeline;
use admission_gate_core::InMemoryPolicyStore;
use admission_gate_core::InMemorySessionStore;
use admission_gate_core::IpAllowList;
use admission_gate_core::ManualClock;
use admission_gate_core::PipelineParts;
use admission_gate_core::PipelineSettings;
use admission_gate_core::PolicyRule;
use admission_gate_core::PolicySnapshot;
use admission_gate_core::PolicyStore;
use admission_gate_core::PolicyStoreError;
use admission_gate_core::RangeCategory;
use admission_gate_core::RangeSource;
use admission_gate_core::RangeSourceError;
use admission_gate_core::RateLimiter;
use admission_gate_core::RateLimiterSettings;
use admission_gate_core::RoleAssignment;
use admission_gate_core::parse_range_entry;
use ipnet::IpNet;

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink that keeps every event for assertions.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<GatewayAuditEvent>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<GatewayAuditEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn count(&self, kind: GatewayAuditKind) -> usize {
        self.events().iter().filter(|event| event.kind == kind).count()
    }
}

impl GatewayAuditSink for RecordingAuditSink {
    fn record(&self, event: &GatewayAuditEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

// ============================================================================
// SECTION: Policy Stores
// ============================================================================

/// Policy store whose every call fails.
pub struct FailingPolicyStore;

impl FailingPolicyStore {
    fn err() -> PolicyStoreError {
        PolicyStoreError::Io("database offline".to_string())
    }
}

impl PolicyStore for FailingPolicyStore {
    fn load_snapshot(&self) -> Result<PolicySnapshot, PolicyStoreError> {
        Err(Self::err())
    }

    fn feature_flag(&self, _name: &str) -> Result<Option<FeatureFlag>, PolicyStoreError> {
        Err(Self::err())
    }

    fn list_flags(&self) -> Result<Vec<FeatureFlag>, PolicyStoreError> {
        Err(Self::err())
    }

    fn grant_role(&self, _assignment: &RoleAssignment) -> Result<bool, PolicyStoreError> {
        Err(Self::err())
    }

    fn revoke_role(&self, _assignment: &RoleAssignment) -> Result<bool, PolicyStoreError> {
        Err(Self::err())
    }

    fn add_rule(&self, _rule: &PolicyRule) -> Result<bool, PolicyStoreError> {
        Err(Self::err())
    }

    fn remove_rule(&self, _rule: &PolicyRule) -> Result<bool, PolicyStoreError> {
        Err(Self::err())
    }

    fn upsert_flag(&self, _flag: &FeatureFlag) -> Result<(), PolicyStoreError> {
        Err(Self::err())
    }

    fn remove_flag(&self, _name: &str) -> Result<bool, PolicyStoreError> {
        Err(Self::err())
    }
}

/// Builds a feature flag.
pub fn flag(name: &str, enabled: bool, public_access: bool, allowed_roles: &[&str]) -> FeatureFlag {
    FeatureFlag {
        name: name.to_string(),
        enabled,
        public_access,
        allowed_roles: allowed_roles.iter().map(|role| (*role).into()).collect(),
        description: None,
    }
}

// ============================================================================
// SECTION: Range Sources
// ============================================================================

/// Range source replaying scripted results, repeating the last one.
pub struct ScriptedSource {
    name: String,
    category: RangeCategory,
    script: Mutex<VecDeque<Result<Vec<IpNet>, u16>>>,
}

impl ScriptedSource {
    pub fn new(name: &str, category: RangeCategory, script: Vec<Result<Vec<&str>, u16>>) -> Self {
        let script = script
            .into_iter()
            .map(|step| {
                step.map(|entries| entries.into_iter().filter_map(parse_range_entry).collect())
            })
            .collect();
        Self {
            name: name.to_string(),
            category,
            script: Mutex::new(script),
        }
    }
}

impl RangeSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> RangeCategory {
        self.category
    }

    fn fetch(&self) -> Result<Vec<IpNet>, RangeSourceError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| RangeSourceError::Transport("script poisoned".to_string()))?;
        let step = if script.len() > 1 { script.pop_front() } else { script.front().cloned() };
        match step {
            Some(Ok(networks)) => Ok(networks),
            Some(Err(status)) => Err(RangeSourceError::Status(status)),
            None => Err(RangeSourceError::Transport("no script".to_string())),
        }
    }
}

// ============================================================================
// SECTION: Gateway Builders
// ============================================================================

/// Fully wired pipeline plus handles for assertions.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub sessions: Arc<InMemorySessionStore>,
    pub policies: Arc<dyn PolicyStore>,
    pub allowlist: Arc<IpAllowList>,
    pub audit: Arc<RecordingAuditSink>,
    pub pipeline: GatewayPipeline,
}

/// Options for building a harness.
pub struct HarnessOptions {
    pub settings: PipelineSettings,
    pub csrf: CsrfSettings,
    pub authz: AuthzSettings,
    pub policies: Arc<dyn PolicyStore>,
    pub sources: Vec<Arc<dyn RangeSource>>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            settings: PipelineSettings::default(),
            csrf: CsrfSettings::default(),
            authz: AuthzSettings::default(),
            policies: Arc::new(InMemoryPolicyStore::new()),
            sources: Vec::new(),
        }
    }
}

/// Builds a harness from options.
pub fn harness(options: HarnessOptions) -> Harness {
    let clock = Arc::new(ManualClock::default());
    let sessions = Arc::new(InMemorySessionStore::new(
        clock.clone(),
        Duration::from_secs(3_600),
        1_000,
    ));
    let audit = Arc::new(RecordingAuditSink::default());
    let limiter = Arc::new(RateLimiter::new(clock.clone(), RateLimiterSettings::default()));
    let allowlist = Arc::new(IpAllowList::new(clock.clone(), options.sources, audit.clone()));
    let pipeline = GatewayPipeline::new(
        PipelineParts {
            clock: clock.clone(),
            limiter,
            csrf: CsrfGuard::new(sessions.clone(), options.csrf),
            allowlist: allowlist.clone(),
            authz: AuthorizationEngine::new(options.policies.clone(), options.authz),
            audit: audit.clone(),
        },
        options.settings,
    );
    Harness {
        clock,
        sessions,
        policies: options.policies,
        allowlist,
        audit,
        pipeline,
    }
}
