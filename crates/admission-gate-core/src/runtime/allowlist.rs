// crates/admission-gate-core/src/runtime/allowlist.rs
// ============================================================================
// Module: IP Allow-List
// Description: Category-tagged CIDR set refreshed from remote range publishers.
// Purpose: Admit webhook calls only from the payment processor's published ranges.
// Dependencies: crate::{core, interfaces}, ipnet, serde, tracing
// ============================================================================

//! ## Overview
//! A refresh fetches every configured source, unions the successful
//! results, and atomically replaces the active set. Sources that fail (or
//! return nothing usable) are reported individually; if every source fails
//! the previous set stays active and the list is marked degraded.
//!
//! Membership is a linear scan over the active set. Readers clone an `Arc`
//! under the read lock and scan without holding it, so the write lock only
//! ever covers the pointer swap.
//!
//! # Invariants
//! - The active set is always the complete union from one refresh.
//! - An empty set admits nobody.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::RwLock;

use ipnet::IpNet;
use serde::Serialize;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::AuditDecision;
use crate::core::GatewayAuditEvent;
use crate::core::GatewayAuditKind;
use crate::core::GatewayAuditSink;
use crate::core::RangeCategory;
use crate::core::TaggedRange;
use crate::core::normalize_ip;
use crate::interfaces::Clock;
use crate::interfaces::RangeSource;
use crate::interfaces::RangeSourceError;

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of one refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Every source succeeded.
    Ok {
        /// Ranges now active.
        ranges: usize,
    },
    /// Some sources failed; the union of the rest is active.
    PartialFailure {
        /// Ranges now active.
        ranges: usize,
        /// Names of failed sources.
        failed_sources: Vec<String>,
    },
    /// Every source failed; the previous set is still active.
    TotalFailure {
        /// Names of failed sources.
        failed_sources: Vec<String>,
    },
}

impl RefreshOutcome {
    /// Returns a stable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Ok {
                ..
            } => "ok",
            Self::PartialFailure {
                ..
            } => "partial_failure",
            Self::TotalFailure {
                ..
            } => "total_failure",
        }
    }

    /// Returns true when the active set was replaced.
    #[must_use]
    pub const fn replaced(&self) -> bool {
        !matches!(self, Self::TotalFailure { .. })
    }
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Per-source refresh status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    /// Source name.
    pub name: String,
    /// Source category.
    pub category: RangeCategory,
    /// Ranges returned by the last successful fetch.
    pub ranges: usize,
    /// Unix ms of the last successful fetch.
    pub last_success_ms: Option<u64>,
    /// Error from the last fetch, if it failed.
    pub last_error: Option<String>,
}

/// Operator-facing allow-list status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllowListStatus {
    /// Unix ms when the active set was last replaced.
    pub last_updated_ms: Option<u64>,
    /// Unix ms of the last refresh attempt.
    pub last_attempt_ms: Option<u64>,
    /// Ranges in the active set.
    pub range_count: usize,
    /// Active ranges per category.
    pub categories: BTreeMap<RangeCategory, usize>,
    /// True when the last refresh was not fully successful or the set is empty.
    pub degraded: bool,
    /// Label of the last refresh outcome.
    pub last_outcome: Option<&'static str>,
    /// Per-source status.
    pub sources: Vec<SourceStatus>,
}

// ============================================================================
// SECTION: Allow-List
// ============================================================================

/// Refreshable IP allow-list.
pub struct IpAllowList {
    /// Time source for status timestamps.
    clock: Arc<dyn Clock>,
    /// Range publishers.
    sources: Vec<Arc<dyn RangeSource>>,
    /// Active range set.
    ranges: RwLock<Arc<Vec<TaggedRange>>>,
    /// Refresh status.
    status: Mutex<AllowListStatus>,
    /// Audit sink for refresh results.
    audit: Arc<dyn GatewayAuditSink>,
    /// Serializes refreshes so results land in order.
    refresh_lock: Mutex<()>,
}

impl IpAllowList {
    /// Creates an empty allow-list over the given sources.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        sources: Vec<Arc<dyn RangeSource>>,
        audit: Arc<dyn GatewayAuditSink>,
    ) -> Self {
        let status = AllowListStatus {
            last_updated_ms: None,
            last_attempt_ms: None,
            range_count: 0,
            categories: BTreeMap::new(),
            degraded: true,
            last_outcome: None,
            sources: sources
                .iter()
                .map(|source| SourceStatus {
                    name: source.name().to_string(),
                    category: source.category(),
                    ranges: 0,
                    last_success_ms: None,
                    last_error: None,
                })
                .collect(),
        };
        Self {
            clock,
            sources,
            ranges: RwLock::new(Arc::new(Vec::new())),
            status: Mutex::new(status),
            audit,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Fetches every source and swaps in the union of the successful ones.
    pub fn refresh(&self) -> RefreshOutcome {
        let _serial = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let attempt_ms = self.clock.unix_millis();
        let mut merged: Vec<TaggedRange> = Vec::new();
        let mut failed_sources = Vec::new();
        let mut results: Vec<Result<usize, String>> = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            match fetch_source(source.as_ref()) {
                Ok(networks) => {
                    results.push(Ok(networks.len()));
                    merged.extend(networks.into_iter().map(|network| TaggedRange {
                        network,
                        category: source.category(),
                    }));
                }
                Err(err) => {
                    warn!(source = source.name(), error = %err, "ip range source failed");
                    failed_sources.push(source.name().to_string());
                    results.push(Err(err.to_string()));
                }
            }
        }

        let succeeded = results.iter().any(Result::is_ok);
        let outcome = if !succeeded {
            RefreshOutcome::TotalFailure {
                failed_sources,
            }
        } else {
            merged.sort_unstable();
            merged.dedup();
            let count = merged.len();
            self.swap(merged);
            if failed_sources.is_empty() {
                RefreshOutcome::Ok {
                    ranges: count,
                }
            } else {
                RefreshOutcome::PartialFailure {
                    ranges: count,
                    failed_sources,
                }
            }
        };

        self.record_status(&outcome, &results, attempt_ms);
        self.log_outcome(&outcome);
        outcome
    }

    /// Returns true when the address falls in the active set.
    #[must_use]
    pub fn is_allowed(&self, ip: IpAddr) -> bool {
        let active = self.active();
        let ip = normalize_ip(ip);
        active.iter().any(|range| range.contains(ip))
    }

    /// Returns the active range set.
    #[must_use]
    pub fn active(&self) -> Arc<Vec<TaggedRange>> {
        Arc::clone(&self.ranges.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Returns a copy of the refresh status.
    #[must_use]
    pub fn status(&self) -> AllowListStatus {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replaces the active set.
    fn swap(&self, ranges: Vec<TaggedRange>) {
        let next = Arc::new(ranges);
        *self.ranges.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Updates the status snapshot after a refresh.
    fn record_status(
        &self,
        outcome: &RefreshOutcome,
        results: &[Result<usize, String>],
        attempt_ms: u64,
    ) {
        let active = self.active();
        let mut categories = BTreeMap::new();
        for range in active.iter() {
            *categories.entry(range.category).or_insert(0) += 1;
        }
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        status.last_attempt_ms = Some(attempt_ms);
        if outcome.replaced() {
            status.last_updated_ms = Some(attempt_ms);
        }
        status.range_count = active.len();
        status.categories = categories;
        status.degraded = !matches!(outcome, RefreshOutcome::Ok { .. }) || active.is_empty();
        status.last_outcome = Some(outcome.label());
        for (entry, result) in status.sources.iter_mut().zip(results) {
            match result {
                Ok(count) => {
                    entry.ranges = *count;
                    entry.last_success_ms = Some(attempt_ms);
                    entry.last_error = None;
                }
                Err(message) => entry.last_error = Some(message.clone()),
            }
        }
    }

    /// Logs and audits a refresh outcome.
    fn log_outcome(&self, outcome: &RefreshOutcome) {
        let decision = match outcome {
            RefreshOutcome::Ok {
                ranges,
            } => {
                info!(ranges, "ip allow-list refreshed");
                AuditDecision::Allow
            }
            RefreshOutcome::PartialFailure {
                ranges,
                failed_sources,
            } => {
                let failed = failed_sources.join(",");
                warn!(ranges, failed = %failed, "ip allow-list partially refreshed");
                AuditDecision::Allow
            }
            RefreshOutcome::TotalFailure {
                failed_sources,
            } => {
                error!(
                    failed = %failed_sources.join(","),
                    "ip allow-list refresh failed; keeping previous ranges"
                );
                AuditDecision::Deny
            }
        };
        let event = GatewayAuditEvent::new(
            GatewayAuditKind::RangeRefresh,
            decision,
            self.clock.unix_millis(),
        )
        .with_reason(outcome.label());
        self.audit.record(&event);
    }
}

// ============================================================================
// SECTION: Static Source
// ============================================================================

/// Range source serving a fixed list, for pinned ranges and tests.
#[derive(Debug, Clone)]
pub struct StaticRangeSource {
    /// Source name.
    name: String,
    /// Published category.
    category: RangeCategory,
    /// Fixed networks.
    networks: Vec<IpNet>,
}

impl StaticRangeSource {
    /// Creates a static source.
    #[must_use]
    pub fn new(name: impl Into<String>, category: RangeCategory, networks: Vec<IpNet>) -> Self {
        Self {
            name: name.into(),
            category,
            networks,
        }
    }
}

impl RangeSource for StaticRangeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> RangeCategory {
        self.category
    }

    fn fetch(&self) -> Result<Vec<IpNet>, RangeSourceError> {
        Ok(self.networks.clone())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Fetches one source, treating an empty result as a failure.
fn fetch_source(source: &dyn RangeSource) -> Result<Vec<IpNet>, RangeSourceError> {
    let networks = source.fetch()?;
    if networks.is_empty() {
        return Err(RangeSourceError::Empty);
    }
    Ok(networks)
}
