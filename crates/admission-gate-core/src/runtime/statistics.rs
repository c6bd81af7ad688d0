// crates/admission-gate-core/src/runtime/statistics.rs
// ============================================================================
// Module: Rate Limit Statistics
// Description: Aggregate counters and a bounded ring of recent block events.
// Purpose: Give operators a snapshot of limiter pressure and repeat offenders.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Statistics are owned by the rate limiter and mutated inside its critical
//! section, so a snapshot never observes a decision half-recorded. This
//! type is deliberately lock-free; callers provide the synchronization.
//!
//! # Invariants
//! - The recent-block ring never exceeds its capacity; the oldest event is
//!   evicted first.
//! - Per-client offense counts are bounded; the smallest count is evicted
//!   when a new offender arrives at capacity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::VecDeque;

use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default capacity of the recent-block ring.
pub const DEFAULT_RECENT_BLOCKS_CAPACITY: usize = 100;
/// Number of offenders reported in a snapshot.
pub const TOP_OFFENDERS_REPORTED: usize = 10;
/// Maximum distinct clients with tracked offense counts.
const MAX_TRACKED_OFFENDERS: usize = 10_000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One denied request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockEvent {
    /// Client identifier (peer address).
    pub client: String,
    /// Request path.
    pub path: String,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: u64,
    /// Caller user-agent, when supplied.
    pub user_agent: Option<String>,
}

/// Attempts and denials for one endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCounters {
    /// Requests evaluated.
    pub attempts: u64,
    /// Requests denied.
    pub blocked: u64,
}

/// Offense count for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffenderCount {
    /// Client identifier.
    pub client: String,
    /// Requests denied for this client.
    pub blocked: u64,
}

/// Point-in-time copy of limiter statistics.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    /// Requests evaluated.
    pub total_attempts: u64,
    /// Requests denied.
    pub total_blocked: u64,
    /// `total_blocked / total_attempts`, or 0 with no attempts.
    pub block_rate: f64,
    /// Distinct clients with at least one denial.
    pub distinct_offenders: usize,
    /// Clients with the most denials, highest first.
    pub top_offenders: Vec<OffenderCount>,
    /// Recent denials, newest first.
    pub recent_blocks: Vec<BlockEvent>,
    /// Per-endpoint counters keyed by path.
    pub endpoints: BTreeMap<String, EndpointCounters>,
}

/// Mutable statistics state.
#[derive(Debug)]
pub struct RateLimitStatistics {
    /// Ring capacity.
    capacity: usize,
    /// Requests evaluated.
    total_attempts: u64,
    /// Requests denied.
    total_blocked: u64,
    /// Denials per client.
    offenders: HashMap<String, u64>,
    /// Recent denials, oldest first.
    recent: VecDeque<BlockEvent>,
    /// Per-endpoint counters.
    endpoints: HashMap<String, EndpointCounters>,
}

impl RateLimitStatistics {
    /// Creates empty statistics with the given ring capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            total_attempts: 0,
            total_blocked: 0,
            offenders: HashMap::new(),
            recent: VecDeque::with_capacity(capacity.min(DEFAULT_RECENT_BLOCKS_CAPACITY)),
            endpoints: HashMap::new(),
        }
    }

    /// Records an admitted request.
    pub fn record_permit(&mut self, path: &str) {
        self.total_attempts = self.total_attempts.saturating_add(1);
        let counters = self.endpoints.entry(path.to_string()).or_default();
        counters.attempts = counters.attempts.saturating_add(1);
    }

    /// Records a denied request.
    pub fn record_block(&mut self, event: BlockEvent) {
        self.total_attempts = self.total_attempts.saturating_add(1);
        self.total_blocked = self.total_blocked.saturating_add(1);
        let counters = self.endpoints.entry(event.path.clone()).or_default();
        counters.attempts = counters.attempts.saturating_add(1);
        counters.blocked = counters.blocked.saturating_add(1);
        self.bump_offender(&event.client);
        if self.capacity == 0 {
            return;
        }
        while self.recent.len() >= self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(event);
    }

    /// Returns a snapshot of the current counters.
    #[must_use]
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let mut top: Vec<OffenderCount> = self
            .offenders
            .iter()
            .map(|(client, blocked)| OffenderCount {
                client: client.clone(),
                blocked: *blocked,
            })
            .collect();
        top.sort_by(|a, b| b.blocked.cmp(&a.blocked).then_with(|| a.client.cmp(&b.client)));
        top.truncate(TOP_OFFENDERS_REPORTED);
        RateLimitSnapshot {
            total_attempts: self.total_attempts,
            total_blocked: self.total_blocked,
            block_rate: block_rate(self.total_blocked, self.total_attempts),
            distinct_offenders: self.offenders.len(),
            top_offenders: top,
            recent_blocks: self.recent.iter().rev().cloned().collect(),
            endpoints: self.endpoints.iter().map(|(path, c)| (path.clone(), *c)).collect(),
        }
    }

    /// Clears every counter and the recent-block ring.
    pub fn reset(&mut self) {
        self.total_attempts = 0;
        self.total_blocked = 0;
        self.offenders.clear();
        self.recent.clear();
        self.endpoints.clear();
    }

    /// Increments the offense count for a client, evicting the smallest
    /// count when the table is full.
    fn bump_offender(&mut self, client: &str) {
        if let Some(count) = self.offenders.get_mut(client) {
            *count = count.saturating_add(1);
            return;
        }
        if self.offenders.len() >= MAX_TRACKED_OFFENDERS {
            let smallest = self
                .offenders
                .iter()
                .min_by_key(|(_, count)| **count)
                .map(|(key, _)| key.clone());
            if let Some(key) = smallest {
                self.offenders.remove(&key);
            }
        }
        self.offenders.insert(client.to_string(), 1);
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Computes the fraction of denied requests.
#[allow(clippy::cast_precision_loss, reason = "Block rate is an approximate ratio for display.")]
fn block_rate(blocked: u64, attempts: u64) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    blocked as f64 / attempts as f64
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn block(client: &str, ts: u64) -> BlockEvent {
        BlockEvent {
            client: client.to_string(),
            path: "/login".to_string(),
            timestamp_ms: ts,
            user_agent: None,
        }
    }

    #[test]
    fn ring_evicts_oldest_first() {
        let mut stats = RateLimitStatistics::new(3);
        for ts in 0 .. 5 {
            stats.record_block(block("10.0.0.1", ts));
        }
        let snapshot = stats.snapshot();
        let stamps: Vec<u64> = snapshot.recent_blocks.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![4, 3, 2]);
        assert_eq!(snapshot.total_blocked, 5);
    }

    #[test]
    fn snapshot_ranks_offenders_and_computes_rate() {
        let mut stats = RateLimitStatistics::new(DEFAULT_RECENT_BLOCKS_CAPACITY);
        stats.record_permit("/login");
        stats.record_permit("/login");
        stats.record_block(block("a", 1));
        stats.record_block(block("b", 2));
        stats.record_block(block("b", 3));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_attempts, 5);
        assert!((snapshot.block_rate - 0.6).abs() < f64::EPSILON);
        assert_eq!(snapshot.top_offenders[0].client, "b");
        assert_eq!(snapshot.top_offenders[0].blocked, 2);
        assert_eq!(snapshot.endpoints["/login"].blocked, 3);
    }

    #[test]
    fn reset_clears_everything() {
        let mut stats = RateLimitStatistics::new(10);
        stats.record_block(block("a", 1));
        stats.reset();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.total_attempts, 0);
        assert!(snapshot.recent_blocks.is_empty());
        assert!(snapshot.endpoints.is_empty());
    }
}
