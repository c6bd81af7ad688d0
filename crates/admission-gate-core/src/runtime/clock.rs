// crates/admission-gate-core/src/runtime/clock.rs
// ============================================================================
// Module: Clocks
// Description: System and manually advanced clock implementations.
// Purpose: Provide injectable time for window arithmetic and deterministic tests.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! [`SystemClock`] reads the OS clocks. [`ManualClock`] only moves when
//! advanced, which makes sliding-window behavior testable without sleeping.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::Instant;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use crate::interfaces::Clock;

// ============================================================================
// SECTION: System Clock
// ============================================================================

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
    }
}

// ============================================================================
// SECTION: Manual Clock
// ============================================================================

/// Clock that advances only when told to.
///
/// # Invariants
/// - `now()` and `unix_millis()` move together by the same offset.
#[derive(Debug)]
pub struct ManualClock {
    /// Monotonic origin.
    origin: Instant,
    /// Wall-clock origin in Unix milliseconds.
    origin_unix_ms: u64,
    /// Elapsed offset in milliseconds.
    offset_ms: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at the given Unix millisecond time.
    #[must_use]
    pub fn starting_at(origin_unix_ms: u64) -> Self {
        Self {
            origin: Instant::now(),
            origin_unix_ms,
            offset_ms: AtomicU64::new(0),
        }
    }

    /// Advances the clock.
    pub fn advance(&self, by: Duration) {
        let millis = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.offset_ms.fetch_add(millis, Ordering::SeqCst);
    }

    /// Returns the elapsed offset since creation.
    fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset()
    }

    fn unix_millis(&self) -> u64 {
        self.origin_unix_ms.saturating_add(self.offset_ms.load(Ordering::SeqCst))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_both_readings() {
        let clock = ManualClock::starting_at(1_000);
        let start = clock.now();
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now().duration_since(start), Duration::from_secs(2));
        assert_eq!(clock.unix_millis(), 3_000);
    }
}
