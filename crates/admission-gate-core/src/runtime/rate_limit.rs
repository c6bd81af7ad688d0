// crates/admission-gate-core/src/runtime/rate_limit.rs
// ============================================================================
// Module: Sliding-Window Rate Limiter
// Description: Per-client, per-path request throttling with statistics.
// Purpose: Bound how often one client can hit sensitive endpoints.
// Dependencies: crate::{core, interfaces}, tracing
// ============================================================================

//! ## Overview
//! The limiter keeps, for every `(client, path)` key and quota scope, the
//! timestamps of admitted requests inside the current window. Each check
//! prunes timestamps older than the window, denies when the remaining count
//! has reached the limit, and otherwise records the request. There is no
//! smoothing or token refill.
//!
//! Several quotas may apply to one request (for example `5/min` and
//! `20/hour` on the same path). [`RateLimiter::check_quotas`] decides all of
//! them before recording anything, so a request is either counted once in
//! every window or not at all.
//!
//! Windows and statistics share a single mutex so every decision and its
//! statistics update are observed atomically. State is in-memory only and
//! is lost on restart.
//!
//! # Invariants
//! - A window never holds more than `limit` timestamps.
//! - The key table never exceeds `max_tracked_keys`. Drained windows are
//!   swept to make room; live windows are never evicted, and a request that
//!   would need a new key while the table is full is denied.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use tracing::warn;

use crate::core::Audience;
use crate::interfaces::Clock;
use crate::runtime::statistics::BlockEvent;
use crate::runtime::statistics::DEFAULT_RECENT_BLOCKS_CAPACITY;
use crate::runtime::statistics::RateLimitSnapshot;
use crate::runtime::statistics::RateLimitStatistics;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default bound on tracked `(client, path)` keys.
pub const DEFAULT_MAX_TRACKED_KEYS: usize = 100_000;
/// User-agent prefix identifying the payment processor's webhook deliveries.
pub const DEFAULT_TRUSTED_AGENT_PREFIX: &str = "Stripe/";

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Throttling policy for a set of endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Policy name used in logs and env overrides.
    pub name: String,
    /// Exact request paths covered by this policy.
    pub paths: Vec<String>,
    /// Uppercase methods covered; empty covers every method.
    pub methods: Vec<String>,
    /// Maximum admitted requests per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
    /// Denial shape.
    pub audience: Audience,
    /// User-agent prefixes exempt from this policy.
    pub exempt_user_agent_prefixes: Vec<String>,
    /// Message returned to throttled callers.
    pub message: String,
}

impl RateLimitPolicy {
    /// Returns true when this policy covers the request.
    #[must_use]
    pub fn matches(&self, method: &str, path: &str) -> bool {
        let method_ok =
            self.methods.is_empty() || self.methods.iter().any(|m| m.eq_ignore_ascii_case(method));
        method_ok && self.paths.iter().any(|p| p == path)
    }

    /// Returns true when the user-agent is exempt from this policy.
    #[must_use]
    pub fn exempts(&self, user_agent: Option<&str>) -> bool {
        user_agent.is_some_and(|agent| {
            self.exempt_user_agent_prefixes.iter().any(|prefix| agent.starts_with(prefix.as_str()))
        })
    }

    /// Returns the built-in policy set: login 5/min, register 5/min,
    /// password reset 3/hour, webhook 10/min.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::browser("login", "/login", 5, Duration::from_secs(60)),
            Self::browser("register", "/register", 5, Duration::from_secs(60)),
            Self::browser("password_reset", "/password-reset", 3, Duration::from_secs(3_600)),
            Self {
                name: "webhook".to_string(),
                paths: vec!["/webhook".to_string()],
                methods: vec!["POST".to_string()],
                limit: 10,
                window: Duration::from_secs(60),
                audience: Audience::Machine,
                exempt_user_agent_prefixes: vec![DEFAULT_TRUSTED_AGENT_PREFIX.to_string()],
                message: "Rate limit exceeded".to_string(),
            },
        ]
    }

    /// Builds a POST-only browser policy.
    fn browser(name: &str, path: &str, limit: u32, window: Duration) -> Self {
        Self {
            name: name.to_string(),
            paths: vec![path.to_string()],
            methods: vec!["POST".to_string()],
            limit,
            window,
            audience: Audience::Browser,
            exempt_user_agent_prefixes: Vec::new(),
            message: "Too many attempts. Please try again later.".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Limiter verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Request admitted; `remaining` more fit in the current window.
    Permit {
        /// Requests still admissible in the window.
        remaining: u32,
    },
    /// Request denied until `retry_after` elapses.
    Deny {
        /// Time until a slot frees up.
        retry_after: Duration,
    },
}

impl RateDecision {
    /// Returns true for [`RateDecision::Permit`].
    #[must_use]
    pub const fn is_permit(&self) -> bool {
        matches!(self, Self::Permit { .. })
    }
}

/// One limit applied to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota<'a> {
    /// Window scope; quotas with different scopes never share timestamps.
    pub scope: &'a str,
    /// Maximum admitted requests per window.
    pub limit: u32,
    /// Window length.
    pub window: Duration,
}

/// Verdict over a set of quotas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    /// Every quota admitted the request; `remaining` is the tightest headroom.
    Permit {
        /// Requests still admissible before the tightest quota is reached.
        remaining: u32,
    },
    /// A quota denied the request and nothing was recorded.
    Deny {
        /// Index of the first denying quota.
        quota: usize,
        /// Time until that quota frees a slot.
        retry_after: Duration,
    },
}

/// Request attributes the limiter records.
#[derive(Debug, Clone, Copy)]
pub struct RateAttempt<'a> {
    /// Client identifier.
    pub client: &'a str,
    /// Request path.
    pub path: &'a str,
    /// Caller user-agent, recorded on block events.
    pub user_agent: Option<&'a str>,
}

// ============================================================================
// SECTION: Limiter
// ============================================================================

/// Limiter sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterSettings {
    /// Bound on tracked keys.
    pub max_tracked_keys: usize,
    /// Capacity of the recent-block ring.
    pub recent_blocks_capacity: usize,
}

impl Default for RateLimiterSettings {
    fn default() -> Self {
        Self {
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            recent_blocks_capacity: DEFAULT_RECENT_BLOCKS_CAPACITY,
        }
    }
}

/// Sliding-window rate limiter with embedded statistics.
pub struct RateLimiter {
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Bound on tracked keys.
    max_tracked_keys: usize,
    /// Windows and statistics under one lock.
    state: Mutex<LimiterState>,
}

/// Lock-protected limiter state.
struct LimiterState {
    /// Windows keyed by `(client, path)`.
    windows: HashMap<WindowKey, RateWindow>,
    /// Decision statistics.
    stats: RateLimitStatistics,
}

/// Key for one sliding window.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct WindowKey {
    /// Client identifier.
    client: String,
    /// Request path.
    path: String,
    /// Quota scope.
    scope: String,
}

/// Admitted timestamps for one key.
#[derive(Debug)]
struct RateWindow {
    /// Admitted request instants, oldest first.
    hits: VecDeque<Instant>,
    /// Window length last used for this key.
    window: Duration,
    /// Last time the key was checked.
    last_seen: Instant,
}

impl RateWindow {
    /// Drops timestamps that have left the window.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.hits.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.hits.pop_front();
            } else {
                break;
            }
        }
    }

    /// Time until enough timestamps leave the window to admit one request.
    fn retry_after(&self, now: Instant, limit: usize) -> Duration {
        if limit == 0 {
            return self.window;
        }
        let index = self.hits.len().saturating_sub(limit);
        self.hits.get(index).map_or(self.window, |hit| {
            self.window.saturating_sub(now.saturating_duration_since(*hit))
        })
    }
}

impl RateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, settings: RateLimiterSettings) -> Self {
        Self {
            clock,
            max_tracked_keys: settings.max_tracked_keys.max(1),
            state: Mutex::new(LimiterState {
                windows: HashMap::new(),
                stats: RateLimitStatistics::new(settings.recent_blocks_capacity),
            }),
        }
    }

    /// Checks and records one request for `(client, path)`.
    pub fn allow(&self, client: &str, path: &str, limit: u32, window: Duration) -> RateDecision {
        let attempt = RateAttempt {
            client,
            path,
            user_agent: None,
        };
        self.check(&attempt, limit, window)
    }

    /// Checks and records one request, keeping the user-agent for block events.
    pub fn check(&self, attempt: &RateAttempt<'_>, limit: u32, window: Duration) -> RateDecision {
        let quota = Quota {
            scope: "",
            limit,
            window,
        };
        match self.check_quotas(attempt, &[quota]) {
            QuotaDecision::Permit {
                remaining,
            } => RateDecision::Permit {
                remaining,
            },
            QuotaDecision::Deny {
                retry_after, ..
            } => RateDecision::Deny {
                retry_after,
            },
        }
    }

    /// Checks every quota and records the request only when all admit it.
    ///
    /// The attempt counts once in statistics whatever the number of quotas.
    /// An empty quota set admits the request without recording it.
    pub fn check_quotas(&self, attempt: &RateAttempt<'_>, quotas: &[Quota<'_>]) -> QuotaDecision {
        if quotas.is_empty() {
            return QuotaDecision::Permit {
                remaining: u32::MAX,
            };
        }
        let now = self.clock.now();
        let timestamp_ms = self.clock.unix_millis();
        let mut guard = self.lock();
        let state = &mut *guard;

        let keys: Vec<WindowKey> = quotas
            .iter()
            .map(|quota| WindowKey {
                client: attempt.client.to_string(),
                path: attempt.path.to_string(),
                scope: quota.scope.to_string(),
            })
            .collect();
        let mut denial = None;
        for (index, (key, quota)) in keys.iter().zip(quotas).enumerate() {
            let limit_len = usize::try_from(quota.limit).unwrap_or(usize::MAX);
            let Some(window) = state.windows.get_mut(key) else {
                if limit_len == 0 {
                    denial = Some((index, quota.window));
                    break;
                }
                continue;
            };
            window.window = quota.window;
            window.last_seen = now;
            window.prune(now);
            if window.hits.len() >= limit_len {
                denial = Some((index, window.retry_after(now, limit_len)));
                break;
            }
        }
        if denial.is_none() {
            let missing = keys.iter().filter(|key| !state.windows.contains_key(*key)).count();
            if missing > 0 && !make_room(&mut state.windows, now, self.max_tracked_keys, missing) {
                warn!(
                    client = attempt.client,
                    path = attempt.path,
                    "rate limiter key table full; request denied"
                );
                let index = keys.iter().position(|key| !state.windows.contains_key(key));
                let index = index.unwrap_or_default();
                let retry_after = quotas.get(index).map_or(Duration::ZERO, |quota| quota.window);
                denial = Some((index, retry_after));
            }
        }
        if let Some((quota, retry_after)) = denial {
            state.stats.record_block(BlockEvent {
                client: attempt.client.to_string(),
                path: attempt.path.to_string(),
                timestamp_ms,
                user_agent: attempt.user_agent.map(ToString::to_string),
            });
            return QuotaDecision::Deny {
                quota,
                retry_after,
            };
        }

        let mut remaining = u32::MAX;
        for (key, quota) in keys.into_iter().zip(quotas) {
            let window = state.windows.entry(key).or_insert_with(|| RateWindow {
                hits: VecDeque::new(),
                window: quota.window,
                last_seen: now,
            });
            window.hits.push_back(now);
            let admitted = u32::try_from(window.hits.len()).unwrap_or(u32::MAX);
            remaining = remaining.min(quota.limit.saturating_sub(admitted));
        }
        state.stats.record_permit(attempt.path);
        QuotaDecision::Permit {
            remaining,
        }
    }

    /// Returns a statistics snapshot.
    #[must_use]
    pub fn statistics(&self) -> RateLimitSnapshot {
        self.lock().stats.snapshot()
    }

    /// Clears statistics without touching windows.
    pub fn reset_statistics(&self) {
        self.lock().stats.reset();
    }

    /// Removes keys whose windows have drained; returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut guard = self.lock();
        let before = guard.windows.len();
        sweep_drained(&mut guard.windows, now);
        before - guard.windows.len()
    }

    /// Returns the number of tracked keys.
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().windows.len()
    }

    /// Locks state; a poisoned lock still holds consistent counters.
    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Drops every window with no timestamps left.
fn sweep_drained(windows: &mut HashMap<WindowKey, RateWindow>, now: Instant) {
    windows.retain(|_, window| {
        window.prune(now);
        !window.hits.is_empty()
    });
}

/// Ensures `needed` new keys fit; returns false when live windows fill the table.
fn make_room(
    windows: &mut HashMap<WindowKey, RateWindow>,
    now: Instant,
    max_keys: usize,
    needed: usize,
) -> bool {
    if windows.len().saturating_add(needed) <= max_keys {
        return true;
    }
    sweep_drained(windows, now);
    windows.len().saturating_add(needed) <= max_keys
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::clock::ManualClock;

    #[test]
    fn default_policies_cover_sensitive_endpoints() {
        let policies = RateLimitPolicy::defaults();
        let login = policies.iter().find(|p| p.name == "login");
        assert!(login.is_some_and(|p| p.matches("post", "/login") && !p.matches("GET", "/login")));
        let webhook = policies.iter().find(|p| p.audience == Audience::Machine);
        assert!(webhook.is_some_and(|p| p.exempts(Some("Stripe/1.0 (+https://stripe.com)"))));
        assert!(webhook.is_some_and(|p| !p.exempts(Some("GenericBot/2.0")) && !p.exempts(None)));
    }

    #[test]
    fn key_table_is_bounded() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(
            clock.clone(),
            RateLimiterSettings {
                max_tracked_keys: 2,
                recent_blocks_capacity: 10,
            },
        );
        limiter.allow("a", "/login", 5, Duration::from_secs(60));
        clock.advance(Duration::from_secs(1));
        limiter.allow("b", "/login", 5, Duration::from_secs(60));
        clock.advance(Duration::from_secs(1));
        let refused = limiter.allow("c", "/login", 5, Duration::from_secs(60));
        assert_eq!(
            refused,
            RateDecision::Deny {
                retry_after: Duration::from_secs(60)
            }
        );
        assert_eq!(limiter.tracked_keys(), 2);
        assert_eq!(limiter.statistics().total_blocked, 1);
    }

    #[test]
    fn drained_windows_are_swept() {
        let clock = Arc::new(ManualClock::default());
        let limiter = RateLimiter::new(clock.clone(), RateLimiterSettings::default());
        limiter.allow("a", "/login", 5, Duration::from_secs(60));
        clock.advance(Duration::from_secs(61));
        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
