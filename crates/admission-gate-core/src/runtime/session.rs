// crates/admission-gate-core/src/runtime/session.rs
// ============================================================================
// Module: In-Memory Session Store
// Description: Bounded, idle-expiring session storage.
// Purpose: Hold CSRF tokens, subjects, and flash notices per browser session.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Sessions expire after an idle TTL and the table is bounded. At capacity
//! expired sessions are purged first, then a batch of the least recently
//! used anonymous sessions is evicted. A session is anonymous when it holds
//! none of the configured retained keys (the authenticated subject, for
//! example), so a flood of fresh visitors cannot log existing users out.
//! When only retained sessions remain, a write that would open another
//! anonymous session is rejected; a write of a retained key evicts the least
//! recently used retained session instead.
//!
//! Session data is process-local and lost on restart.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::Instant;

use crate::core::SessionId;
use crate::interfaces::Clock;
use crate::interfaces::SessionError;
use crate::interfaces::SessionStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default idle lifetime of a session.
pub const DEFAULT_SESSION_IDLE_TTL: Duration = Duration::from_secs(8 * 3_600);
/// Default bound on live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 50_000;
/// Share of the table freed per eviction pass, as a divisor of capacity.
const EVICTION_BATCH_DIVISOR: usize = 64;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Values and access time for one session.
#[derive(Debug)]
struct SessionEntry {
    /// Session key-value pairs.
    values: BTreeMap<String, String>,
    /// Last read or write.
    last_access: Instant,
}

/// In-memory session store.
#[derive(Clone)]
pub struct InMemorySessionStore {
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Idle lifetime.
    idle_ttl: Duration,
    /// Bound on live sessions.
    max_sessions: usize,
    /// Keys whose presence protects a session from anonymous eviction.
    retained_keys: Arc<[String]>,
    /// Session table.
    sessions: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, idle_ttl: Duration, max_sessions: usize) -> Self {
        Self {
            clock,
            idle_ttl,
            max_sessions: max_sessions.max(1),
            retained_keys: Arc::from(Vec::new()),
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Marks keys that make a session non-anonymous for eviction purposes.
    #[must_use]
    pub fn with_retained_keys<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.retained_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the number of live sessions, including not-yet-purged expired ones.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store lock is poisoned.
    pub fn len(&self) -> Result<usize, SessionError> {
        Ok(self.lock()?.len())
    }

    /// Returns true when no sessions are stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, SessionError> {
        Ok(self.lock()?.is_empty())
    }

    /// Drops every expired session; returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        Ok(before - sessions.len())
    }

    /// Locks the session table.
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, SessionEntry>>, SessionError> {
        self.sessions
            .lock()
            .map_err(|_| SessionError::Unavailable("session store mutex poisoned".to_string()))
    }

    /// Returns true when the entry has been idle past the TTL.
    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        now.saturating_duration_since(entry.last_access) >= self.idle_ttl
    }

    /// Returns true when the entry holds a retained key.
    fn is_retained(&self, entry: &SessionEntry) -> bool {
        self.retained_keys.iter().any(|key| entry.values.contains_key(key))
    }

    /// Makes room for one new session.
    fn make_room(
        &self,
        sessions: &mut HashMap<SessionId, SessionEntry>,
        now: Instant,
        new_is_retained: bool,
    ) -> Result<(), SessionError> {
        if sessions.len() < self.max_sessions {
            return Ok(());
        }
        sessions.retain(|_, entry| !self.is_expired(entry, now));
        if sessions.len() < self.max_sessions {
            return Ok(());
        }
        let batch = (self.max_sessions / EVICTION_BATCH_DIVISOR).max(1);
        let excess = sessions.len().saturating_add(1).saturating_sub(self.max_sessions);
        let mut anonymous: Vec<(Instant, SessionId)> = sessions
            .iter()
            .filter(|(_, entry)| !self.is_retained(entry))
            .map(|(id, entry)| (entry.last_access, id.clone()))
            .collect();
        let evict = anonymous.len().min(excess.max(batch));
        if evict > 0 {
            if evict < anonymous.len() {
                anonymous.select_nth_unstable_by_key(evict, |(last_access, _)| *last_access);
            }
            for (_, id) in anonymous.into_iter().take(evict) {
                sessions.remove(&id);
            }
        }
        if sessions.len() < self.max_sessions {
            return Ok(());
        }
        if !new_is_retained {
            return Err(SessionError::Rejected("session table full".to_string()));
        }
        let oldest = sessions
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(id, _)| id.clone());
        if let Some(id) = oldest {
            sessions.remove(&id);
        }
        Ok(())
    }

    /// Returns a live entry, dropping it first if expired.
    fn live_entry<'a>(
        &self,
        sessions: &'a mut HashMap<SessionId, SessionEntry>,
        session: &SessionId,
        now: Instant,
    ) -> Option<&'a mut SessionEntry> {
        let expired = sessions.get(session).is_some_and(|entry| self.is_expired(entry, now));
        if expired {
            sessions.remove(session);
            return None;
        }
        let entry = sessions.get_mut(session)?;
        entry.last_access = now;
        Some(entry)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get(&self, session: &SessionId, key: &str) -> Result<Option<String>, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        let entry = self.live_entry(&mut sessions, session, now);
        Ok(entry.and_then(|entry| entry.values.get(key).cloned()))
    }

    fn put(&self, session: &SessionId, key: &str, value: String) -> Result<(), SessionError> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        if let Some(entry) = self.live_entry(&mut sessions, session, now) {
            entry.values.insert(key.to_string(), value);
            return Ok(());
        }
        let retained = self.retained_keys.iter().any(|retained| retained == key);
        self.make_room(&mut sessions, now, retained)?;
        let mut values = BTreeMap::new();
        values.insert(key.to_string(), value);
        sessions.insert(
            session.clone(),
            SessionEntry {
                values,
                last_access: now,
            },
        );
        Ok(())
    }

    fn take(&self, session: &SessionId, key: &str) -> Result<Option<String>, SessionError> {
        let now = self.clock.now();
        let mut sessions = self.lock()?;
        Ok(self.live_entry(&mut sessions, session, now).and_then(|entry| entry.values.remove(key)))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
