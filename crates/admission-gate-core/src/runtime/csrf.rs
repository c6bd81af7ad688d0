// crates/admission-gate-core/src/runtime/csrf.rs
// ============================================================================
// Module: CSRF Guard
// Description: Session-bound CSRF token issuance, validation, and rotation.
// Purpose: Reject state-changing browser requests that lack the session's token.
// Dependencies: crate::{core, interfaces}, base64, rand, subtle
// ============================================================================

//! ## Overview
//! Each session holds at most one CSRF token. Safe requests create the token
//! lazily and never rotate it. Unsafe requests must present the token; a
//! match rotates it immediately, so a consumed token can never be replayed.
//! Concurrent rotations on one session are last-writer-wins; the loser's
//! next submission is rejected and must refetch the form.
//!
//! Security posture: tokens are 32 bytes from the OS CSPRNG and compared in
//! constant time. Bypasses exist only for test mode.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use subtle::ConstantTimeEq;

use crate::core::SessionId;
use crate::core::path_within_prefix;
use crate::interfaces::SessionError;
use crate::interfaces::SessionStore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session key holding the current token.
pub const CSRF_SESSION_KEY: &str = "_csrf_token";
/// Form field carrying the token on form posts.
pub const CSRF_FORM_FIELD: &str = "csrf_token";
/// Header carrying the token on scripted requests and safe responses.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Header requesting a test-mode bypass.
pub const CSRF_BYPASS_HEADER: &str = "x-csrf-bypass";
/// Default path prefixes that skip CSRF checks.
pub const DEFAULT_CSRF_EXEMPT_PREFIXES: [&str; 1] = ["/webhook"];
/// Random bytes per token.
const TOKEN_BYTES: usize = 32;

// ============================================================================
// SECTION: Types
// ============================================================================

/// CSRF token value.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfToken(String);

impl CsrfToken {
    /// Generates a fresh random token.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Returns the token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares a presented value in constant time.
    #[must_use]
    pub fn matches(&self, presented: &str) -> bool {
        self.0.as_bytes().ct_eq(presented.as_bytes()).into()
    }
}

impl fmt::Debug for CsrfToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CsrfToken(<redacted>)")
    }
}

/// CSRF enforcement settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsrfSettings {
    /// Global enforcement toggle; disabling is honored only in test mode.
    pub enabled: bool,
    /// Development test mode; required for any bypass.
    pub test_mode: bool,
    /// Path prefixes that skip CSRF checks entirely.
    pub exempt_path_prefixes: Vec<String>,
}

impl Default for CsrfSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            test_mode: false,
            exempt_path_prefixes: DEFAULT_CSRF_EXEMPT_PREFIXES
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl CsrfSettings {
    /// Returns true when the path skips CSRF checks.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_path_prefixes.iter().any(|prefix| path_within_prefix(path, prefix))
    }

    /// Returns true when validation may be skipped for this request.
    ///
    /// Both the global toggle and the per-request signal require test mode.
    #[must_use]
    pub const fn bypass_allowed(&self, bypass_signal: bool) -> bool {
        self.test_mode && (!self.enabled || bypass_signal)
    }
}

/// Why a CSRF check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsrfRejection {
    /// Request carried no token.
    MissingToken,
    /// Session has no token to compare against.
    NoSessionToken,
    /// Token did not match.
    Mismatch,
}

impl CsrfRejection {
    /// Returns a stable reason label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingToken => "missing_token",
            Self::NoSessionToken => "no_session_token",
            Self::Mismatch => "token_mismatch",
        }
    }
}

/// Result of checking an unsafe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrfVerdict {
    /// Token matched; the session now holds `next`.
    Accepted {
        /// Rotated token for the session.
        next: CsrfToken,
    },
    /// Token missing or wrong.
    Rejected(CsrfRejection),
    /// Validation skipped through a test-mode bypass.
    Bypassed,
}

// ============================================================================
// SECTION: Guard
// ============================================================================

/// Session-bound CSRF token manager.
#[derive(Clone)]
pub struct CsrfGuard {
    /// Session storage holding tokens.
    store: Arc<dyn SessionStore>,
    /// Enforcement settings.
    settings: CsrfSettings,
}

impl CsrfGuard {
    /// Creates a guard over the given session store.
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, settings: CsrfSettings) -> Self {
        Self {
            store,
            settings,
        }
    }

    /// Returns the enforcement settings.
    #[must_use]
    pub const fn settings(&self) -> &CsrfSettings {
        &self.settings
    }

    /// Returns the session's token, creating one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session store fails.
    pub fn issue_or_get(&self, session: &SessionId) -> Result<CsrfToken, SessionError> {
        if let Some(existing) = self.store.get(session, CSRF_SESSION_KEY)? {
            return Ok(CsrfToken(existing));
        }
        self.rotate(session)
    }

    /// Replaces the session's token with a fresh one.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session store fails.
    pub fn rotate(&self, session: &SessionId) -> Result<CsrfToken, SessionError> {
        let token = CsrfToken::generate();
        self.store.put(session, CSRF_SESSION_KEY, token.as_str().to_string())?;
        Ok(token)
    }

    /// Validates a presented token and rotates on success.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session store fails.
    pub fn validate(
        &self,
        session: &SessionId,
        presented: Option<&str>,
    ) -> Result<CsrfVerdict, SessionError> {
        let Some(expected) = self.store.get(session, CSRF_SESSION_KEY)? else {
            return Ok(CsrfVerdict::Rejected(CsrfRejection::NoSessionToken));
        };
        let Some(presented) = presented.filter(|value| !value.is_empty()) else {
            return Ok(CsrfVerdict::Rejected(CsrfRejection::MissingToken));
        };
        if !CsrfToken(expected).matches(presented) {
            return Ok(CsrfVerdict::Rejected(CsrfRejection::Mismatch));
        }
        let next = self.rotate(session)?;
        Ok(CsrfVerdict::Accepted {
            next,
        })
    }

    /// Checks an unsafe request, honoring test-mode bypasses.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the session store fails.
    pub fn check_unsafe(
        &self,
        session: &SessionId,
        presented: Option<&str>,
        bypass_signal: bool,
    ) -> Result<CsrfVerdict, SessionError> {
        if self.settings.bypass_allowed(bypass_signal) {
            return Ok(CsrfVerdict::Bypassed);
        }
        self.validate(session, presented)
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
