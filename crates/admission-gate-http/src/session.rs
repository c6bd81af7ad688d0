// crates/admission-gate-http/src/session.rs
// ============================================================================
// Module: HTTP Sessions
// Description: Session cookie handling, identity binding, and flash notices.
// Purpose: Give the pipeline a session id and principal for each request.
// Dependencies: admission-gate-core, axum, base64, rand, serde_json
// ============================================================================

//! ## Overview
//! Sessions are identified by an opaque random id carried in an `HttpOnly`,
//! `SameSite=Lax` cookie; everything else lives server-side in the
//! [`SessionStore`]. Cookie values that are not well-formed ids are ignored,
//! so a client cannot pick an arbitrary key into the store.
//!
//! The authenticated subject is stored under [`SUBJECT_SESSION_KEY`] and
//! surfaced through [`SessionIdentity`]. Flash notices are a JSON array under
//! [`FLASH_SESSION_KEY`]; redirects push them and `GET /gateway/flash`
//! drains them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use admission_gate_core::Principal;
use admission_gate_core::SessionError;
use admission_gate_core::SessionId;
use admission_gate_core::SessionStore;
use admission_gate_core::SubjectId;
use axum::http::HeaderMap;
use axum::http::header::COOKIE;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Session key holding the authenticated subject.
pub const SUBJECT_SESSION_KEY: &str = "_subject";
/// Session key holding pending flash notices.
pub const FLASH_SESSION_KEY: &str = "_flash";
/// Maximum pending flash notices per session; older ones are dropped.
pub const MAX_FLASH_NOTICES: usize = 16;
/// Random bytes in a session id.
const SESSION_ID_BYTES: usize = 32;
/// Encoded length of a session id.
const SESSION_ID_LEN: usize = 43;

// ============================================================================
// SECTION: Session Ids
// ============================================================================

/// Mints a fresh random session id.
#[must_use]
pub fn new_session_id() -> SessionId {
    let mut bytes = [0_u8; SESSION_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    SessionId::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// Returns true when `value` has the shape of a minted session id.
#[must_use]
pub fn is_well_formed_session_id(value: &str) -> bool {
    value.len() == SESSION_ID_LEN
        && value.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_')
}

/// Session for the current request, inserted as a request extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestSession(pub Option<SessionId>);

// ============================================================================
// SECTION: Cookies
// ============================================================================

/// Session cookie settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    /// Cookie name.
    pub name: String,
    /// Add the `Secure` attribute.
    pub secure: bool,
}

impl SessionCookie {
    /// Extracts a well-formed session id from the request cookies.
    #[must_use]
    pub fn read(&self, headers: &HeaderMap) -> Option<SessionId> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == self.name)
            .map(|(_, value)| value.trim())
            .filter(|value| is_well_formed_session_id(value))
            .map(SessionId::new)
    }

    /// Renders the `Set-Cookie` value for a session.
    #[must_use]
    pub fn header_value(&self, session: &SessionId) -> String {
        let secure = if self.secure { "; Secure" } else { "" };
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax{secure}", self.name, session.as_str())
    }
}

// ============================================================================
// SECTION: Identity
// ============================================================================

/// Principal backed by the subject bound to a session.
#[derive(Debug, Clone, Default)]
pub struct SessionIdentity {
    /// Bound subject, if the session is authenticated.
    subject: Option<SubjectId>,
}

impl SessionIdentity {
    /// Loads the identity bound to `session`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] when the store cannot be read.
    pub fn load(
        store: &dyn SessionStore,
        session: Option<&SessionId>,
    ) -> Result<Self, SessionError> {
        let Some(session) = session else {
            return Ok(Self::default());
        };
        let subject = store
            .get(session, SUBJECT_SESSION_KEY)?
            .filter(|subject| !subject.trim().is_empty())
            .map(SubjectId::new);
        Ok(Self {
            subject,
        })
    }
}

impl Principal for SessionIdentity {
    fn subject(&self) -> Option<&SubjectId> {
        self.subject.as_ref()
    }
}

/// Binds an authenticated subject to a session.
///
/// Credential checks happen before this call; the gateway trusts whatever
/// subject is bound here.
///
/// # Errors
///
/// Returns [`SessionError`] when the store write fails.
pub fn bind_subject(
    store: &dyn SessionStore,
    session: &SessionId,
    subject: &SubjectId,
) -> Result<(), SessionError> {
    store.put(session, SUBJECT_SESSION_KEY, subject.as_str().to_string())
}

/// Removes the subject bound to a session.
///
/// # Errors
///
/// Returns [`SessionError`] when the store write fails.
pub fn clear_subject(store: &dyn SessionStore, session: &SessionId) -> Result<(), SessionError> {
    store.take(session, SUBJECT_SESSION_KEY).map(|_| ())
}

// ============================================================================
// SECTION: Flash Notices
// ============================================================================

/// One-shot notice displayed after a redirect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashNotice {
    /// Display category (`warning`, `info`, `danger`).
    pub category: String,
    /// Notice text.
    pub message: String,
}

impl FlashNotice {
    /// Builds a notice.
    #[must_use]
    pub fn new(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            message: message.into(),
        }
    }
}

/// Appends a flash notice to a session.
///
/// # Errors
///
/// Returns [`SessionError`] when the store fails or the notices cannot be
/// encoded.
pub fn push_flash(
    store: &dyn SessionStore,
    session: &SessionId,
    notice: FlashNotice,
) -> Result<(), SessionError> {
    let mut notices = store.get(session, FLASH_SESSION_KEY)?.map(decode_flash).unwrap_or_default();
    notices.push(notice);
    if notices.len() > MAX_FLASH_NOTICES {
        let excess = notices.len() - MAX_FLASH_NOTICES;
        notices.drain(.. excess);
    }
    let encoded = serde_json::to_string(&notices)
        .map_err(|err| SessionError::Rejected(format!("flash encode failed: {err}")))?;
    store.put(session, FLASH_SESSION_KEY, encoded)
}

/// Removes and returns every pending flash notice.
///
/// # Errors
///
/// Returns [`SessionError`] when the store fails.
pub fn drain_flash(
    store: &dyn SessionStore,
    session: &SessionId,
) -> Result<Vec<FlashNotice>, SessionError> {
    Ok(store.take(session, FLASH_SESSION_KEY)?.map(decode_flash).unwrap_or_default())
}

/// Decodes stored notices; malformed data is discarded.
fn decode_flash(raw: String) -> Vec<FlashNotice> {
    serde_json::from_str(&raw).unwrap_or_else(|err| {
        warn!(error = %err, "discarding malformed flash notices");
        Vec::new()
    })
}

// ============================================================================
// SECTION: Tests
// ============================================================================
