// crates/admission-gate-core/src/core/methods.rs
// ============================================================================
// Module: Request Method and Path Semantics
// Description: HTTP method classification, path prefixes, and audience labels.
// Purpose: Share one definition of safe methods, method-to-action mapping,
//          and prefix matching.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Safe methods (GET, HEAD, OPTIONS, TRACE) never mutate state, so CSRF
//! validation is skipped for them and authorization maps them to `read`.
//! Method names are compared case-insensitively.
//!
//! Configured path prefixes match whole segments only: `/webhook` covers
//! `/webhook` and `/webhook/stripe` but not `/webhook-settings`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::policy::Action;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Methods that must not change server state.
const SAFE_METHODS: [&str; 4] = ["GET", "HEAD", "OPTIONS", "TRACE"];

// ============================================================================
// SECTION: Types
// ============================================================================

/// Who a rate-limited endpoint serves, which decides the denial shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Interactive browser flows; denials redirect with a flash notice.
    Browser,
    /// Machine callers; denials return 429 JSON.
    Machine,
}

impl Audience {
    /// Returns a stable label for logs and audit events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Machine => "machine",
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns true when the method is a safe (non-mutating) method.
#[must_use]
pub fn is_safe_method(method: &str) -> bool {
    SAFE_METHODS.iter().any(|safe| safe.eq_ignore_ascii_case(method))
}

/// Maps an HTTP method to the policy action it exercises.
///
/// Unknown methods map to a named action carrying the lowercase method so
/// they only match rules written for them explicitly.
#[must_use]
pub fn action_for_method(method: &str) -> Action {
    match method.to_ascii_uppercase().as_str() {
        "GET" | "HEAD" | "OPTIONS" => Action::Read,
        "POST" => Action::Write,
        "PUT" | "PATCH" => Action::Update,
        "DELETE" => Action::Delete,
        other => Action::Named(other.to_ascii_lowercase()),
    }
}

/// Returns true when `path` equals `prefix` or lies beneath it.
///
/// A trailing slash on the prefix is ignored, and an empty or `/` prefix
/// covers every path.
#[must_use]
pub fn path_within_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
