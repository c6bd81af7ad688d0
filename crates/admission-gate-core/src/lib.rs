// crates/admission-gate-core/src/lib.rs
// ============================================================================
// Module: Admission Gate Core Library
// Description: Public API surface for the Admission Gate core.
// Purpose: Expose gateway types, interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Admission Gate core decides whether an inbound request may reach business
//! handlers. It owns rate limiting, CSRF token lifecycle, role-based
//! authorization, and payment-processor IP allow-listing, and composes them
//! into a single ordered pipeline. Transports (HTTP, CLI) integrate through
//! explicit interfaces rather than embedding framework types in the core.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::*;

pub use interfaces::Anonymous;
pub use interfaces::Clock;
pub use interfaces::PolicyStore;
pub use interfaces::PolicyStoreError;
pub use interfaces::Principal;
pub use interfaces::RangeSource;
pub use interfaces::RangeSourceError;
pub use interfaces::SessionError;
pub use interfaces::SessionStore;
pub use runtime::*;
