// crates/admission-gate-store-sqlite/src/lib.rs
// ============================================================================
// Module: Admission Gate SQLite Store Library
// Description: Durable policy storage for the admission gateway.
// Purpose: Persist role assignments, policy rules, and feature flags.
// Dependencies: admission-gate-core, rusqlite
// ============================================================================

//! ## Overview
//! `admission-gate-store-sqlite` implements [`admission_gate_core::PolicyStore`]
//! on top of a single `SQLite` database file. Policy edits made through the
//! CLI survive restarts and are visible to a running gateway on its next
//! authorization decision.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqlitePolicyStore;
pub use store::SqlitePolicyStoreConfig;
pub use store::SqlitePolicyStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
