// crates/admission-gate-config/src/lib.rs
// ============================================================================
// Module: Admission Gate Config Library
// Description: Canonical config model, overrides, and validation.
// Purpose: Single source of truth for admission-gate.toml semantics.
// Dependencies: admission-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! `admission-gate-config` defines the configuration model for the admission
//! gateway. Loading is strict and fail-closed: oversized, non-UTF-8, or
//! out-of-range inputs are rejected before any component is built.
//!
//! Security posture: config inputs and environment overrides are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;
pub mod overrides;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
pub use overrides::EnvLookup;
pub use overrides::apply_env_overrides;
