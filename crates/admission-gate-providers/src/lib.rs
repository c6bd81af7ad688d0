// crates/admission-gate-providers/src/lib.rs
// ============================================================================
// Module: Admission Gate Providers
// Description: Remote IP range sources for the webhook allow-list.
// Purpose: Fetch and decode published payment-processor ranges.
// Dependencies: admission-gate-core, reqwest, serde_json
// ============================================================================

//! ## Overview
//! This crate ships the HTTP-backed [`admission_gate_core::RangeSource`] used
//! by the allow-list refresher, plus the decoder for the JSON documents that
//! publishers serve. Responses are size-limited and decoded fail-closed: a
//! document without a single usable range is an error, never an empty list.
//!
//! Security posture: publisher responses are untrusted.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod document;
pub mod http;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use document::MAX_RANGE_ENTRIES;
pub use document::ResponseShape;
pub use document::parse_range_document;
pub use http::HttpRangeSource;
pub use http::HttpRangeSourceConfig;
