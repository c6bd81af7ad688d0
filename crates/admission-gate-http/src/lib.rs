// crates/admission-gate-http/src/lib.rs
// ============================================================================
// Module: Admission Gate HTTP Library
// Description: axum transport for the admission pipeline.
// Purpose: Expose the server, middleware, sessions, and audit sinks.
// Dependencies: admission-gate-{core, config, providers, store-sqlite}, axum
// ============================================================================

//! ## Overview
//! This crate puts the admission pipeline in front of an axum router. The
//! middleware turns each request into a transport-neutral
//! [`admission_gate_core::GatewayRequest`] and then maps the verdict back onto
//! HTTP. The crate also manages the session cookie and flash notices, serves
//! the observability endpoints, and converts panics into opaque 500
//! responses. [`GatewayServer`] wires everything from an
//! [`admission_gate_config::AdmissionGateConfig`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod session;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::FileAuditSink;
pub use audit::TracingAuditSink;
pub use middleware::GatewayState;
pub use middleware::admission_middleware;
pub use server::GatewayServer;
pub use server::ServerError;
pub use server::http_range_sources;
pub use session::FlashNotice;
pub use session::RequestSession;
pub use session::SessionCookie;
pub use session::SessionIdentity;
pub use session::bind_subject;
pub use session::drain_flash;
pub use session::push_flash;
