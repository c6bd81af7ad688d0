// crates/admission-gate-http/src/audit.rs
// ============================================================================
// Module: Gateway Audit Sinks
// Description: Audit sinks that log through tracing or append JSON lines.
// Purpose: Route gateway audit events to the operator's log pipeline.
// Dependencies: admission-gate-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Two sinks back the [`GatewayAuditSink`] trait at the transport layer:
//! [`TracingAuditSink`] emits each event as a structured `tracing` record,
//! and [`FileAuditSink`] appends one JSON object per line to a file. Both
//! drop events they cannot serialize rather than failing the request.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use admission_gate_core::GatewayAuditEvent;
use admission_gate_core::GatewayAuditSink;
use tracing::info;

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs events through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl GatewayAuditSink for TracingAuditSink {
    fn record(&self, event: &GatewayAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            info!(target: "admission_gate::audit", name = event.event, %payload, "gateway audit");
        }
    }
}

/// Audit sink that appends JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl GatewayAuditSink for FileAuditSink {
    fn record(&self, event: &GatewayAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
