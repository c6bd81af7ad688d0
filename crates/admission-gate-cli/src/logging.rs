// crates/admission-gate-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: Global tracing subscriber setup for the admission-gate binary.
// Purpose: Route gateway logs to stderr as text or JSON lines.
// Dependencies: tracing-subscriber
// ============================================================================

//! ## Overview
//! Log verbosity comes from `ADMISSION_GATE_LOG` using `EnvFilter` directives
//! and defaults to `info`. Logs always go to stderr so command output on
//! stdout stays machine-readable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable holding filter directives.
pub const LOG_ENV: &str = "ADMISSION_GATE_LOG";
/// Filter used when `ADMISSION_GATE_LOG` is unset or invalid.
pub const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

// ============================================================================
// SECTION: Setup
// ============================================================================

/// Builds the filter from `directives`, falling back to the default.
pub fn env_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|value| EnvFilter::try_new(value).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber. A second call leaves the first in place.
pub fn init_logging(format: LogFormat) {
    let filter = env_filter(std::env::var(LOG_ENV).ok().as_deref());
    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Text => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
        LogFormat::Json => {
            registry.with(fmt::layer().json().with_writer(std::io::stderr)).try_init()
        }
    };
}
