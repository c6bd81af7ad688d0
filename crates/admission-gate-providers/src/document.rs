// crates/admission-gate-providers/src/document.rs
// ============================================================================
// Module: Range Documents
// Description: Decoder for published IP range JSON documents.
// Purpose: Turn publisher payloads into normalized networks.
// Dependencies: admission-gate-core, ipnet, serde_json
// ============================================================================

//! ## Overview
//! Publishers wrap their lists differently: a bare JSON array, or an object
//! whose named member holds the array. Entries are CIDR blocks or single
//! addresses; single addresses become `/32` or `/128` networks. Entries that
//! parse as neither are skipped and counted in a warning.

// ============================================================================
// SECTION: Imports
// ============================================================================

use admission_gate_core::RangeSourceError;
use admission_gate_core::parse_range_entry;
use ipnet::IpNet;
use serde_json::Value;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum entries accepted from a single document.
pub const MAX_RANGE_ENTRIES: usize = 100_000;

// ============================================================================
// SECTION: Shapes
// ============================================================================

/// Expected layout of a publisher document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResponseShape {
    /// Top-level JSON array.
    Array,
    /// Object whose named member holds the array.
    Keyed(String),
    /// Accept either; for objects, every array-valued member contributes.
    #[default]
    Auto,
}

impl ResponseShape {
    /// Maps an optional object key onto a shape.
    #[must_use]
    pub fn from_key(key: Option<&str>) -> Self {
        key.map_or(Self::Auto, |key| Self::Keyed(key.to_string()))
    }
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Decodes a publisher document into networks.
///
/// # Errors
///
/// Returns [`RangeSourceError::Parse`] when the document does not match the
/// shape and [`RangeSourceError::Empty`] when it holds no usable entries.
pub fn parse_range_document(
    body: &[u8],
    shape: &ResponseShape,
) -> Result<Vec<IpNet>, RangeSourceError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|err| RangeSourceError::Parse(format!("invalid json: {err}")))?;
    let entries = select_entries(&value, shape)?;
    if entries.len() > MAX_RANGE_ENTRIES {
        return Err(RangeSourceError::Parse(format!(
            "document lists {} entries (max {MAX_RANGE_ENTRIES})",
            entries.len()
        )));
    }
    let mut networks = Vec::with_capacity(entries.len());
    let mut skipped = 0_usize;
    for entry in entries {
        match entry.as_str().and_then(parse_range_entry) {
            Some(network) => networks.push(network),
            None => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, accepted = networks.len(), "skipped unparseable range entries");
    }
    if networks.is_empty() {
        return Err(RangeSourceError::Empty);
    }
    Ok(networks)
}

/// Selects the entry list for a shape.
fn select_entries<'a>(
    value: &'a Value,
    shape: &ResponseShape,
) -> Result<Vec<&'a Value>, RangeSourceError> {
    match (shape, value) {
        (ResponseShape::Array | ResponseShape::Auto, Value::Array(items)) => {
            Ok(items.iter().collect())
        }
        (ResponseShape::Keyed(key), Value::Object(map)) => match map.get(key) {
            Some(Value::Array(items)) => Ok(items.iter().collect()),
            Some(_) => Err(RangeSourceError::Parse(format!("member {key} is not an array"))),
            None => Err(RangeSourceError::Parse(format!("document has no member {key}"))),
        },
        (ResponseShape::Auto, Value::Object(map)) => Ok(map
            .values()
            .filter_map(Value::as_array)
            .flat_map(|items| items.iter())
            .collect()),
        (ResponseShape::Array, _) => {
            Err(RangeSourceError::Parse("expected a top-level array".to_string()))
        }
        (ResponseShape::Keyed(key), _) => {
            Err(RangeSourceError::Parse(format!("expected an object with member {key}")))
        }
        (ResponseShape::Auto, _) => {
            Err(RangeSourceError::Parse("expected an array or object".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
