// crates/admission-gate-config/src/overrides.rs
// ============================================================================
// Module: Environment Overrides
// Description: Environment-style overrides layered over admission-gate.toml.
// Purpose: Let deployments toggle filtering and tune limits without edits.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Overrides are read through an [`EnvLookup`] so callers decide where
//! values come from. The process environment is the production source;
//! tests pass closures over fixed maps. Recognized variables:
//!
//! | Variable | Effect |
//! |---|---|
//! | `ADMISSION_GATE_IP_FILTER_ENABLED` | `ip_allowlist.filter_enabled` |
//! | `ADMISSION_GATE_STRIPE_OVERRIDE_SECRET` | `ip_allowlist.override_secret` |
//! | `ADMISSION_GATE_IP_REFRESH_SECS` | `ip_allowlist.refresh_interval_secs` |
//! | `ADMISSION_GATE_RATE_<POLICY>` | `<limit>/<window_secs>` for a policy |
//!
//! Malformed values are configuration errors; they are never ignored.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::config::AdmissionGateConfig;
use crate::config::ConfigError;
use crate::config::validate_limit_pair;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Toggles webhook source filtering.
pub const IP_FILTER_ENABLED_VAR: &str = "ADMISSION_GATE_IP_FILTER_ENABLED";
/// Supplies the emergency override secret.
pub const OVERRIDE_SECRET_VAR: &str = "ADMISSION_GATE_STRIPE_OVERRIDE_SECRET";
/// Sets the allow-list refresh interval in seconds.
pub const IP_REFRESH_SECS_VAR: &str = "ADMISSION_GATE_IP_REFRESH_SECS";
/// Prefix for per-policy `<limit>/<window_secs>` overrides.
pub const RATE_VAR_PREFIX: &str = "ADMISSION_GATE_RATE_";

// ============================================================================
// SECTION: Lookup
// ============================================================================

/// Source of environment-style values.
pub trait EnvLookup {
    /// Returns the value for `name`, if set.
    fn get(&self, name: &str) -> Option<String>;
}

impl<F> EnvLookup for F
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<String> {
        self(name)
    }
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Applies recognized overrides to `config`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when an override value is malformed.
pub fn apply_env_overrides(
    config: &mut AdmissionGateConfig,
    lookup: &dyn EnvLookup,
) -> Result<(), ConfigError> {
    if let Some(value) = non_empty(lookup, IP_FILTER_ENABLED_VAR) {
        config.ip_allowlist.filter_enabled = parse_bool(IP_FILTER_ENABLED_VAR, &value)?;
    }
    if let Some(value) = non_empty(lookup, OVERRIDE_SECRET_VAR) {
        config.ip_allowlist.override_secret = Some(value);
    }
    if let Some(value) = non_empty(lookup, IP_REFRESH_SECS_VAR) {
        config.ip_allowlist.refresh_interval_secs = value.trim().parse().map_err(|_| {
            ConfigError::Invalid(format!("{IP_REFRESH_SECS_VAR} must be an integer"))
        })?;
    }
    let names: Vec<String> =
        config.rate_limit.policies.iter().map(|policy| policy.name.clone()).collect();
    for name in names {
        let var = rate_var_name(&name);
        let Some(value) = non_empty(lookup, &var) else {
            continue;
        };
        let (limit, window_secs) = parse_rate_pair(&var, &value)?;
        validate_limit_pair(&name, limit, window_secs)?;
        if let Some(policy) = config.rate_limit.policy_mut(&name) {
            policy.limit = limit;
            policy.window_secs = window_secs;
        }
    }
    Ok(())
}

/// Returns the override variable for a policy name.
#[must_use]
pub fn rate_var_name(policy: &str) -> String {
    let suffix: String = policy
        .chars()
        .map(|ch| if ch == '-' { '_' } else { ch.to_ascii_uppercase() })
        .collect();
    format!("{RATE_VAR_PREFIX}{suffix}")
}

/// Reads a variable, treating blank values as unset.
fn non_empty(lookup: &dyn EnvLookup, name: &str) -> Option<String> {
    lookup.get(name).filter(|value| !value.trim().is_empty())
}

/// Parses a boolean override.
fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{name} must be a boolean"))),
    }
}

/// Parses a `<limit>/<window_secs>` pair.
fn parse_rate_pair(name: &str, value: &str) -> Result<(u32, u64), ConfigError> {
    let invalid = || ConfigError::Invalid(format!("{name} must be <limit>/<window_secs>"));
    let (limit, window) = value.trim().split_once('/').ok_or_else(invalid)?;
    let limit = limit.trim().parse().map_err(|_| invalid())?;
    let window = window.trim().parse().map_err(|_| invalid())?;
    Ok((limit, window))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Tests unwrap parse results for brevity.")]

    use super::*;

    #[test]
    fn rate_var_name_uppercases_and_normalizes() {
        assert_eq!(rate_var_name("password_reset"), "ADMISSION_GATE_RATE_PASSWORD_RESET");
        assert_eq!(rate_var_name("api-keys"), "ADMISSION_GATE_RATE_API_KEYS");
    }

    #[test]
    fn parse_rate_pair_accepts_whitespace() {
        assert_eq!(parse_rate_pair("X", " 7 / 120 ").unwrap(), (7, 120));
        assert!(parse_rate_pair("X", "7").is_err());
        assert!(parse_rate_pair("X", "seven/120").is_err());
    }

    #[test]
    fn parse_bool_is_strict() {
        assert!(parse_bool("X", "On").unwrap());
        assert!(!parse_bool("X", "0").unwrap());
        assert!(parse_bool("X", "maybe").is_err());
    }
}
