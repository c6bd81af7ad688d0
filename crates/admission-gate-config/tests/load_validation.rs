//! Config load validation tests for admission-gate-config.
// crates/admission-gate-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and section bounds.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;

use admission_gate_config::AdmissionGateConfig;
use admission_gate_config::ConfigError;
use admission_gate_config::PolicyStoreType;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

fn no_env(_: &str) -> Option<String> {
    None
}

fn assert_invalid(result: Result<AdmissionGateConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn parse(content: &str) -> Result<AdmissionGateConfig, ConfigError> {
    AdmissionGateConfig::from_toml_with_env(content, &no_env)
}

fn write_config(content: &[u8]) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content).map_err(|err| err.to_string())?;
    Ok(file)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    let path = Path::new(&long_path);
    assert_invalid(
        AdmissionGateConfig::load_with_env(Some(path), &no_env),
        "config path exceeds max length",
    )
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    let path = Path::new(&long_component);
    assert_invalid(
        AdmissionGateConfig::load_with_env(Some(path), &no_env),
        "config path component too long",
    )
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let file = write_config(&vec![b'#'; 1_048_577])?;
    assert_invalid(
        AdmissionGateConfig::load_with_env(Some(file.path()), &no_env),
        "config file exceeds size limit",
    )
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let file = write_config(&[0xFF, 0xFE, 0xFF])?;
    assert_invalid(
        AdmissionGateConfig::load_with_env(Some(file.path()), &no_env),
        "config file must be utf-8",
    )
}

#[test]
fn load_reports_parse_errors() -> TestResult {
    let file = write_config(b"[server\nbind = ")?;
    match AdmissionGateConfig::load_with_env(Some(file.path()), &no_env) {
        Err(ConfigError::Parse(_)) => Ok(()),
        other => Err(format!("expected parse error, got {}", other.is_ok())),
    }
}

#[test]
fn load_resolves_path_from_lookup() -> TestResult {
    let file = write_config(b"[server]\nbind = \"0.0.0.0:9000\"\n")?;
    let path = file.path().to_string_lossy().to_string();
    let lookup = move |name: &str| (name == "ADMISSION_GATE_CONFIG").then(|| path.clone());
    let config =
        AdmissionGateConfig::load_with_env(None, &lookup).map_err(|err| err.to_string())?;
    if config.server.bind != "0.0.0.0:9000" {
        return Err(format!("unexpected bind {}", config.server.bind));
    }
    Ok(())
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let config = parse("").map_err(|err| err.to_string())?;
    if config.rate_limit.policies.len() != 4 {
        return Err("expected the four built-in policies".to_string());
    }
    if config.ip_allowlist.filter_enabled {
        return Err("filtering must default off".to_string());
    }
    if config.ip_allowlist.refresh_interval_secs != 86_400 {
        return Err("refresh must default to 24h".to_string());
    }
    if config.policy_store.store_type != PolicyStoreType::Memory {
        return Err("policy store must default to memory".to_string());
    }
    Ok(())
}

#[test]
fn csrf_disable_requires_test_mode() -> TestResult {
    assert_invalid(parse("[csrf]\nenabled = false\n"), "requires dev.test_mode")?;
    parse("[csrf]\nenabled = false\n[dev]\ntest_mode = true\n").map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn rejects_bad_bind_address() -> TestResult {
    assert_invalid(parse("[server]\nbind = \"localhost\"\n"), "server.bind")
}

#[test]
fn rejects_landing_path_without_slash() -> TestResult {
    assert_invalid(parse("[server]\nlanding_path = \"home\"\n"), "server.landing_path")
}

#[test]
fn rejects_refresh_interval_out_of_range() -> TestResult {
    assert_invalid(
        parse("[ip_allowlist]\nrefresh_interval_secs = 5\n"),
        "refresh_interval_secs must be between",
    )
}

#[test]
fn rejects_short_override_secret() -> TestResult {
    assert_invalid(parse("[ip_allowlist]\noverride_secret = \"short\"\n"), "override_secret")
}

#[test]
fn rejects_plain_http_source_outside_test_mode() -> TestResult {
    let content = r#"
[ip_allowlist]
sources = [{ name = "local", url = "http://127.0.0.1:9/ips.json", category = "webhooks" }]
"#;
    assert_invalid(parse(content), "must use https")?;
    let dev = format!("{content}\n[dev]\ntest_mode = true\n");
    parse(&dev).map_err(|err| err.to_string())?;
    Ok(())
}

#[test]
fn rejects_filter_without_sources() -> TestResult {
    assert_invalid(
        parse("[ip_allowlist]\nfilter_enabled = true\nsources = []\n"),
        "requires at least one source",
    )
}

#[test]
fn rejects_duplicate_policy_names() -> TestResult {
    let content = r#"
[[rate_limit.policies]]
name = "login"
paths = ["/login"]
limit = 5
window_secs = 60

[[rate_limit.policies]]
name = "login"
paths = ["/signin"]
limit = 5
window_secs = 60
"#;
    assert_invalid(parse(content), "duplicate rate_limit policy")
}

#[test]
fn rejects_zero_limit() -> TestResult {
    let content = r#"
[[rate_limit.policies]]
name = "login"
paths = ["/login"]
limit = 0
window_secs = 60
"#;
    assert_invalid(parse(content), "limit must be between")
}

#[test]
fn sqlite_store_requires_path() -> TestResult {
    assert_invalid(parse("[policy_store]\ntype = \"sqlite\"\n"), "requires path")?;
    assert_invalid(
        parse("[policy_store]\ntype = \"memory\"\npath = \"x.db\"\n"),
        "must not set path",
    )
}

#[test]
fn file_audit_requires_path() -> TestResult {
    assert_invalid(parse("[audit]\nsink = \"file\"\n"), "requires path")?;
    assert_invalid(parse("[audit]\nsink = \"none\"\npath = \"a.log\"\n"), "only valid")
}

#[test]
fn rejects_duplicate_seed_flags() -> TestResult {
    let content = r#"
[[policy_store.seed.flags]]
name = "beta"
enabled = true

[[policy_store.seed.flags]]
name = "beta"
enabled = false
"#;
    assert_invalid(parse(content), "duplicate policy_store.seed flag")
}
