// crates/admission-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic starting point for operators and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for admission gateway configuration. The example must
//! always load cleanly; a test in this crate enforces that.

/// Returns a canonical example `admission-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[server]
bind = "127.0.0.1:8080"
max_body_bytes = 65536
landing_path = "/"
trust_forwarded_for = false

[session]
cookie_name = "ag_session"
idle_ttl_secs = 28800
max_sessions = 50000
secure_cookie = true

[rate_limit]
max_tracked_keys = 100000
recent_blocks_capacity = 100

[[rate_limit.policies]]
name = "login"
paths = ["/login"]
limit = 5
window_secs = 60

[[rate_limit.policies]]
name = "register"
paths = ["/register"]
limit = 5
window_secs = 60

[[rate_limit.policies]]
name = "password_reset"
paths = ["/password-reset"]
limit = 3
window_secs = 3600

[[rate_limit.policies]]
name = "webhook"
paths = ["/webhook"]
limit = 10
window_secs = 60
audience = "machine"
exempt_user_agent_prefixes = ["Stripe/"]
message = "Rate limit exceeded"

[csrf]
enabled = true
exempt_path_prefixes = ["/webhook"]

[ip_allowlist]
filter_enabled = true
# override_secret = "set-via-ADMISSION_GATE_STRIPE_OVERRIDE_SECRET"
refresh_interval_secs = 86400
webhook_path_prefixes = ["/webhook"]
request_timeout_ms = 10000
max_response_bytes = 1048576

[[ip_allowlist.sources]]
name = "webhooks"
url = "https://stripe.com/files/ips/ips_webhooks.json"
category = "webhooks"
response_key = "WEBHOOKS"

[[ip_allowlist.sources]]
name = "api"
url = "https://stripe.com/files/ips/ips_api.json"
category = "api"
response_key = "API"

[[ip_allowlist.sources]]
name = "armada_gator"
url = "https://stripe.com/files/ips/ips_armada_gator.json"
category = "auxiliary"
response_key = "ARMADA_GATOR"

[authz]
admin_role = "admin"

[[authz.protected_routes]]
path_prefix = "/gateway/stats"
resource = "gateway"

[[authz.protected_routes]]
path_prefix = "/gateway/status"
resource = "gateway"

[[authz.fallback]]
role = "support"
resource = "tickets"
write_actions = ["update"]

[policy_store]
type = "sqlite"
path = "admission-gate.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000

[[policy_store.seed.assignments]]
member = "ops-lead"
role = "admin"

# Role inheritance: holders of "support" also hold "analyst".
[[policy_store.seed.assignments]]
member = "role:support"
role = "analyst"

[[policy_store.seed.rules]]
role = "analyst"
resource = "gateway"
action = "read"

[[policy_store.seed.flags]]
name = "status_page"
enabled = true
public_access = true

[audit]
sink = "tracing"

[dev]
test_mode = false
"#,
    )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
