// crates/admission-gate-config/src/config.rs
// ============================================================================
// Module: Admission Gate Configuration
// Description: Configuration loading and validation for the admission gateway.
// Purpose: Provide strict, fail-closed config parsing with safe defaults.
// Dependencies: admission-gate-core, admission-gate-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! This module defines the admission gateway configuration model. Every
//! section has defaults matching the built-in behavior, so an empty file is
//! a valid configuration. Validation runs after environment overrides and
//! rejects out-of-range values instead of clamping them.
//!
//! Security posture: config inputs are untrusted and must be validated.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use admission_gate_core::Audience;
use admission_gate_core::AuthzSettings;
use admission_gate_core::CsrfSettings;
use admission_gate_core::FallbackGrant;
use admission_gate_core::FeatureFlag;
use admission_gate_core::PipelineSettings;
use admission_gate_core::PolicyRule;
use admission_gate_core::PolicySnapshot;
use admission_gate_core::ProtectedRoute;
use admission_gate_core::RangeCategory;
use admission_gate_core::RateLimitPolicy;
use admission_gate_core::RateLimiterSettings;
use admission_gate_core::ResourceName;
use admission_gate_core::RoleAssignment;
use admission_gate_core::RoleName;
use admission_gate_core::WebhookSettings;
use admission_gate_core::runtime::csrf::DEFAULT_CSRF_EXEMPT_PREFIXES;
use admission_gate_core::runtime::pipeline::DEFAULT_LANDING_PATH;
use admission_gate_core::runtime::pipeline::DEFAULT_WEBHOOK_PREFIXES;
use admission_gate_core::runtime::rate_limit::DEFAULT_MAX_TRACKED_KEYS;
use admission_gate_core::runtime::statistics::DEFAULT_RECENT_BLOCKS_CAPACITY;
use admission_gate_store_sqlite::SqlitePolicyStoreConfig;
use admission_gate_store_sqlite::SqliteStoreMode;
use admission_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::overrides::EnvLookup;
use crate::overrides::apply_env_overrides;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "admission-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "ADMISSION_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default bind address.
const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Default request body limit in bytes.
const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024;
/// Maximum request body limit in bytes.
const MAX_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;
/// Default session cookie name.
pub const DEFAULT_SESSION_COOKIE: &str = "ag_session";
/// Default session idle lifetime in seconds.
const DEFAULT_SESSION_IDLE_TTL_SECS: u64 = 8 * 3_600;
/// Minimum session idle lifetime in seconds.
const MIN_SESSION_IDLE_TTL_SECS: u64 = 60;
/// Maximum session idle lifetime in seconds.
const MAX_SESSION_IDLE_TTL_SECS: u64 = 30 * 86_400;
/// Default maximum live sessions.
const DEFAULT_MAX_SESSIONS: usize = 50_000;
/// Maximum configurable live sessions.
const MAX_MAX_SESSIONS: usize = 10_000_000;
/// Maximum number of tracked rate limit keys.
const MAX_RATE_LIMIT_KEYS: usize = 10_000_000;
/// Maximum retained block events.
const MAX_RECENT_BLOCKS: usize = 100_000;
/// Maximum allowed requests per rate limit window.
pub(crate) const MAX_RATE_LIMIT_REQUESTS: u32 = 1_000_000;
/// Maximum rate limit window in seconds.
pub(crate) const MAX_RATE_LIMIT_WINDOW_SECS: u64 = 7 * 86_400;
/// Maximum number of rate limit policies.
const MAX_RATE_LIMIT_POLICIES: usize = 64;
/// Default allow-list refresh interval in seconds.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 86_400;
/// Minimum allow-list refresh interval in seconds.
pub(crate) const MIN_REFRESH_INTERVAL_SECS: u64 = 60;
/// Maximum allow-list refresh interval in seconds.
pub(crate) const MAX_REFRESH_INTERVAL_SECS: u64 = 7 * 86_400;
/// Default range fetch timeout in milliseconds.
const DEFAULT_RANGE_TIMEOUT_MS: u64 = 10_000;
/// Minimum range fetch timeout in milliseconds.
const MIN_RANGE_TIMEOUT_MS: u64 = 100;
/// Maximum range fetch timeout in milliseconds.
const MAX_RANGE_TIMEOUT_MS: u64 = 120_000;
/// Default maximum range response size in bytes.
const DEFAULT_RANGE_MAX_BYTES: usize = 1024 * 1024;
/// Minimum range response size limit in bytes.
const MIN_RANGE_MAX_BYTES: usize = 1024;
/// Maximum range response size limit in bytes.
const MAX_RANGE_MAX_BYTES: usize = 16 * 1024 * 1024;
/// Maximum number of range sources.
const MAX_RANGE_SOURCES: usize = 16;
/// Minimum override secret length.
const MIN_OVERRIDE_SECRET_LENGTH: usize = 16;
/// Default policy store busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Admission gateway configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdmissionGateConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// CSRF configuration.
    #[serde(default)]
    pub csrf: CsrfConfig,
    /// Webhook IP allow-list configuration.
    #[serde(default)]
    pub ip_allowlist: IpAllowListConfig,
    /// Authorization configuration.
    #[serde(default)]
    pub authz: AuthzConfig,
    /// Policy store configuration.
    #[serde(default)]
    pub policy_store: PolicyStoreConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Development-mode switches (explicit opt-in only).
    #[serde(default)]
    pub dev: DevConfig,
}

impl AdmissionGateConfig {
    /// Loads configuration from disk using process environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, &|name: &str| std::env::var(name).ok())
    }

    /// Loads configuration from disk, reading overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env(path: Option<&Path>, lookup: &dyn EnvLookup) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path, lookup)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml_with_env(content, lookup)
    }

    /// Parses configuration text, applies overrides, and validates.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_with_env(content: &str, lookup: &dyn EnvLookup) -> Result<Self, ConfigError> {
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        apply_env_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.session.validate()?;
        self.rate_limit.validate()?;
        self.csrf.validate(&self.dev)?;
        self.ip_allowlist.validate(&self.dev)?;
        self.authz.validate()?;
        self.policy_store.validate()?;
        self.audit.validate()?;
        Ok(())
    }

    /// Returns the rate-limit policies in evaluation order.
    #[must_use]
    pub fn rate_limit_policies(&self) -> Vec<RateLimitPolicy> {
        self.rate_limit.policies.iter().map(RateLimitPolicyConfig::to_policy).collect()
    }

    /// Returns limiter capacity settings.
    #[must_use]
    pub const fn limiter_settings(&self) -> RateLimiterSettings {
        RateLimiterSettings {
            max_tracked_keys: self.rate_limit.max_tracked_keys,
            recent_blocks_capacity: self.rate_limit.recent_blocks_capacity,
        }
    }

    /// Returns CSRF guard settings.
    #[must_use]
    pub fn csrf_settings(&self) -> CsrfSettings {
        CsrfSettings {
            enabled: self.csrf.enabled,
            test_mode: self.dev.test_mode,
            exempt_path_prefixes: self.csrf.exempt_path_prefixes.clone(),
        }
    }

    /// Returns authorization engine settings.
    #[must_use]
    pub fn authz_settings(&self) -> AuthzSettings {
        AuthzSettings {
            admin_role: RoleName::new(self.authz.admin_role.clone()),
            fallback: self.authz.fallback.clone(),
        }
    }

    /// Returns gateway pipeline settings.
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            landing_path: self.server.landing_path.clone(),
            rate_limits: self.rate_limit_policies(),
            webhook: WebhookSettings {
                filter_enabled: self.ip_allowlist.filter_enabled,
                path_prefixes: self.ip_allowlist.webhook_path_prefixes.clone(),
                override_secret: self.ip_allowlist.override_secret.clone(),
            },
            protected_routes: self
                .authz
                .protected_routes
                .iter()
                .map(ProtectedRouteConfig::to_route)
                .collect(),
        }
    }

    /// Returns the seed records for the policy store.
    #[must_use]
    pub fn policy_seed(&self) -> (PolicySnapshot, Vec<FeatureFlag>) {
        let seed = &self.policy_store.seed;
        let snapshot = PolicySnapshot {
            assignments: seed.assignments.clone(),
            rules: seed.rules.clone(),
        };
        (snapshot, seed.flags.clone())
    }
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum buffered request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Redirect target for browser rejections.
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
    /// Derive the client address from the first `X-Forwarded-For` entry.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            landing_path: default_landing_path(),
            trust_forwarded_for: false,
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind.parse().map_err(|_| {
            ConfigError::Invalid(format!("server.bind is not a socket address: {}", self.bind))
        })
    }

    /// Validates server configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.bind_addr()?;
        if self.max_body_bytes == 0 || self.max_body_bytes > MAX_MAX_BODY_BYTES {
            return Err(ConfigError::Invalid(format!(
                "server.max_body_bytes must be between 1 and {MAX_MAX_BODY_BYTES}"
            )));
        }
        validate_route_path("server.landing_path", &self.landing_path)
    }
}

// ============================================================================
// SECTION: Sessions
// ============================================================================

/// Session cookie and store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Idle lifetime in seconds.
    #[serde(default = "default_session_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    /// Maximum live sessions before the least recently used is evicted.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    /// Mark the cookie `Secure`.
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            idle_ttl_secs: DEFAULT_SESSION_IDLE_TTL_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            secure_cookie: false,
        }
    }
}

impl SessionConfig {
    /// Returns the idle lifetime.
    #[must_use]
    pub const fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    /// Validates session configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.is_empty()
            || !self
                .cookie_name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(ConfigError::Invalid(
                "session.cookie_name must be non-empty and use [A-Za-z0-9_-]".to_string(),
            ));
        }
        if !(MIN_SESSION_IDLE_TTL_SECS ..= MAX_SESSION_IDLE_TTL_SECS).contains(&self.idle_ttl_secs)
        {
            return Err(ConfigError::Invalid(format!(
                "session.idle_ttl_secs must be between {MIN_SESSION_IDLE_TTL_SECS} and \
                 {MAX_SESSION_IDLE_TTL_SECS}"
            )));
        }
        if self.max_sessions == 0 || self.max_sessions > MAX_MAX_SESSIONS {
            return Err(ConfigError::Invalid(format!(
                "session.max_sessions must be between 1 and {MAX_MAX_SESSIONS}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Rate Limiting
// ============================================================================

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tracked `(client, path)` windows.
    #[serde(default = "default_max_tracked_keys")]
    pub max_tracked_keys: usize,
    /// Number of block events retained for statistics.
    #[serde(default = "default_recent_blocks_capacity")]
    pub recent_blocks_capacity: usize,
    /// Policies evaluated in order for each request.
    #[serde(default = "default_rate_limit_policies")]
    pub policies: Vec<RateLimitPolicyConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_tracked_keys: DEFAULT_MAX_TRACKED_KEYS,
            recent_blocks_capacity: DEFAULT_RECENT_BLOCKS_CAPACITY,
            policies: default_rate_limit_policies(),
        }
    }
}

impl RateLimitConfig {
    /// Returns a mutable policy by name.
    pub(crate) fn policy_mut(&mut self, name: &str) -> Option<&mut RateLimitPolicyConfig> {
        self.policies.iter_mut().find(|policy| policy.name == name)
    }

    /// Validates rate limit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tracked_keys == 0 || self.max_tracked_keys > MAX_RATE_LIMIT_KEYS {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.max_tracked_keys must be between 1 and {MAX_RATE_LIMIT_KEYS}"
            )));
        }
        if self.recent_blocks_capacity == 0 || self.recent_blocks_capacity > MAX_RECENT_BLOCKS {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.recent_blocks_capacity must be between 1 and {MAX_RECENT_BLOCKS}"
            )));
        }
        if self.policies.len() > MAX_RATE_LIMIT_POLICIES {
            return Err(ConfigError::Invalid(format!(
                "rate_limit.policies exceeds max of {MAX_RATE_LIMIT_POLICIES}"
            )));
        }
        let mut names = BTreeSet::new();
        for policy in &self.policies {
            policy.validate()?;
            if !names.insert(policy.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate rate_limit policy: {}",
                    policy.name
                )));
            }
        }
        Ok(())
    }
}

/// One rate-limit policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RateLimitPolicyConfig {
    /// Policy name, also used for environment overrides.
    pub name: String,
    /// Exact request paths covered.
    pub paths: Vec<String>,
    /// HTTP methods covered.
    #[serde(default = "default_policy_methods")]
    pub methods: Vec<String>,
    /// Requests admitted per window.
    pub limit: u32,
    /// Window length in seconds.
    pub window_secs: u64,
    /// Rejection shape.
    #[serde(default = "default_policy_audience")]
    pub audience: Audience,
    /// User-agent prefixes exempt from the policy.
    #[serde(default)]
    pub exempt_user_agent_prefixes: Vec<String>,
    /// Optional rejection message override.
    #[serde(default)]
    pub message: Option<String>,
}

impl RateLimitPolicyConfig {
    /// Converts the config entry into a runtime policy.
    #[must_use]
    pub fn to_policy(&self) -> RateLimitPolicy {
        let message = self.message.clone().unwrap_or_else(|| match self.audience {
            Audience::Browser => "Too many attempts. Please try again later.".to_string(),
            Audience::Machine => "Rate limit exceeded".to_string(),
        });
        RateLimitPolicy {
            name: self.name.clone(),
            paths: self.paths.clone(),
            methods: self.methods.iter().map(|method| method.to_ascii_uppercase()).collect(),
            limit: self.limit,
            window: Duration::from_secs(self.window_secs),
            audience: self.audience,
            exempt_user_agent_prefixes: self.exempt_user_agent_prefixes.clone(),
            message,
        }
    }

    /// Validates one policy.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty()
            || !self.name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
        {
            return Err(ConfigError::Invalid(format!(
                "rate_limit policy name must be non-empty and use [A-Za-z0-9_-]: {}",
                self.name
            )));
        }
        if self.paths.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "rate_limit policy {} requires at least one path",
                self.name
            )));
        }
        for path in &self.paths {
            validate_route_path(&format!("rate_limit policy {} path", self.name), path)?;
        }
        if self.methods.is_empty() || self.methods.iter().any(|method| method.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "rate_limit policy {} requires non-empty methods",
                self.name
            )));
        }
        validate_limit_pair(&self.name, self.limit, self.window_secs)
    }
}

impl From<&RateLimitPolicy> for RateLimitPolicyConfig {
    fn from(policy: &RateLimitPolicy) -> Self {
        Self {
            name: policy.name.clone(),
            paths: policy.paths.clone(),
            methods: policy.methods.clone(),
            limit: policy.limit,
            window_secs: policy.window.as_secs(),
            audience: policy.audience,
            exempt_user_agent_prefixes: policy.exempt_user_agent_prefixes.clone(),
            message: Some(policy.message.clone()),
        }
    }
}

/// Validates a limit/window pair.
pub(crate) fn validate_limit_pair(
    name: &str,
    limit: u32,
    window_secs: u64,
) -> Result<(), ConfigError> {
    if limit == 0 || limit > MAX_RATE_LIMIT_REQUESTS {
        return Err(ConfigError::Invalid(format!(
            "rate_limit policy {name} limit must be between 1 and {MAX_RATE_LIMIT_REQUESTS}"
        )));
    }
    if window_secs == 0 || window_secs > MAX_RATE_LIMIT_WINDOW_SECS {
        return Err(ConfigError::Invalid(format!(
            "rate_limit policy {name} window_secs must be between 1 and \
             {MAX_RATE_LIMIT_WINDOW_SECS}"
        )));
    }
    Ok(())
}

// ============================================================================
// SECTION: CSRF
// ============================================================================

/// CSRF configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfConfig {
    /// Enforce CSRF tokens on unsafe methods.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path prefixes exempt from CSRF checks.
    #[serde(default = "default_csrf_exempt_prefixes")]
    pub exempt_path_prefixes: Vec<String>,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exempt_path_prefixes: default_csrf_exempt_prefixes(),
        }
    }
}

impl CsrfConfig {
    /// Validates CSRF configuration.
    fn validate(&self, dev: &DevConfig) -> Result<(), ConfigError> {
        if !self.enabled && !dev.test_mode {
            return Err(ConfigError::Invalid(
                "csrf.enabled = false requires dev.test_mode = true".to_string(),
            ));
        }
        for prefix in &self.exempt_path_prefixes {
            validate_route_path("csrf.exempt_path_prefixes", prefix)?;
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: IP Allow-List
// ============================================================================

/// Webhook source allow-list configuration.
#[derive(Clone, Deserialize)]
pub struct IpAllowListConfig {
    /// Enforce the allow-list on webhook paths.
    #[serde(default)]
    pub filter_enabled: bool,
    /// Pre-shared secret accepted in `X-Stripe-Override`.
    #[serde(default)]
    pub override_secret: Option<String>,
    /// Seconds between background refreshes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Path prefixes treated as webhooks.
    #[serde(default = "default_webhook_prefixes")]
    pub webhook_path_prefixes: Vec<String>,
    /// Per-source fetch timeout in milliseconds.
    #[serde(default = "default_range_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Maximum accepted response body per source.
    #[serde(default = "default_range_max_bytes")]
    pub max_response_bytes: usize,
    /// Published range sources.
    #[serde(default = "default_range_sources")]
    pub sources: Vec<RangeSourceConfig>,
}

impl std::fmt::Debug for IpAllowListConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpAllowListConfig")
            .field("filter_enabled", &self.filter_enabled)
            .field("override_secret", &self.override_secret.as_ref().map(|_| "<redacted>"))
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .field("webhook_path_prefixes", &self.webhook_path_prefixes)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("max_response_bytes", &self.max_response_bytes)
            .field("sources", &self.sources)
            .finish()
    }
}

impl Default for IpAllowListConfig {
    fn default() -> Self {
        Self {
            filter_enabled: false,
            override_secret: None,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            webhook_path_prefixes: default_webhook_prefixes(),
            request_timeout_ms: DEFAULT_RANGE_TIMEOUT_MS,
            max_response_bytes: DEFAULT_RANGE_MAX_BYTES,
            sources: default_range_sources(),
        }
    }
}

impl IpAllowListConfig {
    /// Returns the refresh interval.
    #[must_use]
    pub const fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Returns the per-source fetch timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Validates allow-list configuration.
    fn validate(&self, dev: &DevConfig) -> Result<(), ConfigError> {
        if !(MIN_REFRESH_INTERVAL_SECS ..= MAX_REFRESH_INTERVAL_SECS)
            .contains(&self.refresh_interval_secs)
        {
            return Err(ConfigError::Invalid(format!(
                "ip_allowlist.refresh_interval_secs must be between {MIN_REFRESH_INTERVAL_SECS} \
                 and {MAX_REFRESH_INTERVAL_SECS}"
            )));
        }
        if !(MIN_RANGE_TIMEOUT_MS ..= MAX_RANGE_TIMEOUT_MS).contains(&self.request_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "ip_allowlist.request_timeout_ms must be between {MIN_RANGE_TIMEOUT_MS} and \
                 {MAX_RANGE_TIMEOUT_MS}"
            )));
        }
        if !(MIN_RANGE_MAX_BYTES ..= MAX_RANGE_MAX_BYTES).contains(&self.max_response_bytes) {
            return Err(ConfigError::Invalid(format!(
                "ip_allowlist.max_response_bytes must be between {MIN_RANGE_MAX_BYTES} and \
                 {MAX_RANGE_MAX_BYTES}"
            )));
        }
        if let Some(secret) = &self.override_secret
            && secret.len() < MIN_OVERRIDE_SECRET_LENGTH
        {
            return Err(ConfigError::Invalid(format!(
                "ip_allowlist.override_secret must be at least {MIN_OVERRIDE_SECRET_LENGTH} \
                 characters"
            )));
        }
        if self.webhook_path_prefixes.is_empty() {
            return Err(ConfigError::Invalid(
                "ip_allowlist.webhook_path_prefixes must not be empty".to_string(),
            ));
        }
        for prefix in &self.webhook_path_prefixes {
            validate_route_path("ip_allowlist.webhook_path_prefixes", prefix)?;
        }
        if self.filter_enabled && self.sources.is_empty() {
            return Err(ConfigError::Invalid(
                "ip_allowlist.filter_enabled requires at least one source".to_string(),
            ));
        }
        if self.sources.len() > MAX_RANGE_SOURCES {
            return Err(ConfigError::Invalid(format!(
                "ip_allowlist.sources exceeds max of {MAX_RANGE_SOURCES}"
            )));
        }
        let mut names = BTreeSet::new();
        for source in &self.sources {
            source.validate(dev)?;
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate ip_allowlist source: {}",
                    source.name
                )));
            }
        }
        Ok(())
    }
}

/// One published range source.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RangeSourceConfig {
    /// Source name used in status reports.
    pub name: String,
    /// Publisher URL.
    pub url: String,
    /// Category of the published ranges.
    pub category: RangeCategory,
    /// JSON object key holding the range array; absent means auto-detect.
    #[serde(default)]
    pub response_key: Option<String>,
}

impl RangeSourceConfig {
    /// Validates one source.
    fn validate(&self, dev: &DevConfig) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "ip_allowlist source name must be non-empty".to_string(),
            ));
        }
        let url = Url::parse(&self.url).map_err(|err| {
            ConfigError::Invalid(format!("ip_allowlist source {} url invalid: {err}", self.name))
        })?;
        match url.scheme() {
            "https" => {}
            "http" if dev.test_mode => {}
            scheme => {
                return Err(ConfigError::Invalid(format!(
                    "ip_allowlist source {} must use https (got {scheme})",
                    self.name
                )));
            }
        }
        if let Some(key) = &self.response_key
            && key.trim().is_empty()
        {
            return Err(ConfigError::Invalid(format!(
                "ip_allowlist source {} response_key must be non-empty",
                self.name
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Authorization
// ============================================================================

/// Authorization configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthzConfig {
    /// Role treated as universal admin.
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    /// Routes whose requests require authorization.
    #[serde(default = "default_protected_routes")]
    pub protected_routes: Vec<ProtectedRouteConfig>,
    /// Declared fallback grants for flexible routes.
    #[serde(default)]
    pub fallback: Vec<FallbackGrant>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            admin_role: default_admin_role(),
            protected_routes: default_protected_routes(),
            fallback: Vec::new(),
        }
    }
}

impl AuthzConfig {
    /// Validates authorization configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.admin_role.trim().is_empty() {
            return Err(ConfigError::Invalid("authz.admin_role must be non-empty".to_string()));
        }
        for route in &self.protected_routes {
            validate_route_path("authz.protected_routes path_prefix", &route.path_prefix)?;
            if route.resource.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "authz protected route {} requires a resource",
                    route.path_prefix
                )));
            }
        }
        for grant in &self.fallback {
            if grant.role.as_str().is_empty() || grant.resource.as_str().is_empty() {
                return Err(ConfigError::Invalid(
                    "authz.fallback entries require role and resource".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Route requiring authorization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProtectedRouteConfig {
    /// Path prefix matched on segment boundaries.
    pub path_prefix: String,
    /// Resource checked for requests under the prefix.
    pub resource: String,
    /// Use the flexible fallback chain.
    #[serde(default)]
    pub flexible: bool,
}

impl ProtectedRouteConfig {
    /// Converts into a runtime route.
    #[must_use]
    pub fn to_route(&self) -> ProtectedRoute {
        ProtectedRoute {
            path_prefix: self.path_prefix.clone(),
            resource: ResourceName::new(self.resource.clone()),
            flexible: self.flexible,
        }
    }
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// Policy store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyStoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: PolicyStoreType,
    /// `SQLite` database path.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `SQLite` busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Records written into the store at startup.
    #[serde(default)]
    pub seed: PolicySeedConfig,
}

impl Default for PolicyStoreConfig {
    fn default() -> Self {
        Self {
            store_type: PolicyStoreType::default(),
            path: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            seed: PolicySeedConfig::default(),
        }
    }
}

impl PolicyStoreConfig {
    /// Returns the `SQLite` store config when the backend is `sqlite`.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqlitePolicyStoreConfig> {
        match (self.store_type, &self.path) {
            (PolicyStoreType::Sqlite, Some(path)) => Some(SqlitePolicyStoreConfig {
                path: path.clone(),
                busy_timeout_ms: self.busy_timeout_ms,
                journal_mode: self.journal_mode,
                sync_mode: self.sync_mode,
            }),
            _ => None,
        }
    }

    /// Validates policy store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            PolicyStoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory policy_store must not set path".to_string(),
                    ));
                }
            }
            PolicyStoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite policy_store requires path".to_string())
                })?;
                validate_path_string("policy_store.path", &path.to_string_lossy())?;
            }
        }
        let mut flag_names = BTreeSet::new();
        for flag in &self.seed.flags {
            if flag.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "policy_store.seed flag name must be non-empty".to_string(),
                ));
            }
            if !flag_names.insert(flag.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate policy_store.seed flag: {}",
                    flag.name
                )));
            }
        }
        Ok(())
    }
}

/// Policy store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyStoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use the `SQLite`-backed durable store.
    Sqlite,
}

/// Records seeded into the policy store at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicySeedConfig {
    /// Role assignments.
    #[serde(default)]
    pub assignments: Vec<RoleAssignment>,
    /// Policy rules.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
    /// Feature flags.
    #[serde(default)]
    pub flags: Vec<FeatureFlag>,
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit sink configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Sink type.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// JSON-lines file path for the `file` sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditConfig {
    /// Validates audit configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, &self.path) {
            (AuditSinkType::File, None) => {
                Err(ConfigError::Invalid("file audit sink requires path".to_string()))
            }
            (AuditSinkType::File, Some(path)) => {
                validate_path_string("audit.path", &path.to_string_lossy())
            }
            (_, Some(_)) => {
                Err(ConfigError::Invalid("audit.path is only valid for the file sink".to_string()))
            }
            (_, None) => Ok(()),
        }
    }
}

/// Audit sink type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// Emit audit events through `tracing`.
    #[default]
    Tracing,
    /// Append JSON lines to a file.
    File,
    /// Discard audit events.
    None,
}

// ============================================================================
// SECTION: Dev Mode
// ============================================================================

/// Development-mode switches.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DevConfig {
    /// Enables the CSRF test bypass and plain-http range sources.
    #[serde(default)]
    pub test_mode: bool,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>, lookup: &dyn EnvLookup) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Some(env_path) = lookup.get(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an HTTP route path or prefix.
fn validate_route_path(field: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with('/') {
        return Err(ConfigError::Invalid(format!("{field} must start with '/': {value}")));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(ConfigError::Invalid(format!("{field} must not contain whitespace: {value}")));
    }
    Ok(())
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default request body limit.
const fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

/// Default landing path.
fn default_landing_path() -> String {
    DEFAULT_LANDING_PATH.to_string()
}

/// Default session cookie name.
fn default_cookie_name() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

/// Default session idle lifetime.
const fn default_session_idle_ttl_secs() -> u64 {
    DEFAULT_SESSION_IDLE_TTL_SECS
}

/// Default session capacity.
const fn default_max_sessions() -> usize {
    DEFAULT_MAX_SESSIONS
}

/// Default tracked key capacity.
const fn default_max_tracked_keys() -> usize {
    DEFAULT_MAX_TRACKED_KEYS
}

/// Default block event capacity.
const fn default_recent_blocks_capacity() -> usize {
    DEFAULT_RECENT_BLOCKS_CAPACITY
}

/// Default policy set.
fn default_rate_limit_policies() -> Vec<RateLimitPolicyConfig> {
    RateLimitPolicy::defaults().iter().map(RateLimitPolicyConfig::from).collect()
}

/// Default methods for a policy.
fn default_policy_methods() -> Vec<String> {
    vec!["POST".to_string()]
}

/// Default policy audience.
const fn default_policy_audience() -> Audience {
    Audience::Browser
}

/// Serde helper for `true` defaults.
const fn default_true() -> bool {
    true
}

/// Default CSRF exempt prefixes.
fn default_csrf_exempt_prefixes() -> Vec<String> {
    DEFAULT_CSRF_EXEMPT_PREFIXES.iter().map(ToString::to_string).collect()
}

/// Default refresh interval.
const fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

/// Default webhook path prefixes.
fn default_webhook_prefixes() -> Vec<String> {
    DEFAULT_WEBHOOK_PREFIXES.iter().map(ToString::to_string).collect()
}

/// Default range fetch timeout.
const fn default_range_timeout_ms() -> u64 {
    DEFAULT_RANGE_TIMEOUT_MS
}

/// Default range response limit.
const fn default_range_max_bytes() -> usize {
    DEFAULT_RANGE_MAX_BYTES
}

/// Default published range sources.
fn default_range_sources() -> Vec<RangeSourceConfig> {
    vec![
        RangeSourceConfig {
            name: "webhooks".to_string(),
            url: "https://stripe.com/files/ips/ips_webhooks.json".to_string(),
            category: RangeCategory::Webhooks,
            response_key: Some("WEBHOOKS".to_string()),
        },
        RangeSourceConfig {
            name: "api".to_string(),
            url: "https://stripe.com/files/ips/ips_api.json".to_string(),
            category: RangeCategory::Api,
            response_key: Some("API".to_string()),
        },
        RangeSourceConfig {
            name: "armada_gator".to_string(),
            url: "https://stripe.com/files/ips/ips_armada_gator.json".to_string(),
            category: RangeCategory::Auxiliary,
            response_key: Some("ARMADA_GATOR".to_string()),
        },
    ]
}

/// Default admin role.
fn default_admin_role() -> String {
    admission_gate_core::DEFAULT_ADMIN_ROLE.to_string()
}

/// Default protected routes: the gateway's own observability endpoints.
fn default_protected_routes() -> Vec<ProtectedRouteConfig> {
    ["/gateway/stats", "/gateway/status"]
        .into_iter()
        .map(|prefix| ProtectedRouteConfig {
            path_prefix: prefix.to_string(),
            resource: "gateway".to_string(),
            flexible: false,
        })
        .collect()
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Tests
// ============================================================================
