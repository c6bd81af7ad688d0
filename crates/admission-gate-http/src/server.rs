// crates/admission-gate-http/src/server.rs
// ============================================================================
// Module: Gateway Server
// Description: Builds the gateway from configuration and serves it over HTTP.
// Purpose: Own component wiring, the refresher lifecycle, and graceful shutdown.
// Dependencies: admission-gate-{core, config, providers, store-sqlite}, axum, tokio
// ============================================================================

//! ## Overview
//! [`GatewayServer::from_config`] validates the configuration and builds
//! every component: the policy store (in-memory or `SQLite`, seeded), the
//! range sources, the audit sink, the limiter, the CSRF guard, the
//! authorization engine, and the pipeline. [`GatewayServer::serve`] starts
//! the allow-list refresher when filtering is enabled, serves until Ctrl-C,
//! and then stops the refresher.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use admission_gate_config::AdmissionGateConfig;
use admission_gate_config::AuditSinkType;
use admission_gate_config::PolicyStoreType;
use admission_gate_core::AuthorizationEngine;
use admission_gate_core::Clock;
use admission_gate_core::CsrfGuard;
use admission_gate_core::GatewayAuditSink;
use admission_gate_core::GatewayPipeline;
use admission_gate_core::InMemoryPolicyStore;
use admission_gate_core::InMemorySessionStore;
use admission_gate_core::IpAllowList;
use admission_gate_core::NoopAuditSink;
use admission_gate_core::PipelineParts;
use admission_gate_core::PolicyStore;
use admission_gate_core::RangeSource;
use admission_gate_core::RateLimiter;
use admission_gate_core::SessionStore;
use admission_gate_core::SystemClock;
use admission_gate_core::spawn_refresher;
use admission_gate_providers::HttpRangeSource;
use admission_gate_providers::HttpRangeSourceConfig;
use admission_gate_providers::ResponseShape;
use admission_gate_store_sqlite::SqlitePolicyStore;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::audit::FileAuditSink;
use crate::audit::TracingAuditSink;
use crate::middleware::GatewayState;
use crate::routes::build_router;
use crate::session::SUBJECT_SESSION_KEY;
use crate::session::SessionCookie;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Interval between sweeps of drained rate-limit windows.
const LIMITER_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// SECTION: Server
// ============================================================================

/// Admission gateway server instance.
pub struct GatewayServer {
    /// Validated configuration.
    config: AdmissionGateConfig,
    /// Shared gateway state.
    state: Arc<GatewayState>,
}

impl GatewayServer {
    /// Builds a server from configuration, fetching ranges over HTTP.
    ///
    /// Range sources use blocking HTTP clients, so call this outside an async
    /// runtime (or inside `spawn_blocking`).
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when validation or initialization fails.
    pub fn from_config(config: AdmissionGateConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let sources = http_range_sources(&config)?;
        Self::with_range_sources(config, sources)
    }

    /// Builds a server with caller-supplied range sources.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when validation or initialization fails.
    pub fn with_range_sources(
        config: AdmissionGateConfig,
        sources: Vec<Arc<dyn RangeSource>>,
    ) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let audit = build_audit_sink(&config)?;
        let store = build_policy_store(&config)?;
        let sessions: Arc<dyn SessionStore> = Arc::new(
            InMemorySessionStore::new(
                Arc::clone(&clock),
                config.session.idle_ttl(),
                config.session.max_sessions,
            )
            .with_retained_keys([SUBJECT_SESSION_KEY]),
        );
        let limiter = Arc::new(RateLimiter::new(Arc::clone(&clock), config.limiter_settings()));
        let allowlist =
            Arc::new(IpAllowList::new(Arc::clone(&clock), sources, Arc::clone(&audit)));
        let pipeline = GatewayPipeline::new(
            PipelineParts {
                clock,
                limiter,
                csrf: CsrfGuard::new(Arc::clone(&sessions), config.csrf_settings()),
                allowlist,
                authz: AuthorizationEngine::new(store, config.authz_settings()),
                audit,
            },
            config.pipeline_settings(),
        );
        let state = Arc::new(GatewayState {
            pipeline: Arc::new(pipeline),
            sessions,
            cookie: SessionCookie {
                name: config.session.cookie_name.clone(),
                secure: config.session.secure_cookie,
            },
            max_body_bytes: config.server.max_body_bytes,
            trust_forwarded_for: config.server.trust_forwarded_for,
        });
        Ok(Self {
            config,
            state,
        })
    }

    /// Returns the shared gateway state.
    #[must_use]
    pub const fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Builds the HTTP router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_router(Arc::clone(&self.state))
    }

    /// Binds the configured address and serves until Ctrl-C.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let addr =
            self.config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|_| ServerError::Transport("http bind failed".to_string()))?;
        self.serve_with_shutdown(listener, shutdown_signal()).await
    }

    /// Serves on `listener` until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when the refresher cannot start or serving fails.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let refresher = if self.config.ip_allowlist.filter_enabled {
            let handle = spawn_refresher(
                Arc::clone(self.state.pipeline.allowlist()),
                self.config.ip_allowlist.refresh_interval(),
            )
            .map_err(|err| ServerError::Init(format!("refresher spawn failed: {err}")))?;
            Some(handle)
        } else {
            warn!("webhook ip filtering is disabled");
            None
        };
        let sweeper = tokio::spawn(sweep_limiter(Arc::clone(&self.state)));
        if let Ok(local) = listener.local_addr() {
            info!(addr = %local, "admission gate listening");
        }
        let app = self.router();
        let result =
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .with_graceful_shutdown(shutdown)
                .await
                .map_err(|_| ServerError::Transport("http server failed".to_string()));
        sweeper.abort();
        // Range sources hold blocking HTTP clients; release them off the runtime.
        let state = self.state;
        let stopped = tokio::task::spawn_blocking(move || {
            if let Some(handle) = refresher {
                handle.stop();
            }
            drop(state);
        })
        .await;
        if stopped.is_err() {
            warn!("ip allow-list refresher did not stop cleanly");
        }
        info!("admission gate stopped");
        result
    }
}

// ============================================================================
// SECTION: Component Builders
// ============================================================================

/// Builds HTTP range sources from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when an HTTP client cannot be built.
pub fn http_range_sources(
    config: &AdmissionGateConfig,
) -> Result<Vec<Arc<dyn RangeSource>>, ServerError> {
    let allowlist = &config.ip_allowlist;
    allowlist
        .sources
        .iter()
        .map(|source| {
            let mut http = HttpRangeSourceConfig::new(&source.name, &source.url, source.category);
            http.shape = ResponseShape::from_key(source.response_key.as_deref());
            http.timeout_ms = allowlist.request_timeout_ms;
            http.max_response_bytes = allowlist.max_response_bytes;
            http.allow_http = config.dev.test_mode;
            let range_source = HttpRangeSource::new(http)
                .map_err(|err| ServerError::Init(format!("range source {}: {err}", source.name)))?;
            Ok(Arc::new(range_source) as Arc<dyn RangeSource>)
        })
        .collect()
}

/// Builds the policy store and applies seed records.
fn build_policy_store(config: &AdmissionGateConfig) -> Result<Arc<dyn PolicyStore>, ServerError> {
    let (snapshot, flags) = config.policy_seed();
    match config.policy_store.store_type {
        PolicyStoreType::Memory => Ok(Arc::new(InMemoryPolicyStore::seeded(snapshot, flags))),
        PolicyStoreType::Sqlite => {
            let sqlite = config.policy_store.sqlite_config().ok_or_else(|| {
                ServerError::Config("sqlite policy_store requires path".to_string())
            })?;
            let store =
                SqlitePolicyStore::open(&sqlite).map_err(|err| ServerError::Init(err.to_string()))?;
            if store.seed(&snapshot, &flags).map_err(|err| ServerError::Init(err.to_string()))? {
                info!("policy store seeded from configuration");
            }
            Ok(Arc::new(store))
        }
    }
}

/// Builds the configured audit sink.
fn build_audit_sink(
    config: &AdmissionGateConfig,
) -> Result<Arc<dyn GatewayAuditSink>, ServerError> {
    match (config.audit.sink, &config.audit.path) {
        (AuditSinkType::Tracing, _) => Ok(Arc::new(TracingAuditSink)),
        (AuditSinkType::None, _) => Ok(Arc::new(NoopAuditSink)),
        (AuditSinkType::File, Some(path)) => {
            let sink = FileAuditSink::new(path)
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
        (AuditSinkType::File, None) => {
            Err(ServerError::Config("file audit sink requires path".to_string()))
        }
    }
}

// ============================================================================
// SECTION: Background Tasks
// ============================================================================

/// Periodically drops drained rate-limit windows.
async fn sweep_limiter(state: Arc<GatewayState>) {
    let mut ticker = tokio::time::interval(LIMITER_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        let removed = state.pipeline.limiter().sweep();
        if removed > 0 {
            debug!(removed, "swept drained rate-limit windows");
        }
    }
}

/// Resolves on Ctrl-C.
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable; serving until the process exits");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Gateway server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization failures.
    #[error("init error: {0}")]
    Init(String),
    /// Transport failures.
    #[error("transport error: {0}")]
    Transport(String),
}
