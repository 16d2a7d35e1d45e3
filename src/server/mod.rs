//! SkillForge HTTP Server
//!
//! Axum-based API with CORS, per-client rate limits, and graceful shutdown.
//!
//! Routes (under `/api`):
//! - POST /generate - SSE stream of pipeline events
//! - POST /scan - Static security scan
//! - GET /templates - Template catalog
//! - GET /health - Liveness

pub mod handlers;
pub mod rate_limit;

pub use handlers::ApiError;
pub use rate_limit::{RateLimitConfig, RateLimiter};

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::pipeline::Orchestrator;

/// State shared across handlers
pub struct AppState {
    pub config: Config,
    pub orchestrator: Orchestrator,
    pub generate_limiter: Arc<RateLimiter>,
    pub scan_limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        let window = config.server.rate_window_secs;
        let generate_limiter = Arc::new(RateLimiter::new(
            "generate",
            RateLimitConfig::new(config.server.generate_rpm, window),
        ));
        let scan_limiter = Arc::new(RateLimiter::new(
            "scan",
            RateLimitConfig::new(config.server.scan_rpm, window),
        ));
        Self {
            config,
            orchestrator,
            generate_limiter,
            scan_limiter,
        }
    }

    /// Drop idle clients from both limiters; returns how many were removed
    pub async fn sweep_rate_limits(&self) -> usize {
        let removed = self.generate_limiter.cleanup().await + self.scan_limiter.cleanup().await;
        let generate = self.generate_limiter.stats().await;
        let scan = self.scan_limiter.stats().await;
        debug!(
            "Rate limit sweep: removed={}, generate_clients={}, scan_clients={}",
            removed, generate.active_clients, scan.active_clients
        );
        removed
    }

    /// Sweep idle rate-limit entries every `every` until the task is aborted
    pub fn spawn_rate_limit_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let state = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                state.sweep_rate_limits().await;
            }
        })
    }
}

/// Build the `/api` router with rate limits applied
pub fn api_router(state: Arc<AppState>) -> Router {
    let generate = Router::new()
        .route("/generate", post(handlers::generate))
        .route_layer(middleware::from_fn_with_state(
            state.generate_limiter.clone(),
            rate_limit::enforce,
        ));

    let scan = Router::new()
        .route("/scan", post(handlers::scan))
        .route_layer(middleware::from_fn_with_state(
            state.scan_limiter.clone(),
            rate_limit::enforce,
        ));

    let api = Router::new()
        .route("/templates", get(handlers::templates))
        .route("/health", get(handlers::health))
        .merge(generate)
        .merge(scan)
        .with_state(state);

    Router::new().nest("/api", api)
}

/// API server
pub struct ApiServer {
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(config: Config, orchestrator: Orchestrator) -> Self {
        Self {
            state: Arc::new(AppState::new(config, orchestrator)),
        }
    }

    /// Full router with CORS and optional request tracing
    pub fn build_router(&self) -> Router {
        let server = &self.state.config.server;

        let origins: Vec<HeaderValue> = server
            .cors_origins
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    warn!("Ignoring invalid CORS origin: {}", o);
                    None
                }
            })
            .collect();

        let cors = CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        let mut router = api_router(self.state.clone()).layer(cors);

        if server.log_requests {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Start the server and run until shutdown signal
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.server.socket_addr();
        let router = self.build_router();

        if !addr.ip().is_loopback() {
            warn!("API bound to non-loopback address {}", addr);
        }

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("SkillForge API available at {}", self.state.config.server.base_url());

        let sweep_every = Duration::from_secs(self.state.config.server.rate_sweep_secs.max(1));
        let sweeper = self.state.spawn_rate_limit_sweeper(sweep_every);

        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        sweeper.abort();
        served?;

        info!("Server shut down gracefully");
        Ok(())
    }
}

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed is
/// logged and never fires.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Ctrl+C handler unavailable: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let received = tokio::select! {
        _ = interrupt => "Ctrl+C",
        _ = terminate => "SIGTERM",
    };
    info!("Received {}, finishing in-flight requests", received);
}
