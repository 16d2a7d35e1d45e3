//! Per-Client Rate Limiting
//!
//! Sliding-window limiter keyed by client address.
//!
//! Features:
//! - Per-client request limits
//! - Sliding window algorithm
//! - Cleanup of idle clients

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::handlers::ApiError;

/// Rate limiter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum requests per window
    pub max_requests: u32,
    /// Time window in seconds
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }
}

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Remaining requests in window
    pub remaining: u32,
    /// Seconds until the oldest request leaves the window
    pub reset_after_secs: u64,
}

/// Sliding-window rate limiter for one route
pub struct RateLimiter {
    config: RateLimitConfig,
    /// client key -> request timestamps inside the window
    clients: RwLock<HashMap<String, Vec<Instant>>>,
    /// Route name for logging
    scope: String,
}

impl RateLimiter {
    pub fn new(scope: &str, config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
            scope: scope.to_string(),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Check and record a request from `key`
    pub async fn check(&self, key: &str) -> RateLimitResult {
        let window = self.window();
        let now = Instant::now();

        let mut clients = self.clients.write().await;
        let requests = clients.entry(key.to_string()).or_default();
        requests.retain(|&t| now.duration_since(t) < window);

        let reset_after_secs = requests
            .first()
            .map(|t| window.saturating_sub(now.duration_since(*t)).as_secs())
            .unwrap_or(self.config.window_secs);

        if requests.len() >= self.config.max_requests as usize {
            warn!(
                "Client {} rate limited on {} ({} requests)",
                key,
                self.scope,
                requests.len()
            );
            return RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_after_secs,
            };
        }

        requests.push(now);
        let remaining = self.config.max_requests.saturating_sub(requests.len() as u32);
        debug!("Client {} allowed on {} ({} remaining)", key, self.scope, remaining);

        RateLimitResult {
            allowed: true,
            remaining,
            reset_after_secs,
        }
    }

    /// Drop clients with no requests inside the window; returns how many
    pub async fn cleanup(&self) -> usize {
        let window = self.window();
        let now = Instant::now();
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|_, requests| {
            requests.retain(|&t| now.duration_since(t) < window);
            !requests.is_empty()
        });
        let removed = before - clients.len();
        if removed > 0 {
            debug!("Swept {} idle clients from {}", removed, self.scope);
        }
        removed
    }

    pub async fn stats(&self) -> RateLimitStats {
        let clients = self.clients.read().await;
        RateLimitStats {
            scope: self.scope.clone(),
            active_clients: clients.len(),
            requests_in_window: clients.values().map(Vec::len).sum(),
            config: self.config.clone(),
        }
    }
}

/// Rate limit statistics
#[derive(Debug, Clone)]
pub struct RateLimitStats {
    pub scope: String,
    pub active_clients: usize,
    pub requests_in_window: usize,
    pub config: RateLimitConfig,
}

/// Client key for a request: peer IP, or `"unknown"` without connection info
pub fn client_key(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Middleware rejecting requests over the limit with 429
pub async fn enforce(State(limiter): State<Arc<RateLimiter>>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    if limiter.check(&key).await.allowed {
        next.run(request).await
    } else {
        ApiError::RateLimited.into_response()
    }
}
