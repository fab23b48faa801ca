//! Diagnostics API server
//!
//! Exposes the in-process logger, monitor and cache state over HTTP.
//! Every route passes through the per-client throttle.

use axum::{
    extract::{Query, State},
    middleware,
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::infrastructure::config::ApiConfig;
use crate::infrastructure::throttle::{throttle_requests, ThrottleGuard};
use crate::middleware::{CacheStats, LogEntry, MetricsSnapshot, Services, SystemHealth};
use crate::Error;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub system: SystemHealth,
}

/// Response to a cache invalidation
#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateDto {
    pub removed: usize,
}

#[derive(Debug, Deserialize)]
pub struct InvalidateQuery {
    pub pattern: Option<String>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
}

/// Build the diagnostics router
pub fn router(services: Services, throttle: Arc<ThrottleGuard>) -> Router {
    let state = AppState { services };

    Router::new()
        .route("/api/health", get(get_health))
        .route("/api/logs", get(get_logs).delete(clear_logs))
        .route("/api/metrics", get(get_metrics))
        .route("/api/cache/stats", get(get_cache_stats))
        .route("/api/cache", axum::routing::delete(invalidate_cache))
        .layer(middleware::from_fn_with_state(throttle, throttle_requests))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the diagnostics API until `shutdown` resolves
pub async fn start_server<F>(
    services: Services,
    throttle: Arc<ThrottleGuard>,
    config: &ApiConfig,
    shutdown: F,
) -> Result<(), Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(services, throttle);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    crate::log_api!(tracing::Level::INFO, "API Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| Error::Server(e.to_string()))?;

    Ok(())
}

async fn get_health(State(state): State<AppState>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        system: state.services.monitor.system(),
    })
}

async fn get_logs(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(state.services.logger.logs())
}

async fn clear_logs(State(state): State<AppState>) -> StatusCode {
    state.services.logger.clear();
    StatusCode::NO_CONTENT
}

async fn get_metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.services.monitor.metrics())
}

async fn get_cache_stats(State(state): State<AppState>) -> Json<CacheStats> {
    Json(state.services.cache.stats())
}

/// Invalidate keys matching `pattern`, or everything when no pattern is given
async fn invalidate_cache(
    State(state): State<AppState>,
    Query(query): Query<InvalidateQuery>,
) -> Json<InvalidateDto> {
    let cache = &state.services.cache;
    let removed = match query.pattern.as_deref() {
        Some(pattern) => cache.invalidate(pattern),
        None => {
            let size = cache.stats().size;
            cache.clear();
            size
        }
    };
    Json(InvalidateDto { removed })
}
