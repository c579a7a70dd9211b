//! Health check endpoints and Prometheus metrics
//!
//! These routes are merged into the main API router and share its state.

use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use anyhow::Result;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

use super::MetricsCollector;

/// Monitoring routes: `/`, `/health`, `/ready`, `/alive`, `/metrics`, `/stats`
pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/alive", get(alive_handler))
        .route("/metrics", get(metrics_handler))
        .route("/stats", get(stats_handler))
}

/// Root endpoint handler - shows service information
async fn root_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "service": state.config().service.name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/register",
            "/queue",
            "/competitions",
            "/matches",
            "/matches/{id}",
            "/matches/{id}/live",
            "/health",
            "/ready",
            "/alive",
            "/metrics",
            "/stats"
        ]
    }))
}

/// Lightweight health check endpoint handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Health check requested");

    let status = HealthCheck::liveness_check(&state).await;
    let code = if status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    (
        code,
        Json(json!({
            "status": status,
            "service": state.config().service.name,
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Readiness check endpoint handler
async fn ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Readiness check requested");

    match HealthCheck::readiness_check(&state).await {
        HealthStatus::Healthy => (StatusCode::OK, "Ready"),
        HealthStatus::Degraded => (StatusCode::OK, "Degraded but ready"),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
    }
}

/// Liveness check endpoint handler
async fn alive_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match HealthCheck::liveness_check(&state).await {
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "Not alive"),
        _ => (StatusCode::OK, "Alive"),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state
        .metrics()
        .service()
        .uptime_seconds
        .set(state.uptime().as_secs() as i64);

    match encode_metrics(state.metrics()) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

/// Detailed service statistics endpoint handler
async fn stats_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match HealthCheck::check(&state).await {
        Ok(health) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                    "uptime_seconds": health.stats.uptime_seconds
                },
                "agents": {
                    "registered": health.stats.agents_registered
                },
                "matches": {
                    "waiting_for_opponent": health.stats.matches_waiting,
                    "ready_check": health.stats.matches_in_ready_check,
                    "active": health.stats.matches_active,
                    "judging": health.stats.matches_judging
                },
                "telemetry": {
                    "open_channels": health.stats.open_channels,
                    "frame_streams": health.stats.frame_streams
                },
                "components": health.checks,
                "timestamp": health.timestamp
            })),
        ),
        Err(e) => {
            error!("Failed to get stats: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "error": "Failed to get service stats",
                    "timestamp": chrono::Utc::now()
                })),
            )
        }
    }
}

/// Encode every registered metric in the Prometheus text format
pub fn encode_metrics(collector: &MetricsCollector) -> Result<String> {
    let metric_families = collector.registry().gather();
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::rating::LocalIdentitySync;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn app() -> (Arc<AppState>, Router) {
        let state = Arc::new(
            AppState::assemble(AppConfig::default(), None, Arc::new(LocalIdentitySync)).unwrap(),
        );
        (state.clone(), health_router().with_state(state))
    }

    async fn status_of(router: &Router, uri: &str) -> StatusCode {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_endpoints_before_start() {
        let (_state, router) = app();

        assert_eq!(status_of(&router, "/").await, StatusCode::OK);
        assert_eq!(status_of(&router, "/health").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(&router, "/ready").await, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_of(&router, "/alive").await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_endpoints_after_start() {
        let (state, router) = app();
        state.start().await;

        assert_eq!(status_of(&router, "/health").await, StatusCode::OK);
        assert_eq!(status_of(&router, "/ready").await, StatusCode::OK);
        assert_eq!(status_of(&router, "/alive").await, StatusCode::OK);
        assert_eq!(status_of(&router, "/stats").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, router) = app();
        state.metrics().record_match_created("wikipedia-speedrun");

        let response = router
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));

        let text = encode_metrics(state.metrics()).unwrap();
        assert!(text.contains("race_arena_matches_created_total"));
    }

    #[tokio::test]
    async fn test_404_handling() {
        let (_state, router) = app();
        assert_eq!(status_of(&router, "/nonexistent").await, StatusCode::NOT_FOUND);
    }
}
