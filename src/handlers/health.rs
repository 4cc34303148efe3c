//! Health and Infrastructure Handlers
//!
//! Liveness and readiness checks plus the Prometheus scrape endpoint.

use axum::{extract::State, http::StatusCode, response::Json};

use super::state::{run_blocking, AppState};
use crate::errors::AppError;
use crate::metrics;

/// Health response for main health endpoint
#[derive(serde::Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// RocksDB key estimates, not exact counts
    pub users_estimate: u64,
    pub segments_estimate: u64,
}

/// Main health check endpoint
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, AppError> {
    let (users_estimate, segments_estimate) =
        run_blocking(&state, |service| Ok(service.estimated_counts()?)).await?;

    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        users_estimate,
        segments_estimate,
    }))
}

/// Liveness check - indicates if process is alive and not deadlocked
pub async fn health_live() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "alive",
            "timestamp": chrono::Utc::now().to_rfc3339()
        })),
    )
}

/// Readiness check - 200 if the store answers a point read, 503 otherwise
pub async fn health_ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match run_blocking(&state, |service| Ok(service.ping()?)).await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": chrono::Utc::now().to_rfc3339()
            })),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "not_ready",
                    "timestamp": chrono::Utc::now().to_rfc3339()
                })),
            )
        }
    }
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint(State(state): State<AppState>) -> Result<String, StatusCode> {
    use prometheus::Encoder;

    // Catalog gauges are refreshed on scrape
    match run_blocking(&state, |service| Ok(service.estimated_counts()?)).await {
        Ok((users, segments)) => {
            metrics::USERS_TOTAL.set(users as i64);
            metrics::SEGMENTS_TOTAL.set(segments as i64);
        }
        Err(e) => tracing::warn!(error = %e, "Failed to refresh catalog gauges"),
    }

    let encoder = prometheus::TextEncoder::new();
    let metric_families = metrics::METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(|e| {
        tracing::error!(error = %e, "Failed to encode metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    String::from_utf8(buffer).map_err(|e| {
        tracing::error!(error = %e, "Metrics output is not UTF-8");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
