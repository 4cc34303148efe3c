//! Router Configuration - Centralized route definitions

use axum::{
    routing::{delete, get},
    Router,
};

use super::state::AppState;
use super::{health, memberships, reports, segments, users};

/// Health checks and metrics
pub fn build_health_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        .route("/metrics", get(health::metrics_endpoint))
        .with_state(state)
}

/// Users, segments, memberships and reports
pub fn build_api_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // USERS
        // =================================================================
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/{user_id}", delete(users::delete_user))
        // =================================================================
        // SEGMENTS
        // =================================================================
        .route(
            "/segments",
            get(segments::list_segments).post(segments::create_segment),
        )
        .route("/segments/{segment_name}", delete(segments::delete_segment))
        // =================================================================
        // MEMBERSHIPS
        // =================================================================
        .route(
            "/user-segments",
            get(memberships::list_all).post(memberships::reconcile),
        )
        .route(
            "/user-segments/{user_id}",
            get(memberships::get_user_segments),
        )
        // =================================================================
        // REPORTS
        // =================================================================
        .route("/csv-report", get(reports::csv_report))
        .with_state(state)
}

/// Build the complete router. Middleware layers are applied by the caller.
pub fn build_router(state: AppState) -> Router {
    build_health_routes(state.clone()).merge(build_api_routes(state))
}
