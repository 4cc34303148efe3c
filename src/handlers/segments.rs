//! Segment Management Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::state::{run_blocking, AppState};
use super::types::CreateSegmentRequest;
use crate::errors::{AppError, ValidationErrorExt};
use crate::reporter::ApiResponse;
use crate::store::Segment;
use crate::validation;

/// GET /segments - List all segments
pub async fn list_segments(
    State(state): State<AppState>,
) -> Result<Json<Vec<Segment>>, AppError> {
    let segments = run_blocking(&state, |service| Ok(service.store().list_segments()?)).await?;
    Ok(Json(segments))
}

/// POST /segments - Create a segment (409 if the name is taken)
#[tracing::instrument(skip(state, req))]
pub async fn create_segment(
    State(state): State<AppState>,
    Json(req): Json<CreateSegmentRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AppError> {
    validation::validate_segment_name(&req.name).map_validation_err("name")?;

    let segment = run_blocking(&state, move |service| {
        Ok(service.store().create_segment(req.name.trim())?)
    })
    .await?;
    tracing::info!(segment_id = %segment.id, name = %segment.name, "Segment created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(format!(
            "Segment '{}' was added!",
            segment.name
        ))),
    ))
}

/// DELETE /segments/{segment_name} - Delete a segment and its memberships
#[tracing::instrument(skip(state))]
pub async fn delete_segment(
    State(state): State<AppState>,
    Path(segment_name): Path<String>,
) -> Result<Json<ApiResponse>, AppError> {
    let segment = run_blocking(&state, move |service| {
        Ok(service.store().delete_segment(&segment_name)?)
    })
    .await?;
    tracing::info!(segment_id = %segment.id, name = %segment.name, "Segment deleted");

    Ok(Json(ApiResponse::success(format!(
        "Segment '{}' was deleted!",
        segment.name
    ))))
}
