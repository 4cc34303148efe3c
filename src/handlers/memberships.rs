//! Membership Handlers
//!
//! Batch reconcile of one user's segments plus the read-only membership
//! listings.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::state::{run_blocking, AppState};
use super::types::{ReconcileRequest, UserSegmentsResponse};
use crate::errors::{AppError, ValidationErrorExt};
use crate::reporter::{self, ApiResponse};
use crate::store::UserId;
use crate::validation;

/// POST /user-segments - Add and remove segments for one user
///
/// Additions run first, then removals, each in request order. The response
/// carries one `{status, message}` per processed item.
#[tracing::instrument(
    skip(state, req),
    fields(
        user_id = req.user_id,
        adds = req.segments.len(),
        removes = req.segments_for_delete.len()
    )
)]
pub async fn reconcile(
    State(state): State<AppState>,
    Json(req): Json<ReconcileRequest>,
) -> Result<(StatusCode, Json<Vec<ApiResponse>>), AppError> {
    validation::validate_batch_len(&req.segments).map_validation_err("segments")?;
    validation::validate_batch_len(&req.segments_for_delete)
        .map_validation_err("segments-for-delete")?;

    let outcomes = run_blocking(&state, move |service| {
        Ok(service.reconciler().reconcile(
            UserId(req.user_id),
            &req.segments,
            &req.segments_for_delete,
        )?)
    })
    .await?;

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    tracing::info!(
        processed = outcomes.len(),
        succeeded,
        "Reconcile finished"
    );

    Ok((
        reporter::status_code(&outcomes),
        Json(reporter::render(&outcomes)),
    ))
}

/// GET /user-segments - Memberships of every user that has any
pub async fn list_all(
    State(state): State<AppState>,
) -> Result<Json<Vec<UserSegmentsResponse>>, AppError> {
    let groups = run_blocking(&state, |service| {
        Ok(service.store().list_all_memberships()?)
    })
    .await?;
    Ok(Json(
        groups.into_iter().map(UserSegmentsResponse::from).collect(),
    ))
}

/// GET /user-segments/{user_id} - Memberships of one user
///
/// A user with no memberships (or no user at all) is a 404.
pub async fn get_user_segments(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<UserSegmentsResponse>, AppError> {
    let user_id = UserId(user_id);
    let segments = run_blocking(&state, move |service| {
        Ok(service.store().list_memberships_by_user(user_id)?)
    })
    .await?;
    if segments.is_empty() {
        return Err(AppError::UserSegmentsNotFound(user_id));
    }

    Ok(Json(UserSegmentsResponse::new(user_id, &segments)))
}
