//! User Management Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};

use super::state::{run_blocking, AppState};
use super::types::CreateUserRequest;
use crate::errors::{AppError, ValidationErrorExt};
use crate::reporter::ApiResponse;
use crate::store::{User, UserId};
use crate::validation;

/// GET /users - List all users
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, AppError> {
    let users = run_blocking(&state, |service| Ok(service.store().list_users()?)).await?;
    Ok(Json(users))
}

/// POST /users - Register a user
#[tracing::instrument(skip(state, req))]
pub async fn create_user(
    State(state): State<AppState>,
    Json(req): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<ApiResponse>), AppError> {
    validation::validate_user_name(&req.name).map_validation_err("name")?;

    let user = run_blocking(&state, move |service| {
        Ok(service.store().create_user(req.name.trim())?)
    })
    .await?;
    tracing::info!(user_id = %user.id, "User created");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(format!(
            "User '{}' was added with id '{}'",
            user.name, user.id
        ))),
    ))
}

/// DELETE /users/{id} - Delete a user and all of its memberships
///
/// History rows for the user are kept.
#[tracing::instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    Path(user_id): Path<u64>,
) -> Result<Json<ApiResponse>, AppError> {
    let user_id = UserId(user_id);
    run_blocking(&state, move |service| Ok(service.store().delete_user(user_id)?)).await?;
    tracing::info!(%user_id, "User deleted");

    Ok(Json(ApiResponse::success(format!(
        "User '{user_id}' was deleted"
    ))))
}
