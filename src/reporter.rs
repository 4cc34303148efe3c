//! Outcome Reporter
//!
//! Every JSON status body the API returns has the same shape:
//! `{ "status": "success" | "error", "message": "..." }`. Reconcile outcomes,
//! CRUD confirmations and error responses are all rendered through here.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::reconcile::Outcome;

/// Message shown for infrastructure failures. Storage detail stays in the logs.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Uniform status body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    pub message: String,
}

impl ApiResponse {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            message: message.into(),
        }
    }
}

impl From<&Outcome> for ApiResponse {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Added { user_id, segment } => {
                Self::success(format!("Segment '{segment}' for user '{user_id}' was added"))
            }
            Outcome::Removed { user_id, segment } => {
                Self::success(format!("Segment '{segment}' for user '{user_id}' was deleted"))
            }
            Outcome::AlreadyMember { user_id, segment } => Self::error(format!(
                "Segment '{segment}' for user '{user_id}' already exists!"
            )),
            Outcome::NotAMember { user_id, segment } => {
                Self::error(format!("There is no segment '{segment}' for user '{user_id}'"))
            }
            Outcome::SegmentNotFound { segment } => {
                Self::error(format!("Segment '{segment}' does not exist!"))
            }
            Outcome::UserNotFound { user_id } => {
                Self::error(format!("User '{user_id}' does not exist!"))
            }
            Outcome::Failure { user_id, segment } => Self::error(format!(
                "{GENERIC_FAILURE_MESSAGE} Segment '{segment}' for user '{user_id}' was not updated"
            )),
        }
    }
}

/// Render reconcile outcomes in order.
pub fn render(outcomes: &[Outcome]) -> Vec<ApiResponse> {
    outcomes.iter().map(ApiResponse::from).collect()
}

/// HTTP status for a rendered batch: 404 for an unknown user, 500 when a
/// storage failure stopped the batch, 200 otherwise.
pub fn status_code(outcomes: &[Outcome]) -> StatusCode {
    if outcomes
        .iter()
        .any(|o| matches!(o, Outcome::Failure { .. }))
    {
        StatusCode::INTERNAL_SERVER_ERROR
    } else if matches!(outcomes, [Outcome::UserNotFound { .. }]) {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::OK
    }
}
