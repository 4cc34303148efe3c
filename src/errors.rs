//! HTTP error mapping
//!
//! Every error leaves the API as the uniform `{status, message}` body with a
//! status code chosen per variant. Infrastructure errors are logged in full
//! and shown to clients only as a generic message.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::export::ExportError;
use crate::reporter::{ApiResponse, GENERIC_FAILURE_MESSAGE};
use crate::store::{StoreError, UserId};

/// Application error types with proper categorization
#[derive(Debug)]
pub enum AppError {
    // Validation Errors (400)
    InvalidInput { field: String, reason: String },

    // Not Found Errors (404)
    UserNotFound(String),
    SegmentNotFound(String),
    UserSegmentsNotFound(UserId),

    // Conflict Errors (409)
    SegmentAlreadyExists(String),
    MembershipConflict(String),

    // Internal Errors (500)
    Store(StoreError),
    Internal(anyhow::Error),
}

impl AppError {
    /// Get error code for logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::SegmentNotFound(_) => "SEGMENT_NOT_FOUND",
            Self::UserSegmentsNotFound(_) => "USER_SEGMENTS_NOT_FOUND",
            Self::SegmentAlreadyExists(_) => "SEGMENT_ALREADY_EXISTS",
            Self::MembershipConflict(_) => "MEMBERSHIP_CONFLICT",
            Self::Store(_) => "STORAGE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,

            Self::UserNotFound(_) | Self::SegmentNotFound(_) | Self::UserSegmentsNotFound(_) => {
                StatusCode::NOT_FOUND
            }

            Self::SegmentAlreadyExists(_) | Self::MembershipConflict(_) => StatusCode::CONFLICT,

            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Client-facing message
    pub fn message(&self) -> String {
        match self {
            Self::InvalidInput { field, reason } => {
                format!("Invalid input for field '{field}': {reason}")
            }
            Self::UserNotFound(id) => format!("User '{id}' does not exist!"),
            Self::SegmentNotFound(name) => format!("Segment '{name}' does not exist!"),
            Self::UserSegmentsNotFound(id) => {
                format!("Segments for user '{id}' do not exist!")
            }
            Self::SegmentAlreadyExists(name) => format!("Segment '{name}' already exists!"),
            Self::MembershipConflict(detail) => format!("Membership conflict: {detail}"),
            Self::Store(_) | Self::Internal(_) => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }

    pub fn to_response(&self) -> ApiResponse {
        ApiResponse::error(self.message())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "Storage error: {err}"),
            Self::Internal(err) => write!(f, "Internal error: {err}"),
            _ => write!(f, "{}", self.message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Domain store errors keep their meaning; the rest are infrastructure.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => Self::UserNotFound(id.to_string()),
            StoreError::SegmentNotFound(name) => Self::SegmentNotFound(name),
            StoreError::SegmentAlreadyExists(name) => Self::SegmentAlreadyExists(name),
            other if other.is_infrastructure() => Self::Store(other),
            other => Self::MembershipConflict(other.to_string()),
        }
    }
}

impl From<ExportError> for AppError {
    fn from(err: ExportError) -> Self {
        match err {
            ExportError::Store(store) => store.into(),
            other => Self::Internal(other.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }

        (status, Json(self.to_response())).into_response()
    }
}

/// Helper trait to convert validation errors
pub trait ValidationErrorExt<T> {
    fn map_validation_err(self, field: &str) -> Result<T>;
}

impl<T> ValidationErrorExt<T> for anyhow::Result<T> {
    fn map_validation_err(self, field: &str) -> Result<T> {
        self.map_err(|e| AppError::InvalidInput {
            field: field.to_string(),
            reason: e.to_string(),
        })
    }
}

/// Type alias for Results using AppError
pub type Result<T> = std::result::Result<T, AppError>;
