//! Request and response bodies
//!
//! Field names follow the public API (`user-id`, `segments-for-delete`, ...).

use serde::{Deserialize, Serialize};

use crate::store::{UserId, UserSegments};

/// POST /users
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

/// POST /segments
#[derive(Debug, Deserialize)]
pub struct CreateSegmentRequest {
    pub name: String,
}

/// POST /user-segments
#[derive(Debug, Deserialize)]
pub struct ReconcileRequest {
    #[serde(rename = "user-id")]
    pub user_id: u64,
    #[serde(default)]
    pub segments: Vec<String>,
    #[serde(rename = "segments-for-delete", default)]
    pub segments_for_delete: Vec<String>,
}

/// One user's memberships, segment names comma-joined
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSegmentsResponse {
    #[serde(rename = "user-id")]
    pub user_id: UserId,
    #[serde(rename = "segment-names")]
    pub segment_names: String,
}

impl UserSegmentsResponse {
    pub fn new(user_id: UserId, segments: &[String]) -> Self {
        Self {
            user_id,
            segment_names: segments.join(","),
        }
    }
}

impl From<UserSegments> for UserSegmentsResponse {
    fn from(group: UserSegments) -> Self {
        Self::new(group.user_id, &group.segments)
    }
}
