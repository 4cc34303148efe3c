//! Row types for the entity store and history log

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque user identity, allocated sequentially from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque segment identity, allocated sequentially from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,
    pub name: String,
}

/// Kind of membership change recorded in the history log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Add,
    Remove,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One committed membership mutation.
///
/// The segment name is captured at write time so the trail stays readable
/// after the segment itself is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: UserId,
    pub segment_id: SegmentId,
    pub segment_name: String,
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(user_id: UserId, segment: &Segment, action: HistoryAction) -> Self {
        Self {
            user_id,
            segment_id: segment.id,
            segment_name: segment.name.clone(),
            action,
            timestamp: Utc::now(),
        }
    }
}

/// Projection of a history entry returned by report queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRecord {
    pub user_id: UserId,
    pub segment_name: String,
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
}

impl From<HistoryEntry> for HistoryRecord {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            user_id: entry.user_id,
            segment_name: entry.segment_name,
            action: entry.action,
            timestamp: entry.timestamp,
        }
    }
}

/// A calendar month in UTC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ReportPeriod {
    pub year: i32,
    pub month: u32,
}

impl ReportPeriod {
    pub fn contains(&self, timestamp: &DateTime<Utc>) -> bool {
        timestamp.year() == self.year && timestamp.month() == self.month
    }
}

/// Aggregated segment names for one user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSegments {
    pub user_id: UserId,
    pub segments: Vec<String>,
}
