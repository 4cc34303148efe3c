//! Entity Store and History Log
//!
//! Durable tables for users, segments and the (user, segment) membership
//! relation, plus the append-only membership history. The traits here are the
//! seam the reconciler is built against; [`RocksStore`] is the production
//! implementation backing both.

pub mod rocks;
pub mod types;

pub use rocks::RocksStore;
pub use types::{
    HistoryAction, HistoryEntry, HistoryRecord, ReportPeriod, Segment, SegmentId, User, UserId,
    UserSegments,
};

/// Errors surfaced by the entity store and history log.
///
/// The first group are domain errors that callers recover from locally.
/// Everything else is an infrastructure failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} does not exist")]
    UserNotFound(UserId),

    #[error("segment '{0}' does not exist")]
    SegmentNotFound(String),

    #[error("segment '{0}' already exists")]
    SegmentAlreadyExists(String),

    #[error("user {user_id} is already a member of segment {segment_id}")]
    AlreadyMember {
        user_id: UserId,
        segment_id: SegmentId,
    },

    #[error("user {user_id} is not a member of segment {segment_id}")]
    NotMember {
        user_id: UserId,
        segment_id: SegmentId,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rocksdb::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// True for storage faults that are not explained by a domain condition.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::Serialization(_) | Self::Corrupt(_)
        )
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Users, segments and the membership relation.
///
/// Every mutating call persists immediately. Segment names are matched
/// case-insensitively on the trimmed name.
pub trait EntityStore: Send + Sync {
    fn create_user(&self, name: &str) -> StoreResult<User>;

    /// Deletes the user and every membership row referencing it.
    fn delete_user(&self, id: UserId) -> StoreResult<()>;

    fn find_user(&self, id: UserId) -> StoreResult<Option<User>>;

    fn list_users(&self) -> StoreResult<Vec<User>>;

    fn create_segment(&self, name: &str) -> StoreResult<Segment>;

    /// Deletes the segment and every membership row referencing it.
    /// Returns the deleted segment so callers can report its stored name.
    fn delete_segment(&self, name: &str) -> StoreResult<Segment>;

    fn find_segment(&self, name: &str) -> StoreResult<Option<Segment>>;

    fn list_segments(&self) -> StoreResult<Vec<Segment>>;

    fn is_member(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<bool>;

    /// Fails with [`StoreError::AlreadyMember`] if the pair already exists.
    fn add_membership(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<()>;

    /// Fails with [`StoreError::NotMember`] if there is no row to delete.
    fn remove_membership(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<()>;

    /// Segment names for one user, ordered by segment id.
    fn list_memberships_by_user(&self, user_id: UserId) -> StoreResult<Vec<String>>;

    /// Aggregated segment names for every user holding at least one membership.
    fn list_all_memberships(&self) -> StoreResult<Vec<UserSegments>>;
}

/// Lazily evaluated history query result.
pub type HistoryIter<'a> = Box<dyn Iterator<Item = StoreResult<HistoryRecord>> + 'a>;

/// Append-only audit trail of committed membership changes.
pub trait HistoryLog: Send + Sync {
    fn record(&self, entry: &HistoryEntry) -> StoreResult<()>;

    /// Entries whose timestamp falls in the given UTC month, in insertion order.
    fn query(&self, period: ReportPeriod) -> StoreResult<HistoryIter<'_>>;
}

/// Normalized key used for segment name lookups and uniqueness.
pub fn normalize_segment_name(name: &str) -> String {
    name.trim().to_lowercase()
}
