//! RocksDB-backed entity store and history log
//!
//! Layout (one shared DB, one column family per table):
//! - `users`: `{user_id:020}` -> User (JSON)
//! - `segments`: `{segment_id:020}` -> Segment (JSON)
//! - `segment_names`: normalized name -> segment id
//! - `memberships`: `{user_id:020}:{segment_id:020}` -> marker
//! - `memberships_by_segment`: `{segment_id:020}:{user_id:020}` -> marker
//! - `history`: `{sequence:020}` -> HistoryEntry (JSON)
//! - `meta`: id and sequence counters
//!
//! Ids are zero-padded so lexicographic key order equals numeric order.
//! Check-then-write sections run under a mutex so the (user, segment)
//! uniqueness constraint and name uniqueness hold under concurrent requests.
//! Lock-free reads that follow one key to another go through a snapshot, so
//! a concurrent cascade never leaves them holding a dangling reference.

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, FlushOptions, IteratorMode, Options,
    Snapshot, WriteBatch, DB,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{
    normalize_segment_name, EntityStore, HistoryEntry, HistoryIter, HistoryLog, HistoryRecord,
    ReportPeriod, Segment, SegmentId, StoreError, StoreResult, User, UserId, UserSegments,
};

const CF_USERS: &str = "users";
const CF_SEGMENTS: &str = "segments";
const CF_SEGMENT_NAMES: &str = "segment_names";
const CF_MEMBERSHIPS: &str = "memberships";
const CF_MEMBERSHIPS_BY_SEGMENT: &str = "memberships_by_segment";
const CF_HISTORY: &str = "history";
const CF_META: &str = "meta";

const ALL_CFS: [&str; 7] = [
    CF_USERS,
    CF_SEGMENTS,
    CF_SEGMENT_NAMES,
    CF_MEMBERSHIPS,
    CF_MEMBERSHIPS_BY_SEGMENT,
    CF_HISTORY,
    CF_META,
];

const META_NEXT_USER_ID: &[u8] = b"next_user_id";
const META_NEXT_SEGMENT_ID: &[u8] = b"next_segment_id";
const META_NEXT_HISTORY_SEQ: &[u8] = b"next_history_seq";

const MEMBER_MARKER: &[u8] = b"1";

fn id_key(id: u64) -> String {
    format!("{id:020}")
}

fn pair_key(left: u64, right: u64) -> String {
    format!("{left:020}:{right:020}")
}

fn parse_pair_key(key: &[u8]) -> StoreResult<(u64, u64)> {
    let key_str = std::str::from_utf8(key)
        .map_err(|_| StoreError::Corrupt("non-UTF8 membership key".to_string()))?;
    let (left, right) = key_str
        .split_once(':')
        .ok_or_else(|| StoreError::Corrupt(format!("malformed membership key '{key_str}'")))?;
    let left = left
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("malformed membership key '{key_str}'")))?;
    let right = right
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("malformed membership key '{key_str}'")))?;
    Ok((left, right))
}

fn parse_counter(value: Option<Vec<u8>>) -> anyhow::Result<u64> {
    match value {
        Some(bytes) => {
            let text = std::str::from_utf8(&bytes).context("Non-UTF8 counter value")?;
            text.parse()
                .with_context(|| format!("Invalid counter value '{text}'"))
        }
        None => Ok(1),
    }
}

/// Next ids to allocate; persisted in `meta` alongside each insert.
struct Counters {
    next_user_id: u64,
    next_segment_id: u64,
}

/// Position of the history log tail.
struct HistoryCursor {
    next_seq: u64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Entity store and history log sharing one RocksDB instance
pub struct RocksStore {
    db: Arc<DB>,
    counters: Mutex<Counters>,
    history: Mutex<HistoryCursor>,
}

impl RocksStore {
    /// Open (or create) the store under `path`.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create storage directory {path:?}"))?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);

        let descriptors = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, opts.clone()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)
            .with_context(|| format!("Failed to open RocksDB at {path:?}"))?;
        let db = Arc::new(db);

        let meta = db
            .cf_handle(CF_META)
            .context("meta column family missing after open")?;
        let next_user_id = parse_counter(db.get_cf(meta, META_NEXT_USER_ID)?)?;
        let next_segment_id = parse_counter(db.get_cf(meta, META_NEXT_SEGMENT_ID)?)?;
        let next_seq = parse_counter(db.get_cf(meta, META_NEXT_HISTORY_SEQ)?)?;

        let history_cf = db
            .cf_handle(CF_HISTORY)
            .context("history column family missing after open")?;
        let last_timestamp = match db.iterator_cf(history_cf, IteratorMode::End).next() {
            Some(item) => {
                let (_, value) = item.context("Failed to read history tail")?;
                let entry: HistoryEntry = serde_json::from_slice(&value)
                    .context("Failed to deserialize history tail")?;
                Some(entry.timestamp)
            }
            None => None,
        };

        tracing::info!(
            path = ?path,
            next_user_id,
            next_segment_id,
            history_entries = next_seq - 1,
            "Segment store opened"
        );

        Ok(Self {
            db,
            counters: Mutex::new(Counters {
                next_user_id,
                next_segment_id,
            }),
            history: Mutex::new(HistoryCursor {
                next_seq,
                last_timestamp,
            }),
        })
    }

    fn cf(&self, name: &str) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Corrupt(format!("missing column family '{name}'")))
    }

    /// Single point read on `meta`, used by the readiness check.
    pub fn ping(&self) -> StoreResult<()> {
        self.db.get_cf(self.cf(CF_META)?, META_NEXT_USER_ID)?;
        Ok(())
    }

    /// RocksDB's key-count estimates for the users and segments tables.
    ///
    /// Approximate once tables have seen deletes; no table scan.
    pub fn estimated_counts(&self) -> StoreResult<(u64, u64)> {
        let estimate = |cf_name: &str| -> StoreResult<u64> {
            Ok(self
                .db
                .property_int_value_cf(self.cf(cf_name)?, "rocksdb.estimate-num-keys")?
                .unwrap_or(0))
        };
        Ok((estimate(CF_USERS)?, estimate(CF_SEGMENTS)?))
    }

    /// Flush all column families to disk (called on graceful shutdown)
    pub fn flush(&self) -> anyhow::Result<()> {
        let mut flush_opts = FlushOptions::default();
        flush_opts.set_wait(true);
        for cf_name in ALL_CFS {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db
                    .flush_cf_opt(cf, &flush_opts)
                    .map_err(|e| anyhow::anyhow!("Failed to flush {cf_name}: {e}"))?;
            }
        }
        Ok(())
    }

    fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> StoreResult<Option<T>> {
        match self.db.get_cf(self.cf(cf_name)?, key)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn scan_json<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> StoreResult<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf_name)?, IteratorMode::Start) {
            let (_, value) = item?;
            rows.push(serde_json::from_slice(&value)?);
        }
        Ok(rows)
    }

    /// Keys in `cf_name` starting with `{id:020}:`, decoded as id pairs.
    fn scan_pairs(
        &self,
        view: &Snapshot<'_>,
        cf_name: &str,
        id: u64,
    ) -> StoreResult<Vec<(u64, u64)>> {
        let prefix = format!("{id:020}:");
        let mut pairs = Vec::new();
        let iter = view.iterator_cf(
            self.cf(cf_name)?,
            IteratorMode::From(prefix.as_bytes(), Direction::Forward),
        );
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            pairs.push(parse_pair_key(&key)?);
        }
        Ok(pairs)
    }

    fn segment_by_id(&self, id: u64) -> StoreResult<Option<Segment>> {
        self.get_json(CF_SEGMENTS, id_key(id).as_bytes())
    }

    fn segment_at(&self, view: &Snapshot<'_>, id: u64) -> StoreResult<Option<Segment>> {
        match view.get_cf(self.cf(CF_SEGMENTS)?, id_key(id).as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn segment_name(
        &self,
        view: &Snapshot<'_>,
        id: u64,
        cache: &mut HashMap<u64, String>,
    ) -> StoreResult<String> {
        if let Some(name) = cache.get(&id) {
            return Ok(name.clone());
        }
        let segment = self.segment_at(view, id)?.ok_or_else(|| {
            StoreError::Corrupt(format!("membership references missing segment {id}"))
        })?;
        cache.insert(id, segment.name.clone());
        Ok(segment.name)
    }

    fn membership_exists(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<bool> {
        let key = pair_key(user_id.0, segment_id.0);
        Ok(self.db.get_cf(self.cf(CF_MEMBERSHIPS)?, key.as_bytes())?.is_some())
    }
}

impl EntityStore for RocksStore {
    fn create_user(&self, name: &str) -> StoreResult<User> {
        let mut counters = self.counters.lock();
        let user = User {
            id: UserId(counters.next_user_id),
            name: name.to_string(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_USERS)?,
            id_key(user.id.0).as_bytes(),
            serde_json::to_vec(&user)?,
        );
        batch.put_cf(
            self.cf(CF_META)?,
            META_NEXT_USER_ID,
            (user.id.0 + 1).to_string().as_bytes(),
        );
        self.db.write(batch)?;
        counters.next_user_id += 1;

        tracing::debug!(user_id = %user.id, "Created user");
        Ok(user)
    }

    fn delete_user(&self, id: UserId) -> StoreResult<()> {
        let _guard = self.counters.lock();
        let key = id_key(id.0);
        if self.db.get_cf(self.cf(CF_USERS)?, key.as_bytes())?.is_none() {
            return Err(StoreError::UserNotFound(id));
        }

        let memberships = self.scan_pairs(&self.db.snapshot(), CF_MEMBERSHIPS, id.0)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_USERS)?, key.as_bytes());
        for (user_id, segment_id) in &memberships {
            batch.delete_cf(
                self.cf(CF_MEMBERSHIPS)?,
                pair_key(*user_id, *segment_id).as_bytes(),
            );
            batch.delete_cf(
                self.cf(CF_MEMBERSHIPS_BY_SEGMENT)?,
                pair_key(*segment_id, *user_id).as_bytes(),
            );
        }
        self.db.write(batch)?;

        tracing::debug!(user_id = %id, memberships = memberships.len(), "Deleted user");
        Ok(())
    }

    fn find_user(&self, id: UserId) -> StoreResult<Option<User>> {
        self.get_json(CF_USERS, id_key(id.0).as_bytes())
    }

    fn list_users(&self) -> StoreResult<Vec<User>> {
        self.scan_json(CF_USERS)
    }

    fn create_segment(&self, name: &str) -> StoreResult<Segment> {
        let display_name = name.trim();
        let normalized = normalize_segment_name(name);

        let mut counters = self.counters.lock();
        let names_cf = self.cf(CF_SEGMENT_NAMES)?;
        if self.db.get_cf(names_cf, normalized.as_bytes())?.is_some() {
            return Err(StoreError::SegmentAlreadyExists(display_name.to_string()));
        }

        let segment = Segment {
            id: SegmentId(counters.next_segment_id),
            name: display_name.to_string(),
        };

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_SEGMENTS)?,
            id_key(segment.id.0).as_bytes(),
            serde_json::to_vec(&segment)?,
        );
        batch.put_cf(
            names_cf,
            normalized.as_bytes(),
            segment.id.0.to_string().as_bytes(),
        );
        batch.put_cf(
            self.cf(CF_META)?,
            META_NEXT_SEGMENT_ID,
            (segment.id.0 + 1).to_string().as_bytes(),
        );
        self.db.write(batch)?;
        counters.next_segment_id += 1;

        tracing::debug!(segment_id = %segment.id, name = %segment.name, "Created segment");
        Ok(segment)
    }

    fn delete_segment(&self, name: &str) -> StoreResult<Segment> {
        let _guard = self.counters.lock();
        let segment = self
            .find_segment(name)?
            .ok_or_else(|| StoreError::SegmentNotFound(name.to_string()))?;

        let memberships =
            self.scan_pairs(&self.db.snapshot(), CF_MEMBERSHIPS_BY_SEGMENT, segment.id.0)?;
        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_SEGMENTS)?, id_key(segment.id.0).as_bytes());
        batch.delete_cf(
            self.cf(CF_SEGMENT_NAMES)?,
            normalize_segment_name(&segment.name).as_bytes(),
        );
        for (segment_id, user_id) in &memberships {
            batch.delete_cf(
                self.cf(CF_MEMBERSHIPS)?,
                pair_key(*user_id, *segment_id).as_bytes(),
            );
            batch.delete_cf(
                self.cf(CF_MEMBERSHIPS_BY_SEGMENT)?,
                pair_key(*segment_id, *user_id).as_bytes(),
            );
        }
        self.db.write(batch)?;

        tracing::debug!(
            segment_id = %segment.id,
            name = %segment.name,
            memberships = memberships.len(),
            "Deleted segment"
        );
        Ok(segment)
    }

    fn find_segment(&self, name: &str) -> StoreResult<Option<Segment>> {
        let normalized = normalize_segment_name(name);
        let view = self.db.snapshot();
        let Some(raw_id) = view.get_cf(self.cf(CF_SEGMENT_NAMES)?, normalized.as_bytes())?
        else {
            return Ok(None);
        };

        let id = std::str::from_utf8(&raw_id)
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .ok_or_else(|| StoreError::Corrupt(format!("bad id for segment '{normalized}'")))?;

        match self.segment_at(&view, id)? {
            Some(segment) => Ok(Some(segment)),
            None => Err(StoreError::Corrupt(format!(
                "name index for '{normalized}' points at missing segment {id}"
            ))),
        }
    }

    fn list_segments(&self) -> StoreResult<Vec<Segment>> {
        self.scan_json(CF_SEGMENTS)
    }

    fn is_member(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<bool> {
        self.membership_exists(user_id, segment_id)
    }

    fn add_membership(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<()> {
        let _guard = self.counters.lock();
        if self.membership_exists(user_id, segment_id)? {
            return Err(StoreError::AlreadyMember {
                user_id,
                segment_id,
            });
        }
        // Referential checks run under the same lock as cascading deletes.
        if self.find_user(user_id)?.is_none() {
            return Err(StoreError::UserNotFound(user_id));
        }
        if self.segment_by_id(segment_id.0)?.is_none() {
            return Err(StoreError::SegmentNotFound(segment_id.to_string()));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_MEMBERSHIPS)?,
            pair_key(user_id.0, segment_id.0).as_bytes(),
            MEMBER_MARKER,
        );
        batch.put_cf(
            self.cf(CF_MEMBERSHIPS_BY_SEGMENT)?,
            pair_key(segment_id.0, user_id.0).as_bytes(),
            MEMBER_MARKER,
        );
        self.db.write(batch)?;
        Ok(())
    }

    fn remove_membership(&self, user_id: UserId, segment_id: SegmentId) -> StoreResult<()> {
        let _guard = self.counters.lock();
        if !self.membership_exists(user_id, segment_id)? {
            return Err(StoreError::NotMember {
                user_id,
                segment_id,
            });
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(
            self.cf(CF_MEMBERSHIPS)?,
            pair_key(user_id.0, segment_id.0).as_bytes(),
        );
        batch.delete_cf(
            self.cf(CF_MEMBERSHIPS_BY_SEGMENT)?,
            pair_key(segment_id.0, user_id.0).as_bytes(),
        );
        self.db.write(batch)?;
        Ok(())
    }

    fn list_memberships_by_user(&self, user_id: UserId) -> StoreResult<Vec<String>> {
        let view = self.db.snapshot();
        let mut cache = HashMap::new();
        self.scan_pairs(&view, CF_MEMBERSHIPS, user_id.0)?
            .into_iter()
            .map(|(_, segment_id)| self.segment_name(&view, segment_id, &mut cache))
            .collect()
    }

    fn list_all_memberships(&self) -> StoreResult<Vec<UserSegments>> {
        let view = self.db.snapshot();
        let mut cache = HashMap::new();
        let mut result: Vec<UserSegments> = Vec::new();

        for item in view.iterator_cf(self.cf(CF_MEMBERSHIPS)?, IteratorMode::Start) {
            let (key, _) = item?;
            let (user_id, segment_id) = parse_pair_key(&key)?;
            let name = self.segment_name(&view, segment_id, &mut cache)?;

            match result.last_mut() {
                Some(group) if group.user_id.0 == user_id => group.segments.push(name),
                _ => result.push(UserSegments {
                    user_id: UserId(user_id),
                    segments: vec![name],
                }),
            }
        }

        Ok(result)
    }
}

impl HistoryLog for RocksStore {
    fn record(&self, entry: &HistoryEntry) -> StoreResult<()> {
        let mut cursor = self.history.lock();

        let mut entry = entry.clone();
        if let Some(last) = cursor.last_timestamp {
            if entry.timestamp < last {
                entry.timestamp = last;
            }
        }

        let seq = cursor.next_seq;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_HISTORY)?,
            id_key(seq).as_bytes(),
            serde_json::to_vec(&entry)?,
        );
        batch.put_cf(
            self.cf(CF_META)?,
            META_NEXT_HISTORY_SEQ,
            (seq + 1).to_string().as_bytes(),
        );
        self.db.write(batch)?;

        cursor.next_seq += 1;
        cursor.last_timestamp = Some(entry.timestamp);

        tracing::debug!(
            seq,
            user_id = %entry.user_id,
            segment = %entry.segment_name,
            action = %entry.action,
            "Recorded membership history"
        );
        Ok(())
    }

    fn query(&self, period: ReportPeriod) -> StoreResult<HistoryIter<'_>> {
        let iter = self
            .db
            .iterator_cf(self.cf(CF_HISTORY)?, IteratorMode::Start)
            .filter_map(move |item| {
                let decoded = item.map_err(StoreError::from).and_then(|(_, value)| {
                    serde_json::from_slice::<HistoryEntry>(&value).map_err(StoreError::from)
                });
                match decoded {
                    Ok(entry) if period.contains(&entry.timestamp) => {
                        Some(Ok(HistoryRecord::from(entry)))
                    }
                    Ok(_) => None,
                    Err(e) => Some(Err(e)),
                }
            });
        Ok(Box::new(iter))
    }
}
