//! Shared application state
//!
//! One RocksDB-backed store serves as both the entity store and the history
//! log; the reconciler is wired to it through the store traits.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::config::ServerConfig;
use crate::errors::AppError;
use crate::reconcile::Reconciler;
use crate::store::{EntityStore, HistoryLog, RocksStore, StoreResult};

/// Application state type alias
pub type AppState = Arc<SegmentService>;

/// Central state handed to every handler
pub struct SegmentService {
    store: Arc<RocksStore>,
    reconciler: Reconciler,
}

impl SegmentService {
    pub fn new(server_config: ServerConfig) -> Result<Self> {
        let store = Arc::new(
            RocksStore::open(&server_config.storage_path)
                .context("Failed to open segment store")?,
        );
        let reconciler = Reconciler::new(store.clone(), store.clone());

        info!(path = ?server_config.storage_path, "Segment service ready");

        Ok(Self { store, reconciler })
    }

    pub fn store(&self) -> &dyn EntityStore {
        self.store.as_ref()
    }

    pub fn history(&self) -> &dyn HistoryLog {
        self.store.as_ref()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Cheap storage read for the readiness check
    pub fn ping(&self) -> StoreResult<()> {
        self.store.ping()
    }

    /// Estimated (users, segments) counts without a table scan
    pub fn estimated_counts(&self) -> StoreResult<(u64, u64)> {
        self.store.estimated_counts()
    }

    /// Flush RocksDB memtables (critical for graceful shutdown)
    pub fn flush(&self) -> Result<()> {
        self.store.flush()
    }
}

/// Run synchronous storage work off the async workers.
///
/// A panic inside `work` becomes `AppError::Internal`.
pub async fn run_blocking<T, F>(state: &AppState, work: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&SegmentService) -> Result<T, AppError> + Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || work(&state))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Blocking task panicked: {e}")))?
}
