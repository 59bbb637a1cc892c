use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fiscalpos_registry::{CancelOutcome, ProgressUpdate, SyncStatus};

use super::SyncStatusStore;
use crate::store::{StoreError, StoreResult};

/// In-memory sync status rows.
///
/// Each transition runs under the write lock, which is the check-and-set.
#[derive(Debug, Default)]
pub struct InMemorySyncStatusStore {
    rows: RwLock<HashMap<String, SyncStatus>>,
}

impl InMemorySyncStatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn transition<T>(&self, domain: &str, f: impl FnOnce(&mut SyncStatus) -> T) -> StoreResult<T> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let row = rows
            .entry(domain.to_string())
            .or_insert_with(|| SyncStatus::idle(domain));
        Ok(f(row))
    }
}

#[async_trait]
impl SyncStatusStore for InMemorySyncStatusStore {
    async fn load(&self, domain: &str) -> StoreResult<SyncStatus> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows
            .get(domain)
            .cloned()
            .unwrap_or_else(|| SyncStatus::idle(domain)))
    }

    async fn try_begin(
        &self,
        domain: &str,
        run_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<SyncStatus> {
        self.transition(domain, |s| s.begin(run_id, at).map(|_| s.clone()))?
            .map_err(StoreError::from)
    }

    async fn record_progress(
        &self,
        domain: &str,
        run_id: Uuid,
        update: &ProgressUpdate,
    ) -> StoreResult<bool> {
        self.transition(domain, |s| s.advance(run_id, update))
    }

    async fn complete(
        &self,
        domain: &str,
        run_id: Uuid,
        processed: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.transition(domain, |s| s.complete(run_id, processed, at))
    }

    async fn fail(
        &self,
        domain: &str,
        run_id: Uuid,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        self.transition(domain, |s| s.fail(run_id, message, at))
    }

    async fn cancel(
        &self,
        domain: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<(CancelOutcome, SyncStatus)> {
        self.transition(domain, |s| (s.cancel(at), s.clone()))
    }
}
