//! Persisted sync status, one row per sync domain.
//!
//! Every mutation is an atomic check-and-set on the stored row, so the row is
//! the single-flight gate even with several server instances.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use fiscalpos_registry::{CancelOutcome, ProgressUpdate, SyncStatus};

use crate::store::StoreResult;

pub use in_memory::InMemorySyncStatusStore;
pub use postgres::PostgresSyncStatusStore;

#[async_trait]
pub trait SyncStatusStore: Send + Sync {
    /// Current status; IDLE if the domain never ran.
    async fn load(&self, domain: &str) -> StoreResult<SyncStatus>;

    /// Enter RUNNING for `run_id`, or reject with `AlreadyRunning`.
    async fn try_begin(
        &self,
        domain: &str,
        run_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<SyncStatus>;

    /// `Ok(false)` when `run_id` no longer owns the status.
    async fn record_progress(
        &self,
        domain: &str,
        run_id: Uuid,
        update: &ProgressUpdate,
    ) -> StoreResult<bool>;

    async fn complete(
        &self,
        domain: &str,
        run_id: Uuid,
        processed: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    async fn fail(
        &self,
        domain: &str,
        run_id: Uuid,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool>;

    /// Force COMPLETED; see [`SyncStatus::cancel`].
    async fn cancel(
        &self,
        domain: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<(CancelOutcome, SyncStatus)>;
}

#[async_trait]
impl<S: SyncStatusStore + ?Sized> SyncStatusStore for Arc<S> {
    async fn load(&self, domain: &str) -> StoreResult<SyncStatus> {
        (**self).load(domain).await
    }

    async fn try_begin(
        &self,
        domain: &str,
        run_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<SyncStatus> {
        (**self).try_begin(domain, run_id, at).await
    }

    async fn record_progress(
        &self,
        domain: &str,
        run_id: Uuid,
        update: &ProgressUpdate,
    ) -> StoreResult<bool> {
        (**self).record_progress(domain, run_id, update).await
    }

    async fn complete(
        &self,
        domain: &str,
        run_id: Uuid,
        processed: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        (**self).complete(domain, run_id, processed, at).await
    }

    async fn fail(
        &self,
        domain: &str,
        run_id: Uuid,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        (**self).fail(domain, run_id, message, at).await
    }

    async fn cancel(
        &self,
        domain: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<(CancelOutcome, SyncStatus)> {
        (**self).cancel(domain, at).await
    }
}
