//! Background registry synchronization.
//!
//! The persisted [`SyncStatus`] row is the only authority on whether a run may
//! proceed. A run stops at the next batch boundary once its in-process cancel
//! flag is set or the row no longer names it as the current run (which is how
//! a cancel issued by another instance reaches it).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use uuid::Uuid;

use fiscalpos_core::{Clock, ComplianceResult};
use fiscalpos_registry::{
    progress_message, progress_percent, CancelOutcome, ProgressUpdate, SyncStatus,
};

use super::source::{RegistrySource, RegistrySourceFactory};
use crate::config::DEFAULT_SYNC_BATCH_SIZE;
use crate::registry_store::RegistryStore;
use crate::sync_status_store::SyncStatusStore;

/// Handle to a started run.
#[derive(Debug)]
pub struct SyncRun {
    run_id: Uuid,
    status: SyncStatus,
    task: JoinHandle<()>,
}

impl SyncRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Status as of the successful start.
    pub fn status(&self) -> &SyncStatus {
        &self.status
    }

    /// Wait for the background task to exit.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            tracing::error!(run_id = %self.run_id, error = %e, "registry sync task aborted");
        }
    }
}

type ActiveRun = Option<(Uuid, Arc<AtomicBool>)>;

#[derive(Clone)]
pub struct RegistrySyncJob {
    domain: String,
    sources: Arc<dyn RegistrySourceFactory>,
    registry: Arc<dyn RegistryStore>,
    status: Arc<dyn SyncStatusStore>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    active: Arc<Mutex<ActiveRun>>,
}

impl RegistrySyncJob {
    pub fn new(
        domain: impl Into<String>,
        sources: Arc<dyn RegistrySourceFactory>,
        registry: Arc<dyn RegistryStore>,
        status: Arc<dyn SyncStatusStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            domain: domain.into(),
            sources,
            registry,
            status,
            clock,
            batch_size: DEFAULT_SYNC_BATCH_SIZE,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Enter RUNNING and spawn the run. Fails with `AlreadyRunning` when a
    /// run (from any instance) holds the status.
    pub async fn start(&self) -> ComplianceResult<SyncRun> {
        let run_id = Uuid::now_v7();
        let started_at = self.clock.now();
        let status = self.status.try_begin(&self.domain, run_id, started_at).await?;

        let cancel = Arc::new(AtomicBool::new(false));
        if let Ok(mut active) = self.active.lock() {
            if let Some((_, previous)) = active.replace((run_id, cancel.clone())) {
                previous.store(true, Ordering::SeqCst);
            }
        }

        tracing::info!(domain = %self.domain, %run_id, "registry sync started");

        let job = self.clone();
        let task = tokio::spawn(async move {
            job.run(run_id, cancel).await;
            job.clear_active(run_id);
        });

        Ok(SyncRun {
            run_id,
            status,
            task,
        })
    }

    /// Force COMPLETED. Safe at any time; see [`SyncStatus::cancel`].
    pub async fn cancel(&self) -> ComplianceResult<SyncStatus> {
        let (outcome, status) = self.status.cancel(&self.domain, self.clock.now()).await?;
        if outcome == CancelOutcome::Cancelled {
            if let Some(run_id) = status.run_id {
                self.signal_stop(run_id);
            }
        }
        tracing::info!(domain = %self.domain, ?outcome, "registry sync cancel requested");
        Ok(status)
    }

    pub async fn poll(&self) -> ComplianceResult<SyncStatus> {
        Ok(self.status.load(&self.domain).await?)
    }

    /// Raise the cancel flag only if `run_id` is the active run.
    fn signal_stop(&self, run_id: Uuid) {
        if let Ok(active) = self.active.lock() {
            if let Some((id, flag)) = active.as_ref() {
                if *id == run_id {
                    flag.store(true, Ordering::SeqCst);
                }
            }
        }
    }

    fn clear_active(&self, run_id: Uuid) {
        if let Ok(mut active) = self.active.lock() {
            if matches!(active.as_ref(), Some((id, _)) if *id == run_id) {
                *active = None;
            }
        }
    }

    async fn should_stop(&self, run_id: Uuid, cancel: &AtomicBool) -> bool {
        if cancel.load(Ordering::SeqCst) {
            return true;
        }
        match self.status.load(&self.domain).await {
            Ok(status) => !status.is_current_run(run_id),
            // Keep going; the next CAS write decides.
            Err(e) => {
                tracing::warn!(domain = %self.domain, %run_id, error = %e, "could not read sync status");
                false
            }
        }
    }

    async fn fail(&self, run_id: Uuid, message: String) {
        tracing::warn!(domain = %self.domain, %run_id, %message, "registry sync failed");
        match self
            .status
            .fail(&self.domain, run_id, &message, self.clock.now())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(domain = %self.domain, %run_id, "failure not recorded; run no longer current")
            }
            Err(e) => {
                tracing::error!(domain = %self.domain, %run_id, error = %e, "could not record sync failure")
            }
        }
    }

    async fn run(&self, run_id: Uuid, cancel: Arc<AtomicBool>) {
        let mut source = match self.sources.open(self.clock.now()).await {
            Ok(source) => source,
            Err(e) => return self.fail(run_id, e.to_string()).await,
        };
        let total = source.total_records();
        let mut processed: u64 = 0;

        loop {
            if self.should_stop(run_id, &cancel).await {
                tracing::info!(domain = %self.domain, %run_id, processed, "registry sync stopped");
                return;
            }

            let batch = match source.next_batch(self.batch_size).await {
                Ok(Some(batch)) => batch,
                Ok(None) => break,
                Err(e) => return self.fail(run_id, e.to_string()).await,
            };

            // A cancel that landed while the batch was being fetched wins.
            if self.should_stop(run_id, &cancel).await {
                tracing::info!(domain = %self.domain, %run_id, processed, "registry sync stopped");
                return;
            }

            for record in &batch {
                if let Err(e) = self.registry.upsert(record).await {
                    return self
                        .fail(run_id, format!("failed to store {}: {e}", record.taxpayer_id))
                        .await;
                }
            }
            processed += batch.len() as u64;

            let update = ProgressUpdate {
                processed,
                total,
                percent: batch_percent(processed, total, source.as_ref()),
                message: progress_message(processed),
            };
            tracing::debug!(
                domain = %self.domain,
                %run_id,
                processed,
                percent = update.percent,
                "registry sync batch applied"
            );
            match self.status.record_progress(&self.domain, run_id, &update).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!(domain = %self.domain, %run_id, processed, "registry sync superseded");
                    return;
                }
                Err(e) => {
                    tracing::warn!(domain = %self.domain, %run_id, error = %e, "could not record sync progress")
                }
            }
        }

        match self
            .status
            .complete(&self.domain, run_id, processed, self.clock.now())
            .await
        {
            Ok(true) => {
                tracing::info!(domain = %self.domain, %run_id, processed, "registry sync completed")
            }
            Ok(false) => {
                tracing::info!(domain = %self.domain, %run_id, processed, "registry sync cancelled before completion")
            }
            Err(e) => self.fail(run_id, format!("could not record completion: {e}")).await,
        }
    }
}

/// Record-count based when the source knows its size, position based otherwise.
fn batch_percent(processed: u64, total: Option<u64>, source: &dyn RegistrySource) -> u8 {
    if let Some(total) = total {
        return progress_percent(processed, total);
    }
    let position = source.position();
    position
        .total
        .map(|t| progress_percent(position.consumed, t))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fiscalpos_core::{ComplianceError, FixedClock};
    use fiscalpos_registry::{RegistryRecord, SyncState, RNC_SYNC_DOMAIN};

    use crate::registry_store::InMemoryRegistryStore;
    use crate::registry_sync::{StaticSourceFactory, UnconfiguredSource};
    use crate::sync_status_store::InMemorySyncStatusStore;

    fn records(n: u32) -> Vec<RegistryRecord> {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| RegistryRecord::new(format!("1{i:08}"), format!("EMPRESA {i}"), at))
            .collect()
    }

    fn job(sources: Arc<dyn RegistrySourceFactory>) -> (RegistrySyncJob, Arc<InMemoryRegistryStore>) {
        let registry = Arc::new(InMemoryRegistryStore::new());
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 1, 2, 8, 0, 0).unwrap()));
        let job = RegistrySyncJob::new(
            RNC_SYNC_DOMAIN,
            sources,
            registry.clone(),
            Arc::new(InMemorySyncStatusStore::new()),
            clock,
        );
        (job, registry)
    }

    #[tokio::test]
    async fn empty_source_completes_at_100() {
        let (job, registry) = job(Arc::new(StaticSourceFactory::new(vec![])));
        job.start().await.unwrap().wait().await;
        let s = job.poll().await.unwrap();
        assert_eq!(s.status, SyncState::Completed);
        assert_eq!(s.progress, 100);
        assert_eq!(registry.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unreachable_source_fails_the_run() {
        let (job, _) = job(Arc::new(UnconfiguredSource));
        job.start().await.unwrap().wait().await;
        let s = job.poll().await.unwrap();
        assert_eq!(s.status, SyncState::Failed);
        assert!(s.message.contains("unreachable"));
        assert!(s.completed_at.is_some());
    }

    #[tokio::test]
    async fn restart_after_completion_is_allowed() {
        let (job, registry) = job(Arc::new(StaticSourceFactory::new(vec![records(4)])));
        job.start().await.unwrap().wait().await;
        let run = job.start().await.unwrap();
        assert_eq!(run.status().status, SyncState::Running);
        assert_eq!(run.status().progress, 0);
        run.wait().await;
        assert_eq!(registry.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn start_while_running_is_rejected() {
        let (job, _) = job(Arc::new(StaticSourceFactory::new(vec![records(1)])));
        // Another instance holds the row.
        job.status
            .try_begin(RNC_SYNC_DOMAIN, Uuid::now_v7(), Utc::now())
            .await
            .unwrap();
        let err = job.start().await.err().unwrap();
        assert_eq!(err, ComplianceError::already_running(RNC_SYNC_DOMAIN));
    }

    #[test]
    fn percent_prefers_record_totals() {
        let source = crate::registry_sync::StaticRegistrySource::new(vec![records(1), records(1)]);
        assert_eq!(batch_percent(5, Some(10), &source), 50);
        // position: 0 of 2 batches consumed
        assert_eq!(batch_percent(5, None, &source), 0);
    }
}
