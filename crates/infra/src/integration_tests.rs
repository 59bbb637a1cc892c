//! Facade-level flows over the in-memory stores.
//!
//! Verifies:
//! - A full registry sync moves IDLE → RUNNING → COMPLETED with rising progress
//! - Cancelling mid-run stops at the batch boundary and keeps applied batches
//! - Single-flight start and the idempotent cancel reset
//! - A cancel racing a restart only stops the run it cancelled
//! - A source failing mid-stream leaves FAILED, keeps applied batches, and a rerun converges
//! - Sales abort on allocation errors without consuming numbers

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::Notify;
    use uuid::Uuid;

    use fiscalpos_core::{ComplianceError, FixedClock};
    use fiscalpos_fiscal::NcfType;
    use fiscalpos_registry::{
        CancelOutcome, ProgressUpdate, RegistryRecord, SyncState, SyncStatus, RNC_SYNC_DOMAIN,
    };

    use crate::allocator::NcfAllocator;
    use crate::compliance::ComplianceFacade;
    use crate::registry_store::{InMemoryRegistryStore, RegistryStore};
    use crate::registry_sync::{
        RegistrySource, RegistrySourceFactory, RegistrySyncJob, SourceError, SourcePosition,
        StaticRegistrySource, StaticSourceFactory, UnconfiguredSource,
    };
    use crate::sequence_store::InMemorySequenceStore;
    use crate::store::StoreResult;
    use crate::sync_status_store::{InMemorySyncStatusStore, SyncStatusStore};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 7, 30, 0).unwrap()
    }

    /// `batches` × `per_batch` records with distinct 9-digit ids.
    fn batches(batches: u32, per_batch: u32) -> Vec<Vec<RegistryRecord>> {
        (0..batches)
            .map(|b| {
                (0..per_batch)
                    .map(|i| {
                        RegistryRecord::new(
                            format!("4{b:02}{i:06}"),
                            format!("CONTRIBUYENTE {b}-{i}"),
                            at(),
                        )
                    })
                    .collect()
            })
            .collect()
    }

    /// Status store that remembers every progress value it accepted.
    #[derive(Default)]
    struct RecordingStatusStore {
        inner: InMemorySyncStatusStore,
        seen: Mutex<Vec<u8>>,
    }

    impl RecordingStatusStore {
        fn seen(&self) -> Vec<u8> {
            self.seen.lock().unwrap().clone()
        }

        fn note(&self, progress: u8) {
            self.seen.lock().unwrap().push(progress);
        }
    }

    #[async_trait]
    impl SyncStatusStore for RecordingStatusStore {
        async fn load(&self, domain: &str) -> StoreResult<SyncStatus> {
            self.inner.load(domain).await
        }

        async fn try_begin(&self, domain: &str, run_id: Uuid, at: DateTime<Utc>) -> StoreResult<SyncStatus> {
            let s = self.inner.try_begin(domain, run_id, at).await?;
            self.note(s.progress);
            Ok(s)
        }

        async fn record_progress(&self, domain: &str, run_id: Uuid, update: &ProgressUpdate) -> StoreResult<bool> {
            let owned = self.inner.record_progress(domain, run_id, update).await?;
            self.note(self.inner.load(domain).await?.progress);
            Ok(owned)
        }

        async fn complete(&self, domain: &str, run_id: Uuid, processed: u64, at: DateTime<Utc>) -> StoreResult<bool> {
            let owned = self.inner.complete(domain, run_id, processed, at).await?;
            self.note(self.inner.load(domain).await?.progress);
            Ok(owned)
        }

        async fn fail(&self, domain: &str, run_id: Uuid, message: &str, at: DateTime<Utc>) -> StoreResult<bool> {
            self.inner.fail(domain, run_id, message, at).await
        }

        async fn cancel(&self, domain: &str, at: DateTime<Utc>) -> StoreResult<(CancelOutcome, SyncStatus)> {
            self.inner.cancel(domain, at).await
        }
    }

    /// Serves batches normally but parks before handing out batch `gate_at`
    /// until released, announcing that it got there.
    struct GatedFactory {
        batches: Vec<Vec<RegistryRecord>>,
        gate_at: usize,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    struct GatedSource {
        inner: StaticRegistrySource,
        calls: usize,
        gate_at: usize,
        reached: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl RegistrySource for GatedSource {
        async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RegistryRecord>>, SourceError> {
            if self.calls == self.gate_at {
                self.reached.notify_one();
                self.release.notified().await;
            }
            self.calls += 1;
            self.inner.next_batch(max).await
        }

        fn position(&self) -> SourcePosition {
            self.inner.position()
        }

        fn total_records(&self) -> Option<u64> {
            self.inner.total_records()
        }
    }

    #[async_trait]
    impl RegistrySourceFactory for GatedFactory {
        async fn open(&self, _started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError> {
            Ok(Box::new(GatedSource {
                inner: StaticRegistrySource::new(self.batches.clone()),
                calls: 0,
                gate_at: self.gate_at,
                reached: self.reached.clone(),
                release: self.release.clone(),
            }))
        }
    }

    /// Status store whose cancel parks after writing the row, until released.
    struct ParkingCancelStore {
        inner: InMemorySyncStatusStore,
        written: Arc<Notify>,
        release: Arc<Notify>,
    }

    #[async_trait]
    impl SyncStatusStore for ParkingCancelStore {
        async fn load(&self, domain: &str) -> StoreResult<SyncStatus> {
            self.inner.load(domain).await
        }

        async fn try_begin(&self, domain: &str, run_id: Uuid, at: DateTime<Utc>) -> StoreResult<SyncStatus> {
            self.inner.try_begin(domain, run_id, at).await
        }

        async fn record_progress(&self, domain: &str, run_id: Uuid, update: &ProgressUpdate) -> StoreResult<bool> {
            self.inner.record_progress(domain, run_id, update).await
        }

        async fn complete(&self, domain: &str, run_id: Uuid, processed: u64, at: DateTime<Utc>) -> StoreResult<bool> {
            self.inner.complete(domain, run_id, processed, at).await
        }

        async fn fail(&self, domain: &str, run_id: Uuid, message: &str, at: DateTime<Utc>) -> StoreResult<bool> {
            self.inner.fail(domain, run_id, message, at).await
        }

        async fn cancel(&self, domain: &str, at: DateTime<Utc>) -> StoreResult<(CancelOutcome, SyncStatus)> {
            let result = self.inner.cancel(domain, at).await?;
            self.written.notify_one();
            self.release.notified().await;
            Ok(result)
        }
    }

    /// Fails with malformed data on batch `fail_at` of the first run only.
    struct FailOnceFactory {
        batches: Vec<Vec<RegistryRecord>>,
        fail_at: usize,
        failed: AtomicBool,
    }

    struct FailingSource {
        inner: StaticRegistrySource,
        calls: usize,
        fail_at: Option<usize>,
    }

    #[async_trait]
    impl RegistrySource for FailingSource {
        async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RegistryRecord>>, SourceError> {
            if Some(self.calls) == self.fail_at {
                return Err(SourceError::Malformed {
                    line: 11,
                    reason: "missing legal name".to_string(),
                });
            }
            self.calls += 1;
            self.inner.next_batch(max).await
        }

        fn position(&self) -> SourcePosition {
            self.inner.position()
        }

        fn total_records(&self) -> Option<u64> {
            self.inner.total_records()
        }
    }

    #[async_trait]
    impl RegistrySourceFactory for FailOnceFactory {
        async fn open(&self, _started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError> {
            let first = !self.failed.swap(true, Ordering::SeqCst);
            Ok(Box::new(FailingSource {
                inner: StaticRegistrySource::new(self.batches.clone()),
                calls: 0,
                fail_at: first.then_some(self.fail_at),
            }))
        }
    }

    struct Harness {
        facade: ComplianceFacade,
        registry: Arc<InMemoryRegistryStore>,
    }

    fn harness(
        sources: Arc<dyn RegistrySourceFactory>,
        status: Arc<dyn SyncStatusStore>,
    ) -> Harness {
        let clock = Arc::new(FixedClock::new(at()));
        let registry = Arc::new(InMemoryRegistryStore::new());
        let allocator = NcfAllocator::new(Arc::new(InMemorySequenceStore::new()), clock.clone());
        let sync = RegistrySyncJob::new(RNC_SYNC_DOMAIN, sources, registry.clone(), status, clock);
        Harness {
            facade: ComplianceFacade::new(allocator, registry.clone(), sync),
            registry,
        }
    }

    #[tokio::test]
    async fn full_sync_reaches_completed_with_all_records() {
        let data = batches(3, 10);
        let status = Arc::new(RecordingStatusStore::default());
        let h = harness(Arc::new(StaticSourceFactory::new(data.clone())), status.clone());

        assert_eq!(h.facade.poll_registry_sync().await.unwrap().status, SyncState::Idle);

        let run = h.facade.start_registry_sync_run().await.unwrap();
        assert_eq!(run.status().status, SyncState::Running);
        run.wait().await;

        let done = h.facade.poll_registry_sync().await.unwrap();
        assert_eq!(done.status, SyncState::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.processed, 30);
        assert!(!done.cancelled);
        assert!(done.completed_at.is_some());

        let seen = status.seen();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert!(seen.windows(2).all(|w| w[0] < w[1]), "progress not increasing: {seen:?}");
        assert!(seen.len() >= 4);

        for record in data.iter().flatten() {
            let found = h.registry.find_by_id(&record.taxpayer_id).await.unwrap();
            assert_eq!(found.as_ref(), Some(record));
        }
    }

    #[tokio::test]
    async fn cancel_after_first_batch_keeps_only_that_batch() {
        let data = batches(3, 10);
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let factory = GatedFactory {
            batches: data.clone(),
            gate_at: 1,
            reached: reached.clone(),
            release: release.clone(),
        };
        let h = harness(Arc::new(factory), Arc::new(InMemorySyncStatusStore::new()));

        let run = h.facade.start_registry_sync_run().await.unwrap();
        reached.notified().await;

        let cancelled = h.facade.cancel_registry_sync().await.unwrap();
        assert_eq!(cancelled.status, SyncState::Completed);
        assert!(cancelled.cancelled);
        assert!(cancelled.message.contains("cancelled"));
        assert!(cancelled.progress < 100);

        release.notify_one();
        run.wait().await;

        let after = h.facade.poll_registry_sync().await.unwrap();
        assert_eq!(after, cancelled);
        assert_eq!(h.registry.count().await.unwrap(), 10);
        for record in &data[0] {
            assert!(h.registry.find_by_id(&record.taxpayer_id).await.unwrap().is_some());
        }
        assert!(h.registry.find_by_id(&data[1][0].taxpayer_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_while_running_is_rejected() {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let factory = GatedFactory {
            batches: batches(2, 2),
            gate_at: 0,
            reached: reached.clone(),
            release: release.clone(),
        };
        let h = harness(Arc::new(factory), Arc::new(InMemorySyncStatusStore::new()));

        let run = h.facade.start_registry_sync_run().await.unwrap();
        reached.notified().await;
        let err = h.facade.start_registry_sync().await.unwrap_err();
        assert_eq!(err, ComplianceError::already_running(RNC_SYNC_DOMAIN));

        release.notify_one();
        run.wait().await;
        assert_eq!(h.facade.poll_registry_sync().await.unwrap().status, SyncState::Completed);
    }

    #[tokio::test]
    async fn cancel_while_idle_leaves_completed() {
        let h = harness(Arc::new(StaticSourceFactory::default()), Arc::new(InMemorySyncStatusStore::new()));
        let s = h.facade.cancel_registry_sync().await.unwrap();
        assert_eq!(s.status, SyncState::Completed);
        assert!(!s.cancelled);

        // Repeating it changes nothing.
        assert_eq!(h.facade.cancel_registry_sync().await.unwrap(), s);
    }

    #[tokio::test]
    async fn unreachable_source_is_reported_through_status() {
        let h = harness(Arc::new(UnconfiguredSource), Arc::new(InMemorySyncStatusStore::new()));
        h.facade.start_registry_sync_run().await.unwrap().wait().await;
        let s = h.facade.poll_registry_sync().await.unwrap();
        assert_eq!(s.status, SyncState::Failed);
        assert!(s.message.contains("RNC_SOURCE_PATH"));

        // An operator can clear the failure.
        assert_eq!(h.facade.cancel_registry_sync().await.unwrap().status, SyncState::Completed);
    }

    #[tokio::test]
    async fn cancel_racing_a_restart_leaves_the_new_run_alone() {
        let reached = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let factory = GatedFactory {
            batches: batches(2, 3),
            gate_at: 0,
            reached: reached.clone(),
            release: release.clone(),
        };
        let cancel_written = Arc::new(Notify::new());
        let cancel_release = Arc::new(Notify::new());
        let status = Arc::new(ParkingCancelStore {
            inner: InMemorySyncStatusStore::new(),
            written: cancel_written.clone(),
            release: cancel_release.clone(),
        });
        let h = harness(Arc::new(factory), status);

        let first = h.facade.start_registry_sync_run().await.unwrap();
        reached.notified().await;

        // The cancel has written the row but not yet signalled any run.
        let facade = h.facade.clone();
        let cancel = tokio::spawn(async move { facade.cancel_registry_sync().await });
        cancel_written.notified().await;

        let second = h.facade.start_registry_sync_run().await.unwrap();
        let second_id = second.run_id();
        reached.notified().await;

        cancel_release.notify_one();
        let cancelled = cancel.await.unwrap().unwrap();
        assert_eq!(cancelled.run_id, Some(first.run_id()));
        assert!(cancelled.cancelled);

        release.notify_waiters();
        first.wait().await;
        second.wait().await;

        let s = h.facade.poll_registry_sync().await.unwrap();
        assert_eq!(s.run_id, Some(second_id));
        assert_eq!(s.status, SyncState::Completed);
        assert!(!s.cancelled);
        assert_eq!(s.processed, 6);
        assert_eq!(h.registry.count().await.unwrap(), 6);

        // Nothing is left holding the row.
        let next = h.facade.start_registry_sync_run().await.unwrap();
        reached.notified().await;
        release.notify_one();
        next.wait().await;
    }

    #[tokio::test]
    async fn source_failure_mid_stream_keeps_applied_batches() {
        let data = batches(3, 10);
        let factory = FailOnceFactory {
            batches: data.clone(),
            fail_at: 1,
            failed: AtomicBool::new(false),
        };
        let h = harness(Arc::new(factory), Arc::new(InMemorySyncStatusStore::new()));

        h.facade.start_registry_sync_run().await.unwrap().wait().await;
        let failed = h.facade.poll_registry_sync().await.unwrap();
        assert_eq!(failed.status, SyncState::Failed);
        assert!(failed.completed_at.is_some());
        assert!(failed.message.contains("malformed"), "message: {}", failed.message);
        assert!(failed.message.contains("line 11"), "message: {}", failed.message);
        assert_eq!(failed.processed, 10);
        assert!(failed.progress < 100);

        assert_eq!(h.registry.count().await.unwrap(), 10);
        for record in &data[0] {
            assert!(h.registry.find_by_id(&record.taxpayer_id).await.unwrap().is_some());
        }
        assert!(h.registry.find_by_id(&data[1][0].taxpayer_id).await.unwrap().is_none());

        // A new run re-upserts the first batch and finishes the rest.
        h.facade.start_registry_sync_run().await.unwrap().wait().await;
        let done = h.facade.poll_registry_sync().await.unwrap();
        assert_eq!(done.status, SyncState::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(h.registry.count().await.unwrap(), 30);
        for record in data.iter().flatten() {
            let found = h.registry.find_by_id(&record.taxpayer_id).await.unwrap();
            assert_eq!(found.as_ref(), Some(record));
        }
    }

    #[tokio::test]
    async fn rerun_converges_after_partial_sync() {
        let data = batches(2, 5);
        let h = harness(Arc::new(StaticSourceFactory::new(data)), Arc::new(InMemorySyncStatusStore::new()));
        h.facade.start_registry_sync_run().await.unwrap().wait().await;
        h.facade.start_registry_sync_run().await.unwrap().wait().await;
        assert_eq!(h.registry.count().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn sale_aborts_when_type_is_disabled() {
        let h = harness(Arc::new(StaticSourceFactory::default()), Arc::new(InMemorySyncStatusStore::new()));
        h.facade.allocator().set_active(NcfType::Consumer, false).await.unwrap();
        let err = h.facade.issue_number_for_sale(NcfType::Consumer).await.unwrap_err();
        assert!(err.is_allocation_rejection());

        h.facade.allocator().set_active(NcfType::Consumer, true).await.unwrap();
        let ncf = h.facade.issue_number_for_sale(NcfType::Consumer).await.unwrap();
        assert_eq!(ncf.ordinal(), 1);
    }
}
