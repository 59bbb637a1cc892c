//! Postgres-backed sync status.
//!
//! Each transition runs in one transaction: the row is locked with
//! `SELECT ... FOR UPDATE`, the pure transition from
//! `fiscalpos_registry::SyncStatus` is applied, and the row is written back
//! only if it changed. Two instances racing on `start` (or a cancel racing a
//! run's completion) are serialized by the row lock.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use async_trait::async_trait;
use fiscalpos_registry::{CancelOutcome, ProgressUpdate, SyncState, SyncStatus};

use super::SyncStatusStore;
use crate::postgres::{from_db_int, map_sqlx_error, to_db_int};
use crate::store::{RetryPolicy, StoreError, StoreResult};

const COLUMNS: &str = "domain, status, progress, processed, total, message, started_at, \
                       completed_at, run_id, cancelled";

#[derive(Debug, Clone)]
pub struct PostgresSyncStatusStore {
    pool: PgPool,
    retry: RetryPolicy,
}

struct StatusRow {
    domain: String,
    status: String,
    progress: i16,
    processed: i64,
    total: Option<i64>,
    message: String,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    run_id: Option<Uuid>,
    cancelled: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StatusRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            domain: row.try_get("domain")?,
            status: row.try_get("status")?,
            progress: row.try_get("progress")?,
            processed: row.try_get("processed")?,
            total: row.try_get("total")?,
            message: row.try_get("message")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            run_id: row.try_get("run_id")?,
            cancelled: row.try_get("cancelled")?,
        })
    }
}

impl TryFrom<StatusRow> for SyncStatus {
    type Error = StoreError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        let status = SyncState::parse(&row.status).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown sync status {:?}", row.status))
        })?;
        Ok(SyncStatus {
            domain: row.domain,
            status,
            progress: u8::try_from(row.progress.clamp(0, 100)).unwrap_or(0),
            processed: from_db_int("status_row", row.processed)?,
            total: row.total.map(|t| from_db_int("status_row", t)).transpose()?,
            message: row.message,
            started_at: row.started_at,
            completed_at: row.completed_at,
            run_id: row.run_id,
            cancelled: row.cancelled,
        })
    }
}

impl PostgresSyncStatusStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    /// Lock the domain row (creating it as IDLE if needed).
    async fn lock_row(
        tx: &mut Transaction<'_, Postgres>,
        domain: &str,
    ) -> StoreResult<SyncStatus> {
        sqlx::query(
            r#"
            INSERT INTO sync_status (domain, status) VALUES ($1, 'IDLE')
            ON CONFLICT (domain) DO NOTHING
            "#,
        )
        .bind(domain)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_status", e))?;

        let row: StatusRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM sync_status WHERE domain = $1 FOR UPDATE"
        ))
        .bind(domain)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_status", e))?;
        row.try_into()
    }

    async fn write_row(tx: &mut Transaction<'_, Postgres>, s: &SyncStatus) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE sync_status SET
                status = $2,
                progress = $3,
                processed = $4,
                total = $5,
                message = $6,
                started_at = $7,
                completed_at = $8,
                run_id = $9,
                cancelled = $10
            WHERE domain = $1
            "#,
        )
        .bind(&s.domain)
        .bind(s.status.as_str())
        .bind(i16::from(s.progress))
        .bind(to_db_int("write_status", s.processed)?)
        .bind(s.total.map(|t| to_db_int("write_status", t)).transpose()?)
        .bind(&s.message)
        .bind(s.started_at)
        .bind(s.completed_at)
        .bind(s.run_id)
        .bind(s.cancelled)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("write_status", e))?;
        Ok(())
    }

    /// Apply `f` to the locked row and persist the result if it changed.
    async fn transition<T, F>(&self, operation: &str, domain: &str, f: F) -> StoreResult<(T, SyncStatus)>
    where
        F: Fn(&mut SyncStatus) -> T + Send + Sync,
        T: Send,
    {
        let f = &f;
        self.retry
            .run(operation, move || async move {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| map_sqlx_error(operation, e))?;
                let before = Self::lock_row(&mut tx, domain).await?;
                let mut after = before.clone();
                let out = f(&mut after);
                if after != before {
                    Self::write_row(&mut tx, &after).await?;
                }
                tx.commit().await.map_err(|e| map_sqlx_error(operation, e))?;
                Ok((out, after))
            })
            .await
    }
}

#[async_trait]
impl SyncStatusStore for PostgresSyncStatusStore {
    #[instrument(skip(self), err)]
    async fn load(&self, domain: &str) -> StoreResult<SyncStatus> {
        self.retry
            .run("load_status", move || async move {
                let row: Option<StatusRow> = sqlx::query_as(&format!(
                    "SELECT {COLUMNS} FROM sync_status WHERE domain = $1"
                ))
                .bind(domain)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("load_status", e))?;
                match row {
                    Some(row) => row.try_into(),
                    None => Ok(SyncStatus::idle(domain)),
                }
            })
            .await
    }

    #[instrument(skip(self), err)]
    async fn try_begin(
        &self,
        domain: &str,
        run_id: Uuid,
        at: DateTime<Utc>,
    ) -> StoreResult<SyncStatus> {
        let (began, status) = self
            .transition("begin_sync", domain, |s| s.begin(run_id, at))
            .await?;
        began?;
        Ok(status)
    }

    #[instrument(skip(self, update), fields(processed = update.processed), err)]
    async fn record_progress(
        &self,
        domain: &str,
        run_id: Uuid,
        update: &ProgressUpdate,
    ) -> StoreResult<bool> {
        let (owned, _) = self
            .transition("record_progress", domain, |s| s.advance(run_id, update))
            .await?;
        Ok(owned)
    }

    #[instrument(skip(self), err)]
    async fn complete(
        &self,
        domain: &str,
        run_id: Uuid,
        processed: u64,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let (owned, _) = self
            .transition("complete_sync", domain, |s| s.complete(run_id, processed, at))
            .await?;
        Ok(owned)
    }

    #[instrument(skip(self), err)]
    async fn fail(
        &self,
        domain: &str,
        run_id: Uuid,
        message: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let (owned, _) = self
            .transition("fail_sync", domain, |s| s.fail(run_id, message, at))
            .await?;
        Ok(owned)
    }

    #[instrument(skip(self), err)]
    async fn cancel(
        &self,
        domain: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<(CancelOutcome, SyncStatus)> {
        self.transition("cancel_sync", domain, |s| s.cancel(at)).await
    }
}
