//! Persisted status of a registry sync domain.
//!
//! The transitions here are pure. Stores apply them atomically (under a write
//! lock, or as a single conditional `UPDATE`) so the persisted row itself is
//! the single-flight gate across server instances.
//!
//! ```text
//! IDLE ──start──▶ RUNNING ──(end of source)──▶ COMPLETED
//!   ▲                │    ──(source error)───▶ FAILED
//!   │                └────(cancel)───────────▶ COMPLETED (cancelled)
//!   └── COMPLETED / FAILED may start a new run
//! ```
//!
//! Every write made on behalf of a run is conditional on the status still
//! being `RUNNING` with that run's `run_id`. Whichever of a cancel and the
//! run's own completion lands first wins; the other becomes a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fiscalpos_core::{ComplianceError, ComplianceResult};

/// Sync domain of the taxpayer registry mirror.
pub const RNC_SYNC_DOMAIN: &str = "RNC";

/// Highest progress a run can report before it has actually finished.
pub const MAX_RUNNING_PROGRESS: u8 = 99;

pub const STARTED_MESSAGE: &str = "sync started";
pub const RESET_MESSAGE: &str = "sync status reset by operator";

pub fn completed_message(processed: u64) -> String {
    format!("sync completed: {processed} records")
}

pub fn cancelled_message(processed: u64) -> String {
    format!("sync cancelled by operator after {processed} records")
}

pub fn progress_message(processed: u64) -> String {
    format!("{processed} records processed")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncState {
    Idle,
    Running,
    Completed,
    Failed,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncState::Idle => "IDLE",
            SyncState::Running => "RUNNING",
            SyncState::Completed => "COMPLETED",
            SyncState::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(SyncState::Idle),
            "RUNNING" => Some(SyncState::Running),
            "COMPLETED" => Some(SyncState::Completed),
            "FAILED" => Some(SyncState::Failed),
            _ => None,
        }
    }
}

impl core::fmt::Display for SyncState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Incremental progress reported by a run after each batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub processed: u64,
    pub total: Option<u64>,
    /// Raw percentage; clamped by [`SyncStatus::advance`].
    pub percent: u8,
    pub message: String,
}

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// A running run was stopped.
    Cancelled,
    /// An idle or failed status was normalised to COMPLETED.
    Reset,
    /// Already COMPLETED; nothing changed.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    pub domain: String,
    pub status: SyncState,
    /// 0..=100. Never decreases within a run.
    pub progress: u8,
    pub processed: u64,
    /// Total records, when the source knows it up front.
    pub total: Option<u64>,
    pub message: String,
    pub started_at: Option<DateTime<Utc>>,
    /// Set only on COMPLETED or FAILED.
    pub completed_at: Option<DateTime<Utc>>,
    pub run_id: Option<Uuid>,
    /// COMPLETED because an operator stopped the run.
    pub cancelled: bool,
}

impl SyncStatus {
    pub fn idle(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            status: SyncState::Idle,
            progress: 0,
            processed: 0,
            total: None,
            message: String::new(),
            started_at: None,
            completed_at: None,
            run_id: None,
            cancelled: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == SyncState::Running
    }

    /// Whether `run_id` still owns this status.
    pub fn is_current_run(&self, run_id: Uuid) -> bool {
        self.is_running() && self.run_id == Some(run_id)
    }

    /// Enter RUNNING for a new run.
    pub fn begin(&mut self, run_id: Uuid, at: DateTime<Utc>) -> ComplianceResult<()> {
        if self.is_running() {
            return Err(ComplianceError::already_running(self.domain.clone()));
        }
        self.status = SyncState::Running;
        self.progress = 0;
        self.processed = 0;
        self.total = None;
        self.message = STARTED_MESSAGE.to_string();
        self.started_at = Some(at);
        self.completed_at = None;
        self.run_id = Some(run_id);
        self.cancelled = false;
        Ok(())
    }

    /// Returns `false` (and changes nothing) if the run no longer owns the status.
    pub fn advance(&mut self, run_id: Uuid, update: &ProgressUpdate) -> bool {
        if !self.is_current_run(run_id) {
            return false;
        }
        self.progress = self.progress.max(update.percent.min(MAX_RUNNING_PROGRESS));
        self.processed = update.processed;
        self.total = update.total;
        self.message = update.message.clone();
        true
    }

    pub fn complete(&mut self, run_id: Uuid, processed: u64, at: DateTime<Utc>) -> bool {
        if !self.is_current_run(run_id) {
            return false;
        }
        self.status = SyncState::Completed;
        self.progress = 100;
        self.processed = processed;
        self.message = completed_message(processed);
        self.completed_at = Some(at);
        true
    }

    pub fn fail(&mut self, run_id: Uuid, message: impl Into<String>, at: DateTime<Utc>) -> bool {
        if !self.is_current_run(run_id) {
            return false;
        }
        self.status = SyncState::Failed;
        self.message = message.into();
        self.completed_at = Some(at);
        true
    }

    /// Operator stop. Safe in any state; progress is left where it was.
    pub fn cancel(&mut self, at: DateTime<Utc>) -> CancelOutcome {
        match self.status {
            SyncState::Running => {
                self.status = SyncState::Completed;
                self.message = cancelled_message(self.processed);
                self.completed_at = Some(at);
                self.cancelled = true;
                CancelOutcome::Cancelled
            }
            SyncState::Idle | SyncState::Failed => {
                self.status = SyncState::Completed;
                self.message = RESET_MESSAGE.to_string();
                self.completed_at = Some(at);
                CancelOutcome::Reset
            }
            SyncState::Completed => CancelOutcome::Unchanged,
        }
    }
}

/// `done * 100 / total`, capped below completion.
pub fn progress_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let pct = (u128::from(done) * 100 / u128::from(total)).min(u128::from(MAX_RUNNING_PROGRESS));
    pct as u8
}
