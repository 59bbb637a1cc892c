//! Taxpayer registry domain module (RNC mirror).
//!
//! This crate contains the taxpayer identifier rules, the registry record
//! shape, and the persisted sync status state machine, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod record;
pub mod sync_status;
pub mod taxpayer_id;

pub use record::{RegistryRecord, TaxpayerStatus};
pub use sync_status::{
    progress_message, progress_percent, CancelOutcome, ProgressUpdate, SyncState, SyncStatus,
    RNC_SYNC_DOMAIN,
};
pub use taxpayer_id::{TaxpayerId, TaxpayerKind};
