//! Shared store plumbing: error type and bounded retry.

pub mod retry;

use fiscalpos_core::ComplianceError;

pub use retry::{BackoffStrategy, RetryPolicy};

pub type StoreResult<T> = Result<T, StoreError>;

/// Store-layer error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// May succeed if retried (IO hiccup, pool timeout, serialization failure).
    #[error("transient storage error: {0}")]
    Transient(String),

    /// Retrying will not help.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// The store refused the operation on domain grounds.
    #[error(transparent)]
    Rejected(#[from] ComplianceError),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub(crate) fn poisoned() -> Self {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

impl From<StoreError> for ComplianceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Rejected(e) => e,
            StoreError::Transient(msg) | StoreError::Unavailable(msg) => {
                ComplianceError::StorageUnavailable(msg)
            }
        }
    }
}
