//! Compliance error model.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type used across the compliance core.
pub type ComplianceResult<T> = Result<T, ComplianceError>;

/// Compliance-level error.
///
/// Allocation failures (`Exhausted`, `InactiveType`, `Expired`) must abort the
/// caller's sale transaction. Registry sync failures are never raised through
/// this type to pollers; they are recorded on the persisted sync status.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ComplianceError {
    /// The next ordinal would exceed the authorized ceiling for the type.
    #[error("NCF sequence {doc_type} is exhausted (ceiling {max_number})")]
    Exhausted { doc_type: String, max_number: u64 },

    /// The document type is disabled for issuance.
    #[error("NCF type {doc_type} is not active")]
    InactiveType { doc_type: String },

    /// The document type is past its expiry date.
    #[error("NCF type {doc_type} expired on {expiry_date}")]
    Expired {
        doc_type: String,
        expiry_date: NaiveDate,
    },

    /// A fiscal number (or document type code) could not be parsed.
    #[error("malformed NCF: {0}")]
    MalformedNumber(String),

    /// A registry sync is already running for the domain.
    #[error("registry sync already running for {domain}")]
    AlreadyRunning { domain: String },

    /// The backing store could not serve the request (after bounded retries).
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Caller input failed shape validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A requested record does not exist.
    #[error("not found")]
    NotFound,
}

impl ComplianceError {
    pub fn exhausted(doc_type: impl Into<String>, max_number: u64) -> Self {
        Self::Exhausted {
            doc_type: doc_type.into(),
            max_number,
        }
    }

    pub fn inactive(doc_type: impl Into<String>) -> Self {
        Self::InactiveType {
            doc_type: doc_type.into(),
        }
    }

    pub fn expired(doc_type: impl Into<String>, expiry_date: NaiveDate) -> Self {
        Self::Expired {
            doc_type: doc_type.into(),
            expiry_date,
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedNumber(msg.into())
    }

    pub fn already_running(domain: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            domain: domain.into(),
        }
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether this error came from the fiscal allocation rules.
    ///
    /// These are the errors a sale transaction must abort on.
    pub fn is_allocation_rejection(&self) -> bool {
        matches!(
            self,
            Self::Exhausted { .. } | Self::InactiveType { .. } | Self::Expired { .. }
        )
    }

    /// Stable machine-readable code (used by the HTTP layer and logs).
    pub fn code(&self) -> &'static str {
        match self {
            Self::Exhausted { .. } => "ncf_exhausted",
            Self::InactiveType { .. } => "ncf_type_inactive",
            Self::Expired { .. } => "ncf_type_expired",
            Self::MalformedNumber(_) => "malformed_ncf",
            Self::AlreadyRunning { .. } => "sync_already_running",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Validation(_) => "validation_error",
            Self::NotFound => "not_found",
        }
    }
}
