//! Durable per-type NCF counters.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use fiscalpos_fiscal::{NcfSequence, NcfType};

use crate::store::StoreResult;

pub use in_memory::InMemorySequenceStore;
pub use postgres::PostgresSequenceStore;

/// Sequence storage abstraction.
///
/// `today` is the caller's business date; it decides expiry and seeds the
/// default expiry of rows created on first use.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    /// Existing row, or a fresh one (`current_number = 0`, active, default expiry).
    async fn get_or_create(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence>;

    /// Atomically advance the counter and return the row after the increment.
    ///
    /// Concurrent callers for the same type never observe the same ordinal.
    /// Rejections (`InactiveType`, `Expired`, `Exhausted`) leave the row unchanged.
    async fn reserve_next(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence>;

    async fn set_active(
        &self,
        doc_type: NcfType,
        active: bool,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence>;

    async fn set_expiry(
        &self,
        doc_type: NcfType,
        expiry_date: NaiveDate,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence>;

    /// Replace the authorized ceiling (`None` removes it).
    async fn set_max_number(
        &self,
        doc_type: NcfType,
        max_number: Option<u64>,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence>;

    /// All stored rows ordered by type.
    async fn list(&self) -> StoreResult<Vec<NcfSequence>>;
}

#[async_trait]
impl<S: SequenceStore + ?Sized> SequenceStore for Arc<S> {
    async fn get_or_create(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        (**self).get_or_create(doc_type, today).await
    }

    async fn reserve_next(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        (**self).reserve_next(doc_type, today).await
    }

    async fn set_active(
        &self,
        doc_type: NcfType,
        active: bool,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        (**self).set_active(doc_type, active, today).await
    }

    async fn set_expiry(
        &self,
        doc_type: NcfType,
        expiry_date: NaiveDate,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        (**self).set_expiry(doc_type, expiry_date, today).await
    }

    async fn set_max_number(
        &self,
        doc_type: NcfType,
        max_number: Option<u64>,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        (**self).set_max_number(doc_type, max_number, today).await
    }

    async fn list(&self) -> StoreResult<Vec<NcfSequence>> {
        (**self).list().await
    }
}
