use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use fiscalpos_fiscal::{NcfSequence, NcfType};

use super::SequenceStore;
use crate::store::{StoreError, StoreResult};

/// In-memory sequence store.
///
/// Each mutation runs under a single write lock, which makes `reserve_next`
/// one read-modify-write step. Intended for tests/dev and single-process
/// deployments without a database.
#[derive(Debug, Default)]
pub struct InMemorySequenceStore {
    rows: RwLock<BTreeMap<NcfType, NcfSequence>>,
}

impl InMemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a row (fixtures, imports).
    pub fn insert(&self, seq: NcfSequence) -> StoreResult<()> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        rows.insert(seq.doc_type, seq);
        Ok(())
    }

    fn update(
        &self,
        doc_type: NcfType,
        today: NaiveDate,
        f: impl FnOnce(&mut NcfSequence) -> StoreResult<()>,
    ) -> StoreResult<NcfSequence> {
        let mut rows = self.rows.write().map_err(|_| StoreError::poisoned())?;
        let row = rows
            .entry(doc_type)
            .or_insert_with(|| NcfSequence::new(doc_type, today));
        // Work on a copy so a rejected change leaves the row untouched.
        let mut next = row.clone();
        f(&mut next)?;
        *row = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl SequenceStore for InMemorySequenceStore {
    async fn get_or_create(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        self.update(doc_type, today, |_| Ok(()))
    }

    async fn reserve_next(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        self.update(doc_type, today, |seq| {
            seq.current_number = seq.next_ordinal(today)?;
            Ok(())
        })
    }

    async fn set_active(
        &self,
        doc_type: NcfType,
        active: bool,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        self.update(doc_type, today, |seq| {
            seq.is_active = active;
            Ok(())
        })
    }

    async fn set_expiry(
        &self,
        doc_type: NcfType,
        expiry_date: NaiveDate,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        self.update(doc_type, today, |seq| {
            seq.expiry_date = expiry_date;
            Ok(())
        })
    }

    async fn set_max_number(
        &self,
        doc_type: NcfType,
        max_number: Option<u64>,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        self.update(doc_type, today, |seq| Ok(seq.set_max_number(max_number)?))
    }

    async fn list(&self) -> StoreResult<Vec<NcfSequence>> {
        let rows = self.rows.read().map_err(|_| StoreError::poisoned())?;
        Ok(rows.values().cloned().collect())
    }
}
