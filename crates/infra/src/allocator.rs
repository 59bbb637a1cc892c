//! NCF allocation.
//!
//! `allocate` is the only way a fiscal number enters the system. The counter
//! advance is durable as soon as the store returns: a sale that later fails
//! still consumes its number, and numbers are never handed out twice.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::instrument;

use fiscalpos_core::{Clock, ComplianceResult};
use fiscalpos_fiscal::{ExpirationInfo, NcfNumber, NcfSequence, NcfType, SequenceInfo};

use crate::config::{DEFAULT_EXPIRY_WARNING_DAYS, DEFAULT_LOW_SEQUENCE_THRESHOLD};
use crate::sequence_store::SequenceStore;

#[derive(Clone)]
pub struct NcfAllocator {
    store: Arc<dyn SequenceStore>,
    clock: Arc<dyn Clock>,
    low_sequence_threshold: u64,
    expiry_warning_days: i64,
}

impl NcfAllocator {
    pub fn new(store: Arc<dyn SequenceStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            low_sequence_threshold: DEFAULT_LOW_SEQUENCE_THRESHOLD,
            expiry_warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
        }
    }

    /// Remaining-number count below which each allocation logs a warning.
    pub fn with_low_sequence_threshold(mut self, threshold: u64) -> Self {
        self.low_sequence_threshold = threshold;
        self
    }

    pub fn with_expiry_warning_days(mut self, days: i64) -> Self {
        self.expiry_warning_days = days;
        self
    }

    /// Reserve and format the next number for `doc_type`.
    #[instrument(skip(self), fields(doc_type = %doc_type))]
    pub async fn allocate(&self, doc_type: NcfType) -> ComplianceResult<NcfNumber> {
        let now = self.clock.now();
        let seq = match self.store.reserve_next(doc_type, now.date_naive()).await {
            Ok(seq) => seq,
            Err(e) => {
                tracing::warn!(error = %e, "ncf allocation rejected");
                return Err(e.into());
            }
        };
        let ncf = NcfNumber::new(doc_type, seq.current_number)?;
        tracing::info!(ncf = %ncf, "ncf allocated");
        self.warn_if_running_low(&seq, now);
        Ok(ncf)
    }

    fn warn_if_running_low(&self, seq: &NcfSequence, now: DateTime<Utc>) {
        let remaining = seq.remaining();
        if remaining <= self.low_sequence_threshold {
            tracing::warn!(
                doc_type = %seq.doc_type,
                remaining,
                "ncf sequence running low"
            );
        }
        let info = seq.expiration_info(now);
        if info.days_until_expiry <= self.expiry_warning_days {
            tracing::warn!(
                doc_type = %seq.doc_type,
                expiry_date = %info.expiry_date,
                days_until_expiry = info.days_until_expiry,
                "ncf sequence close to expiry"
            );
        }
    }

    pub async fn expiration_info(&self, doc_type: NcfType) -> ComplianceResult<ExpirationInfo> {
        self.expiration_info_at(doc_type, self.clock.now()).await
    }

    /// Pure read; never allocates.
    pub async fn expiration_info_at(
        &self,
        doc_type: NcfType,
        as_of: DateTime<Utc>,
    ) -> ComplianceResult<ExpirationInfo> {
        let seq = self.store.get_or_create(doc_type, self.clock.today()).await?;
        Ok(seq.expiration_info(as_of))
    }

    /// Document type of a previously issued number.
    pub fn derive_type(&self, ncf: &str) -> ComplianceResult<NcfType> {
        NcfNumber::derive_type(ncf)
    }

    pub async fn sequence_info(&self, doc_type: NcfType) -> ComplianceResult<SequenceInfo> {
        let seq = self.store.get_or_create(doc_type, self.clock.today()).await?;
        Ok(SequenceInfo::at(&seq, self.clock.now()))
    }

    /// Every known type, creating missing sequences on the way.
    pub async fn list(&self) -> ComplianceResult<Vec<SequenceInfo>> {
        let today = self.clock.today();
        for doc_type in NcfType::ALL {
            self.store.get_or_create(doc_type, today).await?;
        }
        let now = self.clock.now();
        Ok(self
            .store
            .list()
            .await?
            .iter()
            .map(|seq| SequenceInfo::at(seq, now))
            .collect())
    }

    #[instrument(skip(self), fields(doc_type = %doc_type))]
    pub async fn set_active(&self, doc_type: NcfType, active: bool) -> ComplianceResult<SequenceInfo> {
        let seq = self.store.set_active(doc_type, active, self.clock.today()).await?;
        tracing::info!(active, "ncf sequence activation changed");
        Ok(SequenceInfo::at(&seq, self.clock.now()))
    }

    #[instrument(skip(self), fields(doc_type = %doc_type))]
    pub async fn set_expiry(
        &self,
        doc_type: NcfType,
        expiry_date: chrono::NaiveDate,
    ) -> ComplianceResult<SequenceInfo> {
        let seq = self
            .store
            .set_expiry(doc_type, expiry_date, self.clock.today())
            .await?;
        tracing::info!(%expiry_date, "ncf sequence expiry changed");
        Ok(SequenceInfo::at(&seq, self.clock.now()))
    }

    #[instrument(skip(self), fields(doc_type = %doc_type))]
    pub async fn set_max_number(
        &self,
        doc_type: NcfType,
        max_number: Option<u64>,
    ) -> ComplianceResult<SequenceInfo> {
        let seq = self
            .store
            .set_max_number(doc_type, max_number, self.clock.today())
            .await?;
        tracing::info!(?max_number, "ncf sequence ceiling changed");
        Ok(SequenceInfo::at(&seq, self.clock.now()))
    }
}
