//! Per-type sequence state and issuance rules.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use fiscalpos_core::{ComplianceError, ComplianceResult};

use crate::{NcfType, MAX_ORDINAL};

/// Counter and metadata for one document type.
///
/// Invariant: `current_number` never decreases for a given `doc_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NcfSequence {
    pub doc_type: NcfType,
    /// Last issued ordinal (0 = nothing issued yet).
    pub current_number: u64,
    /// Authorized ceiling, if the DGII authorization names one.
    pub max_number: Option<u64>,
    /// Last calendar day on which numbers of this type may be issued.
    pub expiry_date: NaiveDate,
    pub is_active: bool,
}

impl NcfSequence {
    /// Fresh sequence: nothing issued, active, default expiry.
    pub fn new(doc_type: NcfType, today: NaiveDate) -> Self {
        Self {
            doc_type,
            current_number: 0,
            max_number: None,
            expiry_date: default_expiry(today),
            is_active: true,
        }
    }

    /// Highest ordinal that may ever be issued (authorized ceiling or format limit).
    pub fn ceiling(&self) -> u64 {
        self.max_number.unwrap_or(MAX_ORDINAL).min(MAX_ORDINAL)
    }

    pub fn remaining(&self) -> u64 {
        self.ceiling().saturating_sub(self.current_number)
    }

    pub fn is_expired_on(&self, today: NaiveDate) -> bool {
        today > self.expiry_date
    }

    /// Check whether one more number may be issued on `today` and return its ordinal.
    ///
    /// Pure decision: the caller is responsible for making the increment atomic.
    pub fn next_ordinal(&self, today: NaiveDate) -> ComplianceResult<u64> {
        let code = self.doc_type.code();
        if !self.is_active {
            return Err(ComplianceError::inactive(code));
        }
        if self.is_expired_on(today) {
            return Err(ComplianceError::expired(code, self.expiry_date));
        }
        let next = self
            .current_number
            .checked_add(1)
            .filter(|n| *n <= self.ceiling())
            .ok_or_else(|| ComplianceError::exhausted(code, self.ceiling()))?;
        Ok(next)
    }

    /// Replace the authorized ceiling. Already issued ordinals must stay within it.
    pub fn set_max_number(&mut self, max_number: Option<u64>) -> ComplianceResult<()> {
        if let Some(max) = max_number {
            validate_ceiling(self.doc_type, max, self.current_number)?;
        }
        self.max_number = max_number;
        Ok(())
    }

    pub fn expiration_info(&self, as_of: DateTime<Utc>) -> ExpirationInfo {
        ExpirationInfo {
            doc_type: self.doc_type,
            expiry_date: self.expiry_date,
            days_until_expiry: days_until(self.expiry_date, as_of),
            is_expired: self.is_expired_on(as_of.date_naive()),
            is_active: self.is_active,
        }
    }
}

/// Expiry fields exposed to collaborators as plain data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpirationInfo {
    pub doc_type: NcfType,
    pub expiry_date: NaiveDate,
    /// Ceiling of the remaining time in days; negative once expired.
    pub days_until_expiry: i64,
    pub is_expired: bool,
    pub is_active: bool,
}

/// Expiry plus counter state for an administrative overview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceInfo {
    #[serde(flatten)]
    pub expiration: ExpirationInfo,
    pub current_number: u64,
    pub max_number: Option<u64>,
    pub remaining: u64,
}

impl SequenceInfo {
    pub fn at(seq: &NcfSequence, as_of: DateTime<Utc>) -> Self {
        Self {
            expiration: seq.expiration_info(as_of),
            current_number: seq.current_number,
            max_number: seq.max_number,
            remaining: seq.remaining(),
        }
    }
}

/// A ceiling must be a representable ordinal and not below `current_number`.
pub fn validate_ceiling(doc_type: NcfType, max_number: u64, current_number: u64) -> ComplianceResult<()> {
    if max_number == 0 || max_number > MAX_ORDINAL {
        return Err(ComplianceError::validation(format!(
            "ceiling for {doc_type} must be within 1..={MAX_ORDINAL}, got {max_number}"
        )));
    }
    if max_number < current_number {
        return Err(ComplianceError::validation(format!(
            "ceiling {max_number} for {doc_type} is below the {current_number} numbers already issued"
        )));
    }
    Ok(())
}

/// `ceil((expiry_date - as_of) in days)`, with the expiry date taken at 00:00 UTC.
pub fn days_until(expiry_date: NaiveDate, as_of: DateTime<Utc>) -> i64 {
    let expiry_start = expiry_date.and_time(chrono::NaiveTime::MIN).and_utc();
    let secs = (expiry_start - as_of).num_seconds();
    let days = secs.div_euclid(86_400);
    if secs.rem_euclid(86_400) > 0 { days + 1 } else { days }
}

/// DGII sequence authorizations are valid until 31 December of the following year.
pub fn default_expiry(today: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(today.year() + 1, 12, 31).unwrap_or(NaiveDate::MAX)
}
