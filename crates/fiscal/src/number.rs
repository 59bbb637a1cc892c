//! Fixed-width fiscal document number.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use fiscalpos_core::{ComplianceError, ComplianceResult};

use crate::NcfType;

/// Length of the series prefix (`B01`).
pub const PREFIX_LEN: usize = 3;
/// Width of the zero-padded ordinal.
pub const ORDINAL_DIGITS: usize = 10;
/// Total length of a formatted NCF.
pub const NCF_LEN: usize = PREFIX_LEN + ORDINAL_DIGITS;
/// Largest ordinal representable in the fixed width.
pub const MAX_ORDINAL: u64 = 9_999_999_999;

/// An issued fiscal number: series prefix + zero-padded ordinal, e.g. `B010000000042`.
///
/// Immutable once issued. Ordinals start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NcfNumber {
    doc_type: NcfType,
    ordinal: u64,
}

impl NcfNumber {
    pub fn new(doc_type: NcfType, ordinal: u64) -> ComplianceResult<Self> {
        if ordinal == 0 || ordinal > MAX_ORDINAL {
            return Err(ComplianceError::malformed(format!(
                "ordinal {ordinal} outside 1..={MAX_ORDINAL}"
            )));
        }
        Ok(Self { doc_type, ordinal })
    }

    pub fn doc_type(&self) -> NcfType {
        self.doc_type
    }

    pub fn ordinal(&self) -> u64 {
        self.ordinal
    }

    /// Extract the document type from a number's prefix.
    ///
    /// Only the prefix is inspected; the ordinal part is not validated.
    pub fn derive_type(ncf: &str) -> ComplianceResult<NcfType> {
        let ncf = ncf.trim();
        let prefix = ncf.get(..PREFIX_LEN).ok_or_else(|| {
            ComplianceError::malformed(format!(
                "{ncf:?} is shorter than the {PREFIX_LEN}-character prefix"
            ))
        })?;
        NcfType::from_code(prefix)
            .ok_or_else(|| ComplianceError::malformed(format!("unknown NCF prefix {prefix:?}")))
    }

    /// Parse a full 13-character number.
    pub fn parse(ncf: &str) -> ComplianceResult<Self> {
        let ncf = ncf.trim();
        let doc_type = Self::derive_type(ncf)?;
        if ncf.len() != NCF_LEN {
            return Err(ComplianceError::malformed(format!(
                "{ncf:?} must be {NCF_LEN} characters, got {}",
                ncf.len()
            )));
        }
        let digits = &ncf[PREFIX_LEN..];
        if !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ComplianceError::malformed(format!(
                "{ncf:?} ordinal must be {ORDINAL_DIGITS} digits"
            )));
        }
        let ordinal = digits
            .parse::<u64>()
            .map_err(|e| ComplianceError::malformed(format!("{ncf:?}: {e}")))?;
        Self::new(doc_type, ordinal)
    }
}

impl core::fmt::Display for NcfNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}{:0width$}",
            self.doc_type.code(),
            self.ordinal,
            width = ORDINAL_DIGITS
        )
    }
}

impl FromStr for NcfNumber {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NcfNumber {
    type Error = ComplianceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NcfNumber> for String {
    fn from(value: NcfNumber) -> Self {
        value.to_string()
    }
}
