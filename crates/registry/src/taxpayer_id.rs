//! RNC / cédula identifiers.

use core::str::FromStr;

use serde::Serialize;

use fiscalpos_core::{ComplianceError, ComplianceResult};

pub const RNC_LEN: usize = 9;
pub const CEDULA_LEN: usize = 11;

const RNC_WEIGHTS: [u32; 8] = [7, 9, 8, 6, 5, 4, 3, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaxpayerKind {
    /// Business registration number (9 digits).
    Rnc,
    /// Personal identity number (11 digits).
    Cedula,
}

/// Normalized taxpayer identifier (digits only).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaxpayerId(String);

impl TaxpayerId {
    /// Parse and verify the check digit.
    ///
    /// Dashes and whitespace are ignored (`101-01063-2` == `101010632`).
    pub fn parse(raw: &str) -> ComplianceResult<Self> {
        let id = Self::parse_shape(raw)?;
        let digits = id.0.as_bytes();
        let (body, check) = digits.split_at(digits.len() - 1);
        let expected = match id.kind() {
            TaxpayerKind::Rnc => rnc_check_digit(body),
            TaxpayerKind::Cedula => cedula_check_digit(body),
        };
        if u32::from(check[0] - b'0') != expected {
            return Err(ComplianceError::validation(format!(
                "taxpayer id {} has an invalid check digit",
                id.0
            )));
        }
        Ok(id)
    }

    /// Parse length and digits only.
    ///
    /// The bulk registry is authoritative and occasionally carries ids that
    /// fail the check digit; those are still mirrored.
    pub fn parse_shape(raw: &str) -> ComplianceResult<Self> {
        let normalized: String = raw
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if normalized.is_empty() {
            return Err(ComplianceError::validation("taxpayer id is empty"));
        }
        if !normalized.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ComplianceError::validation(format!(
                "taxpayer id {raw:?} must contain only digits"
            )));
        }
        if normalized.len() != RNC_LEN && normalized.len() != CEDULA_LEN {
            return Err(ComplianceError::validation(format!(
                "taxpayer id must be {RNC_LEN} (RNC) or {CEDULA_LEN} (cédula) digits, got {}",
                normalized.len()
            )));
        }
        Ok(Self(normalized))
    }

    pub fn kind(&self) -> TaxpayerKind {
        if self.0.len() == RNC_LEN {
            TaxpayerKind::Rnc
        } else {
            TaxpayerKind::Cedula
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl core::fmt::Display for TaxpayerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaxpayerId {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// DGII mod-11 check digit over the first 8 RNC digits.
fn rnc_check_digit(body: &[u8]) -> u32 {
    let sum: u32 = body
        .iter()
        .zip(RNC_WEIGHTS)
        .map(|(d, w)| u32::from(d - b'0') * w)
        .sum();
    match sum % 11 {
        0 => 2,
        1 => 1,
        r => 11 - r,
    }
}

/// Luhn (mod-10) check digit over the first 10 cédula digits.
fn cedula_check_digit(body: &[u8]) -> u32 {
    let sum: u32 = body
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let v = u32::from(d - b'0') * if i % 2 == 0 { 1 } else { 2 };
            if v > 9 { v - 9 } else { v }
        })
        .sum();
    (10 - sum % 10) % 10
}
