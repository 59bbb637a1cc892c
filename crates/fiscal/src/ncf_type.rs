use core::str::FromStr;

use serde::{Deserialize, Serialize};

use fiscalpos_core::ComplianceError;

/// Fiscal document type (NCF series).
///
/// Serialized as the 3-character series prefix printed on the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NcfType {
    /// Crédito fiscal: business buyers claiming ITBIS credit.
    #[serde(rename = "B01")]
    FiscalCredit,
    /// Consumidor final.
    #[serde(rename = "B02")]
    Consumer,
    /// Régimen especial (tax-exempt zones and entities).
    #[serde(rename = "B14")]
    SpecialRegime,
    /// Gubernamental.
    #[serde(rename = "B15")]
    Government,
    /// Exportaciones.
    #[serde(rename = "B16")]
    Export,
}

impl NcfType {
    pub const ALL: [NcfType; 5] = [
        NcfType::FiscalCredit,
        NcfType::Consumer,
        NcfType::SpecialRegime,
        NcfType::Government,
        NcfType::Export,
    ];

    /// Series prefix (always 3 ASCII characters).
    pub fn code(self) -> &'static str {
        match self {
            NcfType::FiscalCredit => "B01",
            NcfType::Consumer => "B02",
            NcfType::SpecialRegime => "B14",
            NcfType::Government => "B15",
            NcfType::Export => "B16",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NcfType::FiscalCredit => "fiscal_credit",
            NcfType::Consumer => "consumer",
            NcfType::SpecialRegime => "special_regime",
            NcfType::Government => "government",
            NcfType::Export => "export",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            NcfType::FiscalCredit => "Factura de Crédito Fiscal",
            NcfType::Consumer => "Factura de Consumo",
            NcfType::SpecialRegime => "Comprobante para Regímenes Especiales",
            NcfType::Government => "Comprobante Gubernamental",
            NcfType::Export => "Comprobante para Exportaciones",
        }
    }

    /// Exact prefix lookup (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code().eq_ignore_ascii_case(code))
    }

    /// Whether documents of this type must name the buyer's RNC/cédula.
    pub fn requires_buyer_tax_id(self) -> bool {
        matches!(self, NcfType::FiscalCredit | NcfType::Government)
    }
}

impl core::fmt::Display for NcfType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.code())
    }
}

/// Accepts either the series prefix (`B01`) or the snake_case name (`fiscal_credit`).
impl FromStr for NcfType {
    type Err = ComplianceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(t) = Self::from_code(s) {
            return Ok(t);
        }
        Self::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ComplianceError::validation(format!("unknown NCF type: {s:?}")))
    }
}
