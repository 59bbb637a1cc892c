use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry status of a taxpayer as published by DGII.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxpayerStatus {
    Active,
    Inactive,
    Suspended,
    Cancelled,
    /// Any label not covered above, kept verbatim.
    Other(String),
}

impl TaxpayerStatus {
    /// Map a registry label (`ACTIVO`, `SUSPENDIDO`, `DADO DE BAJA`, ...).
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_uppercase();
        match normalized.as_str() {
            "ACTIVO" | "ACTIVE" => TaxpayerStatus::Active,
            "INACTIVO" | "INACTIVE" | "CESE TEMPORAL" => TaxpayerStatus::Inactive,
            "SUSPENDIDO" | "SUSPENDED" => TaxpayerStatus::Suspended,
            "DADO DE BAJA" | "ANULADO" | "CANCELLED" => TaxpayerStatus::Cancelled,
            _ => TaxpayerStatus::Other(label.trim().to_string()),
        }
    }

    /// Stable label used for persistence.
    pub fn as_label(&self) -> &str {
        match self {
            TaxpayerStatus::Active => "ACTIVO",
            TaxpayerStatus::Inactive => "INACTIVO",
            TaxpayerStatus::Suspended => "SUSPENDIDO",
            TaxpayerStatus::Cancelled => "DADO DE BAJA",
            TaxpayerStatus::Other(label) => label,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaxpayerStatus::Active)
    }
}

/// One mirrored taxpayer row, keyed by `taxpayer_id`.
///
/// `updated_at` is supplied by whoever produced the record (the sync run or
/// an administrative correction), never stamped by the store, so applying the
/// same record twice leaves identical state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryRecord {
    pub taxpayer_id: String,
    pub legal_name: String,
    pub business_name: Option<String>,
    pub business_type: Option<String>,
    pub economic_activity: Option<String>,
    pub status: TaxpayerStatus,
    pub payment_regime: Option<String>,
    pub address: Option<String>,
    pub province: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl RegistryRecord {
    pub fn new(
        taxpayer_id: impl Into<String>,
        legal_name: impl Into<String>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            taxpayer_id: taxpayer_id.into(),
            legal_name: legal_name.into(),
            business_name: None,
            business_type: None,
            economic_activity: None,
            status: TaxpayerStatus::Active,
            payment_regime: None,
            address: None,
            province: None,
            phone: None,
            email: None,
            updated_at,
        }
    }

    pub fn with_business_name(mut self, name: impl Into<String>) -> Self {
        self.business_name = Some(name.into());
        self
    }

    pub fn with_status(mut self, status: TaxpayerStatus) -> Self {
        self.status = status;
        self
    }

    /// Trade name when present, legal name otherwise.
    pub fn display_name(&self) -> &str {
        self.business_name.as_deref().unwrap_or(&self.legal_name)
    }

    /// Substring match against the id and both name fields.
    pub fn matches(&self, query: &str, case_sensitive: bool) -> bool {
        let fields = [
            Some(self.taxpayer_id.as_str()),
            Some(self.legal_name.as_str()),
            self.business_name.as_deref(),
        ];
        if case_sensitive {
            fields.into_iter().flatten().any(|f| f.contains(query))
        } else {
            let needle = query.to_lowercase();
            fields
                .into_iter()
                .flatten()
                .any(|f| f.to_lowercase().contains(&needle))
        }
    }
}
