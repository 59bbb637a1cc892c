use chrono::NaiveDate;
use serde::Deserialize;

use fiscalpos_fiscal::NcfNumber;
use fiscalpos_registry::{RegistryRecord, SyncStatus};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Default, Deserialize)]
pub struct AllocateRequest {
    pub buyer_tax_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetExpiryRequest {
    pub expiry_date: NaiveDate,
}

/// `null` removes the ceiling.
#[derive(Debug, Deserialize)]
pub struct SetMaxNumberRequest {
    pub max_number: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SearchTaxpayersQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

// -------------------------
// Response mapping
// -------------------------

pub fn ncf_to_json(ncf: &NcfNumber) -> serde_json::Value {
    serde_json::json!({
        "ncf": ncf.to_string(),
        "doc_type": ncf.doc_type(),
    })
}

pub fn taxpayer_to_json(record: &RegistryRecord) -> serde_json::Value {
    serde_json::json!({
        "taxpayer_id": record.taxpayer_id,
        "display_name": record.display_name(),
        "legal_name": record.legal_name,
        "business_name": record.business_name,
        "business_type": record.business_type,
        "economic_activity": record.economic_activity,
        "status": record.status.as_label(),
        "is_active": record.status.is_active(),
        "payment_regime": record.payment_regime,
        "address": record.address,
        "province": record.province,
        "phone": record.phone,
        "email": record.email,
        "updated_at": record.updated_at,
    })
}

pub fn sync_status_to_json(status: &SyncStatus) -> serde_json::Value {
    serde_json::json!({
        "domain": status.domain,
        "status": status.status,
        "progress": status.progress,
        "processed": status.processed,
        "total": status.total,
        "message": status.message,
        "started_at": status.started_at,
        "completed_at": status.completed_at,
        "cancelled": status.cancelled,
    })
}
