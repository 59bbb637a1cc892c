//! Facade used by the sales workflow, validation routes and the admin trigger.
//!
//! Adds no rules of its own beyond input shape checks; everything else is
//! delegated to the allocator, the registry store and the sync job.

use std::sync::Arc;

use fiscalpos_core::{ComplianceError, ComplianceResult};
use fiscalpos_fiscal::{NcfNumber, NcfType};
use fiscalpos_registry::{RegistryRecord, SyncStatus, TaxpayerId};

use crate::allocator::NcfAllocator;
use crate::registry_store::RegistryStore;
use crate::registry_sync::{RegistrySyncJob, SyncRun};

#[derive(Clone)]
pub struct ComplianceFacade {
    allocator: NcfAllocator,
    registry: Arc<dyn RegistryStore>,
    sync: RegistrySyncJob,
}

impl ComplianceFacade {
    pub fn new(allocator: NcfAllocator, registry: Arc<dyn RegistryStore>, sync: RegistrySyncJob) -> Self {
        Self {
            allocator,
            registry,
            sync,
        }
    }

    pub fn allocator(&self) -> &NcfAllocator {
        &self.allocator
    }

    /// Number for a sale with no identified buyer.
    ///
    /// Any error must abort the sale.
    pub async fn issue_number_for_sale(&self, doc_type: NcfType) -> ComplianceResult<NcfNumber> {
        self.issue_number_for_sale_to(doc_type, None).await
    }

    /// Number for a sale, checking the buyer id first when the type requires one.
    ///
    /// The buyer is checked before allocating so a rejected sale does not
    /// consume a number.
    pub async fn issue_number_for_sale_to(
        &self,
        doc_type: NcfType,
        buyer_tax_id: Option<&str>,
    ) -> ComplianceResult<NcfNumber> {
        match buyer_tax_id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => {
                TaxpayerId::parse(raw)?;
            }
            None if doc_type.requires_buyer_tax_id() => {
                return Err(ComplianceError::validation(format!(
                    "{doc_type} documents require the buyer's RNC or cédula"
                )));
            }
            None => {}
        }
        self.allocator.allocate(doc_type).await
    }

    /// Shape-checked only: the registry mirrors ids whose check digit fails,
    /// and those must still be found.
    pub async fn lookup_taxpayer(&self, taxpayer_id: &str) -> ComplianceResult<Option<RegistryRecord>> {
        let id = TaxpayerId::parse_shape(taxpayer_id)?;
        Ok(self.registry.find_by_id(id.as_str()).await?)
    }

    /// Substring search over id and names. `limit` 0 means the hard cap.
    pub async fn search_taxpayers(&self, query: &str, limit: usize) -> ComplianceResult<Vec<RegistryRecord>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ComplianceError::validation("search query must not be empty"));
        }
        Ok(self.registry.search(query, limit).await?)
    }

    pub async fn start_registry_sync(&self) -> ComplianceResult<SyncStatus> {
        Ok(self.start_registry_sync_run().await?.status().clone())
    }

    /// Like [`Self::start_registry_sync`], keeping the handle to the run.
    pub async fn start_registry_sync_run(&self) -> ComplianceResult<SyncRun> {
        self.sync.start().await
    }

    pub async fn cancel_registry_sync(&self) -> ComplianceResult<SyncStatus> {
        self.sync.cancel().await
    }

    pub async fn poll_registry_sync(&self) -> ComplianceResult<SyncStatus> {
        self.sync.poll().await
    }
}
