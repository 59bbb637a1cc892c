//! Local mirror of the national taxpayer registry.

pub mod in_memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use fiscalpos_registry::RegistryRecord;

use crate::store::StoreResult;

pub use in_memory::InMemoryRegistryStore;
pub use postgres::PostgresRegistryStore;

/// Hard cap on search results, whatever the caller asks for.
pub const MAX_SEARCH_RESULTS: usize = 50;

/// `0` means "as many as allowed".
pub fn effective_limit(requested: usize) -> usize {
    if requested == 0 {
        MAX_SEARCH_RESULTS
    } else {
        requested.min(MAX_SEARCH_RESULTS)
    }
}

#[async_trait]
pub trait RegistryStore: Send + Sync {
    /// Insert or replace by `taxpayer_id`. Idempotent.
    async fn upsert(&self, record: &RegistryRecord) -> StoreResult<()>;

    async fn find_by_id(&self, taxpayer_id: &str) -> StoreResult<Option<RegistryRecord>>;

    /// Substring match on id and names, ordered by legal name then id.
    async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<RegistryRecord>>;

    async fn count(&self) -> StoreResult<u64>;
}

#[async_trait]
impl<S: RegistryStore + ?Sized> RegistryStore for Arc<S> {
    async fn upsert(&self, record: &RegistryRecord) -> StoreResult<()> {
        (**self).upsert(record).await
    }

    async fn find_by_id(&self, taxpayer_id: &str) -> StoreResult<Option<RegistryRecord>> {
        (**self).find_by_id(taxpayer_id).await
    }

    async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<RegistryRecord>> {
        (**self).search(query, limit).await
    }

    async fn count(&self) -> StoreResult<u64> {
        (**self).count().await
    }
}
