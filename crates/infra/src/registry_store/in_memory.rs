use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use fiscalpos_registry::RegistryRecord;

use super::{effective_limit, RegistryStore};
use crate::store::{StoreError, StoreResult};

/// In-memory registry mirror.
///
/// Intended for tests/dev. Search is a linear scan.
#[derive(Debug, Default)]
pub struct InMemoryRegistryStore {
    records: RwLock<HashMap<String, RegistryRecord>>,
    case_sensitive: bool,
}

impl InMemoryRegistryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_sensitive_search(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistryStore {
    async fn upsert(&self, record: &RegistryRecord) -> StoreResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        records.insert(record.taxpayer_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_id(&self, taxpayer_id: &str) -> StoreResult<Option<RegistryRecord>> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records.get(taxpayer_id).cloned())
    }

    async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<RegistryRecord>> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        let mut hits: Vec<&RegistryRecord> = records
            .values()
            .filter(|r| r.matches(query, self.case_sensitive))
            .collect();
        hits.sort_by(|a, b| {
            a.legal_name
                .cmp(&b.legal_name)
                .then_with(|| a.taxpayer_id.cmp(&b.taxpayer_id))
        });
        Ok(hits
            .into_iter()
            .take(effective_limit(limit))
            .cloned()
            .collect())
    }

    async fn count(&self) -> StoreResult<u64> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fiscalpos_registry::TaxpayerStatus;

    use crate::registry_store::MAX_SEARCH_RESULTS;

    fn test_record(id: &str, name: &str) -> RegistryRecord {
        RegistryRecord::new(id, name, Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = InMemoryRegistryStore::new();
        let record = test_record("101010632", "FERRETERIA LA FE SRL").with_business_name("La Fe");

        store.upsert(&record).await.unwrap();
        let once = store.find_by_id("101010632").await.unwrap();
        store.upsert(&record).await.unwrap();
        let twice = store.find_by_id("101010632").await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(once, twice);
        assert_eq!(twice, Some(record));
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = InMemoryRegistryStore::new();
        store.upsert(&test_record("131028561", "OLD NAME SRL")).await.unwrap();
        let updated = test_record("131028561", "NEW NAME SRL").with_status(TaxpayerStatus::Suspended);
        store.upsert(&updated).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let found = store.find_by_id("131028561").await.unwrap().unwrap();
        assert_eq!(found.legal_name, "NEW NAME SRL");
        assert_eq!(found.status, TaxpayerStatus::Suspended);
    }

    #[tokio::test]
    async fn missing_id_is_none() {
        let store = InMemoryRegistryStore::new();
        assert_eq!(store.find_by_id("101010632").await.unwrap(), None);
    }

    #[tokio::test]
    async fn search_orders_by_name_then_id() {
        let store = InMemoryRegistryStore::new();
        store.upsert(&test_record("401001128", "BANCO B")).await.unwrap();
        store.upsert(&test_record("131028561", "BANCO A")).await.unwrap();
        store.upsert(&test_record("101010632", "BANCO A")).await.unwrap();
        store.upsert(&test_record("101001852", "COLMADO")).await.unwrap();

        let ids: Vec<_> = store
            .search("banco", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.taxpayer_id)
            .collect();
        assert_eq!(ids, vec!["101010632", "131028561", "401001128"]);
    }

    #[tokio::test]
    async fn search_orders_mixed_case_and_accents_by_byte_value() {
        let store = InMemoryRegistryStore::new();
        store.upsert(&test_record("101010632", "Ñame Criollo SRL")).await.unwrap();
        store.upsert(&test_record("131028561", "agro Norte SRL")).await.unwrap();
        store.upsert(&test_record("401001128", "Zona Franca SRL")).await.unwrap();

        let names: Vec<_> = store
            .search("srl", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.legal_name)
            .collect();
        assert_eq!(names, vec!["Zona Franca SRL", "agro Norte SRL", "Ñame Criollo SRL"]);
    }

    #[tokio::test]
    async fn search_honours_case_sensitivity() {
        let insensitive = InMemoryRegistryStore::new();
        let sensitive = InMemoryRegistryStore::new().with_case_sensitive_search(true);
        for store in [&insensitive, &sensitive] {
            store.upsert(&test_record("101010632", "Farmacia Carol")).await.unwrap();
        }
        assert_eq!(insensitive.search("CAROL", 10).await.unwrap().len(), 1);
        assert!(sensitive.search("CAROL", 10).await.unwrap().is_empty());
        assert_eq!(sensitive.search("Carol", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn search_is_capped() {
        let store = InMemoryRegistryStore::new();
        for i in 0..(MAX_SEARCH_RESULTS + 20) {
            store
                .upsert(&test_record(&format!("1{i:08}"), &format!("TIENDA {i:03}")))
                .await
                .unwrap();
        }
        assert_eq!(store.search("TIENDA", 1_000).await.unwrap().len(), MAX_SEARCH_RESULTS);
        assert_eq!(store.search("TIENDA", 0).await.unwrap().len(), MAX_SEARCH_RESULTS);
        assert_eq!(store.search("TIENDA", 5).await.unwrap().len(), 5);
    }

    fn block_on<F: std::future::Future>(f: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(f)
    }

    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: replaying a sync (the same upserts again) leaves the
        /// store exactly as a single pass did, and search stays sorted and capped.
        #[test]
        fn replayed_upserts_converge(
            rows in proptest::collection::vec((0u32..40, "[A-C]{1,3}"), 0..120),
        ) {
            let records: Vec<_> = rows
                .iter()
                .map(|(id, name)| test_record(&format!("1{id:08}"), name))
                .collect();

            let once = InMemoryRegistryStore::new();
            let twice = InMemoryRegistryStore::new();
            let (a, b) = block_on(async {
                for r in &records {
                    once.upsert(r).await.unwrap();
                    twice.upsert(r).await.unwrap();
                }
                for r in &records {
                    twice.upsert(r).await.unwrap();
                }
                (once.search("", 0).await.unwrap(), twice.search("", 0).await.unwrap())
            });

            prop_assert_eq!(&a, &b);
            prop_assert!(a.len() <= MAX_SEARCH_RESULTS);
            let sorted = a
                .windows(2)
                .all(|w| (&w[0].legal_name, &w[0].taxpayer_id) <= (&w[1].legal_name, &w[1].taxpayer_id));
            prop_assert!(sorted);
        }
    }
}
