//! Infrastructure layer: stores, allocation, registry sync, config.

pub mod allocator;
pub mod compliance;
pub mod config;
pub mod postgres;
pub mod registry_store;
pub mod registry_sync;
pub mod sequence_store;
pub mod store;
pub mod sync_status_store;

mod integration_tests;

pub use allocator::NcfAllocator;
pub use compliance::ComplianceFacade;
pub use config::{ComplianceConfig, ConfigError};
pub use registry_store::{InMemoryRegistryStore, RegistryStore};
pub use registry_sync::{RegistrySyncJob, SyncRun};
pub use sequence_store::{InMemorySequenceStore, SequenceStore};
pub use store::{RetryPolicy, StoreError, StoreResult};
pub use sync_status_store::{InMemorySyncStatusStore, SyncStatusStore};
