//! RNC registry synchronization: sources and the background job.

pub mod file_source;
pub mod job;
pub mod source;

use std::sync::Arc;

pub use file_source::{DgiiFileSource, DgiiFileSourceFactory};
pub use job::{RegistrySyncJob, SyncRun};
pub use source::{
    RegistrySource, RegistrySourceFactory, SourceError, SourcePosition, StaticRegistrySource,
    StaticSourceFactory, UnconfiguredSource,
};

use crate::config::ComplianceConfig;

/// The DGII file when a path is configured, otherwise a source that fails every run.
pub fn source_factory(config: &ComplianceConfig) -> Arc<dyn RegistrySourceFactory> {
    match &config.rnc_source_path {
        Some(path) => Arc::new(DgiiFileSourceFactory::new(path.clone())),
        None => Arc::new(UnconfiguredSource),
    }
}
