//! Bulk registry sources.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use fiscalpos_registry::RegistryRecord;

/// Error type for registry sources.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    #[error("source unreachable: {0}")]
    Unreachable(String),

    #[error("malformed registry data at line {line}: {reason}")]
    Malformed { line: u64, reason: String },

    #[error("source read failed: {0}")]
    Io(String),
}

/// How far a source has been consumed, in source-specific units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    pub consumed: u64,
    pub total: Option<u64>,
}

/// One pass over the registry, consumed batch by batch.
#[async_trait]
pub trait RegistrySource: Send {
    /// Next batch of at most `max` records; `None` once exhausted.
    async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RegistryRecord>>, SourceError>;

    fn position(&self) -> SourcePosition;

    /// Record count, when known before reading.
    fn total_records(&self) -> Option<u64> {
        None
    }
}

/// Opens a fresh source for each sync run.
#[async_trait]
pub trait RegistrySourceFactory: Send + Sync {
    /// `started_at` is stamped on records that carry no timestamp of their own.
    async fn open(&self, started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError>;
}

#[async_trait]
impl<F: RegistrySourceFactory + ?Sized> RegistrySourceFactory for Arc<F> {
    async fn open(&self, started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError> {
        (**self).open(started_at).await
    }
}

/// Pre-built batches, returned as-is regardless of the requested size.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistrySource {
    batches: Vec<Vec<RegistryRecord>>,
    next: usize,
}

impl StaticRegistrySource {
    pub fn new(batches: Vec<Vec<RegistryRecord>>) -> Self {
        Self { batches, next: 0 }
    }
}

#[async_trait]
impl RegistrySource for StaticRegistrySource {
    async fn next_batch(&mut self, _max: usize) -> Result<Option<Vec<RegistryRecord>>, SourceError> {
        let batch = self.batches.get(self.next).cloned();
        if batch.is_some() {
            self.next += 1;
        }
        Ok(batch)
    }

    fn position(&self) -> SourcePosition {
        SourcePosition {
            consumed: self.next as u64,
            total: Some(self.batches.len() as u64),
        }
    }

    fn total_records(&self) -> Option<u64> {
        Some(self.batches.iter().map(|b| b.len() as u64).sum())
    }
}

/// Factory handing out copies of the same static batches.
#[derive(Debug, Clone, Default)]
pub struct StaticSourceFactory {
    batches: Vec<Vec<RegistryRecord>>,
}

impl StaticSourceFactory {
    pub fn new(batches: Vec<Vec<RegistryRecord>>) -> Self {
        Self { batches }
    }
}

#[async_trait]
impl RegistrySourceFactory for StaticSourceFactory {
    async fn open(&self, _started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError> {
        Ok(Box::new(StaticRegistrySource::new(self.batches.clone())))
    }
}

/// Stand-in used when no registry source is configured; every run fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredSource;

#[async_trait]
impl RegistrySourceFactory for UnconfiguredSource {
    async fn open(&self, _started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError> {
        Err(SourceError::Unreachable(
            "no registry source configured (set RNC_SOURCE_PATH)".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn test_batch(prefix: u32, n: u32) -> Vec<RegistryRecord> {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| RegistryRecord::new(format!("{prefix}{i:08}"), format!("EMPRESA {prefix}-{i}"), at))
            .collect()
    }

    #[tokio::test]
    async fn static_source_yields_batches_in_order() {
        let mut source = StaticRegistrySource::new(vec![test_batch(1, 2), test_batch(2, 3)]);
        assert_eq!(source.total_records(), Some(5));
        assert_eq!(source.next_batch(100).await.unwrap().unwrap().len(), 2);
        assert_eq!(source.position(), SourcePosition { consumed: 1, total: Some(2) });
        assert_eq!(source.next_batch(100).await.unwrap().unwrap().len(), 3);
        assert!(source.next_batch(100).await.unwrap().is_none());
        assert_eq!(source.position().consumed, 2);
    }

    #[tokio::test]
    async fn unconfigured_source_is_unreachable() {
        let err = UnconfiguredSource.open(Utc::now()).await.err().unwrap();
        assert!(matches!(err, SourceError::Unreachable(_)));
    }
}
