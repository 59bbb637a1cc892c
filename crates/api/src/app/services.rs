use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;

use fiscalpos_core::{Clock, SystemClock};
use fiscalpos_infra::{
    postgres,
    registry_store::{InMemoryRegistryStore, PostgresRegistryStore, RegistryStore},
    registry_sync::{self, RegistrySyncJob},
    sequence_store::{InMemorySequenceStore, PostgresSequenceStore, SequenceStore},
    sync_status_store::{InMemorySyncStatusStore, PostgresSyncStatusStore, SyncStatusStore},
    ComplianceConfig, ComplianceFacade, NcfAllocator,
};
use fiscalpos_registry::RNC_SYNC_DOMAIN;

/// Wired compliance services, in-memory (dev/test) or Postgres-backed.
#[derive(Clone)]
pub enum AppServices {
    InMemory { facade: ComplianceFacade },
    Persistent { facade: ComplianceFacade, pool: PgPool },
}

impl AppServices {
    pub fn facade(&self) -> &ComplianceFacade {
        match self {
            AppServices::InMemory { facade } | AppServices::Persistent { facade, .. } => facade,
        }
    }

    pub fn backend(&self) -> &'static str {
        match self {
            AppServices::InMemory { .. } => "in_memory",
            AppServices::Persistent { .. } => "postgres",
        }
    }

    /// Whether the backing store answers.
    pub async fn is_ready(&self) -> bool {
        match self {
            AppServices::InMemory { .. } => true,
            AppServices::Persistent { pool, .. } => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
        }
    }
}

/// Postgres when `DATABASE_URL` is set, in-memory otherwise.
pub async fn build_services(config: &ComplianceConfig) -> anyhow::Result<AppServices> {
    match &config.database_url {
        Some(url) => build_persistent_services(config, url).await,
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory stores (state is lost on restart)");
            Ok(build_in_memory_services(config))
        }
    }
}

pub fn build_in_memory_services(config: &ComplianceConfig) -> AppServices {
    let registry = Arc::new(
        InMemoryRegistryStore::new().with_case_sensitive_search(config.search_case_sensitive),
    );
    let facade = wire(
        config,
        Arc::new(InMemorySequenceStore::new()),
        registry,
        Arc::new(InMemorySyncStatusStore::new()),
    );
    AppServices::InMemory { facade }
}

async fn build_persistent_services(config: &ComplianceConfig, url: &str) -> anyhow::Result<AppServices> {
    let pool = postgres::connect(url)
        .await
        .context("failed to connect to Postgres")?;
    postgres::ensure_schema(&pool)
        .await
        .context("failed to create schema")?;

    let retry = config.store_retry.clone();
    let registry = Arc::new(
        PostgresRegistryStore::new(pool.clone(), retry.clone())
            .with_case_sensitive_search(config.search_case_sensitive),
    );
    let facade = wire(
        config,
        Arc::new(PostgresSequenceStore::new(pool.clone(), retry.clone())),
        registry,
        Arc::new(PostgresSyncStatusStore::new(pool.clone(), retry)),
    );
    tracing::info!("using Postgres stores");
    Ok(AppServices::Persistent { facade, pool })
}

fn wire(
    config: &ComplianceConfig,
    sequences: Arc<dyn SequenceStore>,
    registry: Arc<dyn RegistryStore>,
    status: Arc<dyn SyncStatusStore>,
) -> ComplianceFacade {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let allocator = NcfAllocator::new(sequences, clock.clone())
        .with_low_sequence_threshold(config.low_sequence_threshold)
        .with_expiry_warning_days(config.expiry_warning_days);
    let sync = RegistrySyncJob::new(
        RNC_SYNC_DOMAIN,
        registry_sync::source_factory(config),
        registry.clone(),
        status,
        clock,
    )
    .with_batch_size(config.sync_batch_size);
    ComplianceFacade::new(allocator, registry, sync)
}
