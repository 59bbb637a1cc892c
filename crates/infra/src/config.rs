//! Runtime configuration for the compliance core.
//!
//! Loaded from environment variables with defaults; every field can be
//! overridden in code through the `with_*` builders.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use fiscalpos_observability::LogFormat;

use crate::store::RetryPolicy;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_SYNC_BATCH_SIZE: usize = 1000;
pub const DEFAULT_LOW_SEQUENCE_THRESHOLD: u64 = 100;
pub const DEFAULT_EXPIRY_WARNING_DAYS: i64 = 30;

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceConfig {
    /// Postgres connection string; in-memory stores when unset.
    pub database_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub log_format: LogFormat,
    /// DGII bulk registry file. A sync started without one fails its run.
    pub rnc_source_path: Option<PathBuf>,
    pub sync_batch_size: usize,
    pub search_case_sensitive: bool,
    pub low_sequence_threshold: u64,
    pub expiry_warning_days: i64,
    pub store_retry: RetryPolicy,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_format: LogFormat::Json,
            rnc_source_path: None,
            sync_batch_size: DEFAULT_SYNC_BATCH_SIZE,
            search_case_sensitive: false,
            low_sequence_threshold: DEFAULT_LOW_SEQUENCE_THRESHOLD,
            expiry_warning_days: DEFAULT_EXPIRY_WARNING_DAYS,
            store_retry: RetryPolicy::default(),
        }
    }
}

impl ComplianceConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DATABASE_URL` (default: unset, in-memory stores)
    /// - `BIND_ADDR` (default: `0.0.0.0:8080`)
    /// - `LOG_FORMAT` (`json` | `pretty`, default: `json`)
    /// - `RNC_SOURCE_PATH` (default: unset)
    /// - `RNC_SYNC_BATCH_SIZE` (default: 1000)
    /// - `REGISTRY_SEARCH_CASE_SENSITIVE` (default: false)
    /// - `NCF_LOW_SEQUENCE_THRESHOLD` (default: 100)
    /// - `NCF_EXPIRY_WARNING_DAYS` (default: 30)
    /// - `STORE_RETRY_ATTEMPTS` (default: 3)
    /// - `STORE_RETRY_BASE_MS` (default: 25)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let log_format = match var("LOG_FORMAT") {
            Some(raw) => raw
                .parse::<LogFormat>()
                .map_err(|reason| invalid("LOG_FORMAT", &raw, reason))?,
            None => defaults.log_format,
        };

        let sync_batch_size = parse_or(&var, "RNC_SYNC_BATCH_SIZE", defaults.sync_batch_size)?;
        if sync_batch_size == 0 {
            return Err(invalid("RNC_SYNC_BATCH_SIZE", "0", "must be at least 1"));
        }

        let max_attempts = parse_or(&var, "STORE_RETRY_ATTEMPTS", defaults.store_retry.max_attempts)?;
        if max_attempts == 0 {
            return Err(invalid("STORE_RETRY_ATTEMPTS", "0", "must be at least 1"));
        }
        let base_ms: u64 = parse_or(
            &var,
            "STORE_RETRY_BASE_MS",
            defaults.store_retry.base_delay.as_millis() as u64,
        )?;

        Ok(Self {
            database_url: var("DATABASE_URL"),
            bind_addr: parse_or(&var, "BIND_ADDR", defaults.bind_addr)?,
            log_format,
            rnc_source_path: var("RNC_SOURCE_PATH").map(PathBuf::from),
            sync_batch_size,
            search_case_sensitive: parse_bool_or(
                &var,
                "REGISTRY_SEARCH_CASE_SENSITIVE",
                defaults.search_case_sensitive,
            )?,
            low_sequence_threshold: parse_or(
                &var,
                "NCF_LOW_SEQUENCE_THRESHOLD",
                defaults.low_sequence_threshold,
            )?,
            expiry_warning_days: parse_or(
                &var,
                "NCF_EXPIRY_WARNING_DAYS",
                defaults.expiry_warning_days,
            )?,
            store_retry: RetryPolicy::exponential(max_attempts, Duration::from_millis(base_ms)),
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_rnc_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.rnc_source_path = Some(path.into());
        self
    }

    pub fn with_sync_batch_size(mut self, size: usize) -> Self {
        self.sync_batch_size = size.max(1);
        self
    }

    pub fn with_search_case_sensitive(mut self, yes: bool) -> Self {
        self.search_case_sensitive = yes;
        self
    }

    pub fn with_low_sequence_threshold(mut self, threshold: u64) -> Self {
        self.low_sequence_threshold = threshold;
        self
    }

    pub fn with_expiry_warning_days(mut self, days: i64) -> Self {
        self.expiry_warning_days = days;
        self
    }

    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }
}

fn invalid(key: &str, value: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| invalid(key, &raw, e.to_string())),
        None => Ok(default),
    }
}

fn parse_bool_or<V>(var: &V, key: &str, default: bool) -> Result<bool, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &raw, "expected true or false")),
        },
        None => Ok(default),
    }
}
