//! Shared Postgres plumbing: pool setup, schema bootstrap, error mapping.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (serialization failure) | `40001` | `Transient` |
//! | Database (deadlock detected) | `40P01` | `Transient` |
//! | Database (other) | Any other | `Unavailable` |
//! | Io / PoolTimedOut / PoolClosed | N/A | `Transient` |
//! | Other | N/A | `Unavailable` |

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::store::StoreError;

/// Open a connection pool.
pub async fn connect(database_url: &str) -> Result<PgPool, StoreError> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|e| map_sqlx_error("connect", e))
}

/// Create the compliance tables if they do not exist yet.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ncf_sequences (
            doc_type        TEXT PRIMARY KEY,
            current_number  BIGINT NOT NULL DEFAULT 0 CHECK (current_number >= 0),
            max_number      BIGINT NULL CHECK (max_number IS NULL OR max_number > 0),
            expiry_date     DATE NOT NULL,
            is_active       BOOLEAN NOT NULL DEFAULT TRUE,
            updated_at      TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("ensure_schema", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registry_records (
            taxpayer_id        TEXT PRIMARY KEY,
            legal_name         TEXT NOT NULL,
            business_name      TEXT NULL,
            business_type      TEXT NULL,
            economic_activity  TEXT NULL,
            status             TEXT NOT NULL,
            payment_regime     TEXT NULL,
            address            TEXT NULL,
            province           TEXT NULL,
            phone              TEXT NULL,
            email              TEXT NULL,
            updated_at         TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("ensure_schema", e))?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS registry_records_name_idx
            ON registry_records (legal_name, taxpayer_id)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("ensure_schema", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_status (
            domain        TEXT PRIMARY KEY,
            status        TEXT NOT NULL CHECK (status IN ('IDLE', 'RUNNING', 'COMPLETED', 'FAILED')),
            progress      SMALLINT NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
            processed     BIGINT NOT NULL DEFAULT 0,
            total         BIGINT NULL,
            message       TEXT NOT NULL DEFAULT '',
            started_at    TIMESTAMPTZ NULL,
            completed_at  TIMESTAMPTZ NULL,
            run_id        UUID NULL,
            cancelled     BOOLEAN NOT NULL DEFAULT FALSE
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("ensure_schema", e))?;

    Ok(())
}

/// Map SQLx errors to store errors, separating retryable failures.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => StoreError::Transient(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::Io(e) => StoreError::Transient(format!("io error in {operation}: {e}")),
        sqlx::Error::PoolTimedOut => {
            StoreError::Transient(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            StoreError::Transient(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Unavailable(format!("sqlx error in {operation}: {err}")),
    }
}

/// Counters are `u64` in the domain and `BIGINT` in the table.
pub(crate) fn to_db_int(operation: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::Unavailable(format!("{operation}: {value} does not fit in BIGINT")))
}

pub(crate) fn from_db_int(operation: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::Unavailable(format!("{operation}: negative counter {value}")))
}
