//! Postgres-backed registry mirror.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;

use async_trait::async_trait;
use fiscalpos_registry::{RegistryRecord, TaxpayerStatus};

use super::{effective_limit, RegistryStore};
use crate::postgres::{from_db_int, map_sqlx_error};
use crate::store::{RetryPolicy, StoreResult};

const COLUMNS: &str = "taxpayer_id, legal_name, business_name, business_type, economic_activity, \
                       status, payment_regime, address, province, phone, email, updated_at";

#[derive(Debug, Clone)]
pub struct PostgresRegistryStore {
    pool: PgPool,
    retry: RetryPolicy,
    case_sensitive: bool,
}

struct RecordRow(RegistryRecord);

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for RecordRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(Self(RegistryRecord {
            taxpayer_id: row.try_get("taxpayer_id")?,
            legal_name: row.try_get("legal_name")?,
            business_name: row.try_get("business_name")?,
            business_type: row.try_get("business_type")?,
            economic_activity: row.try_get("economic_activity")?,
            status: TaxpayerStatus::from_label(&status),
            payment_regime: row.try_get("payment_regime")?,
            address: row.try_get("address")?,
            province: row.try_get("province")?,
            phone: row.try_get("phone")?,
            email: row.try_get("email")?,
            updated_at,
        }))
    }
}

impl PostgresRegistryStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self {
            pool,
            retry,
            case_sensitive: false,
        }
    }

    pub fn with_case_sensitive_search(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }
}

/// `LIKE` pattern matching `query` literally anywhere in the value.
fn contains_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Ordered by byte value (`COLLATE "C"`), the same order the in-memory
/// store uses, whatever the database's default collation is.
fn search_sql(case_sensitive: bool) -> String {
    let op = if case_sensitive { "LIKE" } else { "ILIKE" };
    format!(
        r#"
        SELECT {COLUMNS} FROM registry_records
        WHERE taxpayer_id {op} $1
           OR legal_name {op} $1
           OR business_name {op} $1
        ORDER BY legal_name COLLATE "C" ASC, taxpayer_id COLLATE "C" ASC
        LIMIT $2
        "#
    )
}

#[async_trait]
impl RegistryStore for PostgresRegistryStore {
    #[instrument(skip(self, record), fields(taxpayer_id = %record.taxpayer_id), err)]
    async fn upsert(&self, record: &RegistryRecord) -> StoreResult<()> {
        self.retry
            .run("upsert_record", move || async move {
                sqlx::query(
                    r#"
                    INSERT INTO registry_records (
                        taxpayer_id, legal_name, business_name, business_type, economic_activity,
                        status, payment_regime, address, province, phone, email, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    ON CONFLICT (taxpayer_id) DO UPDATE SET
                        legal_name = EXCLUDED.legal_name,
                        business_name = EXCLUDED.business_name,
                        business_type = EXCLUDED.business_type,
                        economic_activity = EXCLUDED.economic_activity,
                        status = EXCLUDED.status,
                        payment_regime = EXCLUDED.payment_regime,
                        address = EXCLUDED.address,
                        province = EXCLUDED.province,
                        phone = EXCLUDED.phone,
                        email = EXCLUDED.email,
                        updated_at = EXCLUDED.updated_at
                    "#,
                )
                .bind(&record.taxpayer_id)
                .bind(&record.legal_name)
                .bind(&record.business_name)
                .bind(&record.business_type)
                .bind(&record.economic_activity)
                .bind(record.status.as_label())
                .bind(&record.payment_regime)
                .bind(&record.address)
                .bind(&record.province)
                .bind(&record.phone)
                .bind(&record.email)
                .bind(record.updated_at)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("upsert_record", e))?;
                Ok(())
            })
            .await
    }

    #[instrument(skip(self), err)]
    async fn find_by_id(&self, taxpayer_id: &str) -> StoreResult<Option<RegistryRecord>> {
        self.retry
            .run("find_record", move || async move {
                let row: Option<RecordRow> = sqlx::query_as(&format!(
                    "SELECT {COLUMNS} FROM registry_records WHERE taxpayer_id = $1"
                ))
                .bind(taxpayer_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("find_record", e))?;
                Ok(row.map(|r| r.0))
            })
            .await
    }

    #[instrument(skip(self), err)]
    async fn search(&self, query: &str, limit: usize) -> StoreResult<Vec<RegistryRecord>> {
        let pattern = contains_pattern(query);
        let sql = search_sql(self.case_sensitive);
        let limit = effective_limit(limit) as i64;
        let (sql, pattern) = (&sql, &pattern);

        self.retry
            .run("search_records", move || async move {
                let rows: Vec<RecordRow> = sqlx::query_as(sql)
                    .bind(pattern)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("search_records", e))?;
                Ok(rows.into_iter().map(|r| r.0).collect())
            })
            .await
    }

    #[instrument(skip(self), err)]
    async fn count(&self) -> StoreResult<u64> {
        self.retry
            .run("count_records", move || async move {
                let row = sqlx::query("SELECT COUNT(*) AS total FROM registry_records")
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error("count_records", e))?;
                let total: i64 = row
                    .try_get("total")
                    .map_err(|e| map_sqlx_error("count_records", e))?;
                from_db_int("count_records", total)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_metacharacters_are_escaped() {
        assert_eq!(contains_pattern("abc"), "%abc%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern(""), "%%");
    }

    #[test]
    fn search_orders_by_byte_value() {
        for case_sensitive in [false, true] {
            let sql = search_sql(case_sensitive);
            assert!(sql.contains(r#"ORDER BY legal_name COLLATE "C" ASC, taxpayer_id COLLATE "C" ASC"#));
        }
        assert!(search_sql(false).contains("legal_name ILIKE $1"));
        assert!(search_sql(true).contains("legal_name LIKE $1"));
    }
}
