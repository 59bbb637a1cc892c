//! Postgres-backed sequence store.
//!
//! `reserve_next` is a single conditional `UPDATE ... RETURNING`: the row lock
//! taken by the update serializes concurrent reservations of the same type,
//! and the `WHERE` clause carries every issuance rule, so the counter either
//! advances by exactly one or not at all. When no row comes back the current
//! row is re-read to report which rule refused.

use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use tracing::instrument;

use async_trait::async_trait;
use fiscalpos_fiscal::{validate_ceiling, NcfSequence, NcfType, MAX_ORDINAL};

use super::SequenceStore;
use crate::postgres::{from_db_int, map_sqlx_error, to_db_int};
use crate::store::{RetryPolicy, StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PostgresSequenceStore {
    pool: PgPool,
    retry: RetryPolicy,
}

#[derive(Debug)]
struct SequenceRow {
    doc_type: String,
    current_number: i64,
    max_number: Option<i64>,
    expiry_date: NaiveDate,
    is_active: bool,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for SequenceRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            doc_type: row.try_get("doc_type")?,
            current_number: row.try_get("current_number")?,
            max_number: row.try_get("max_number")?,
            expiry_date: row.try_get("expiry_date")?,
            is_active: row.try_get("is_active")?,
        })
    }
}

impl TryFrom<SequenceRow> for NcfSequence {
    type Error = StoreError;

    fn try_from(row: SequenceRow) -> Result<Self, Self::Error> {
        let doc_type = NcfType::from_code(&row.doc_type).ok_or_else(|| {
            StoreError::Unavailable(format!("unknown doc_type {:?} in ncf_sequences", row.doc_type))
        })?;
        Ok(NcfSequence {
            doc_type,
            current_number: from_db_int("sequence_row", row.current_number)?,
            max_number: row
                .max_number
                .map(|m| from_db_int("sequence_row", m))
                .transpose()?,
            expiry_date: row.expiry_date,
            is_active: row.is_active,
        })
    }
}

const COLUMNS: &str = "doc_type, current_number, max_number, expiry_date, is_active";

impl PostgresSequenceStore {
    pub fn new(pool: PgPool, retry: RetryPolicy) -> Self {
        Self { pool, retry }
    }

    async fn ensure_row(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<()> {
        let fresh = NcfSequence::new(doc_type, today);
        sqlx::query(
            r#"
            INSERT INTO ncf_sequences (doc_type, current_number, max_number, expiry_date, is_active)
            VALUES ($1, 0, NULL, $2, TRUE)
            ON CONFLICT (doc_type) DO NOTHING
            "#,
        )
        .bind(doc_type.code())
        .bind(fresh.expiry_date)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_row", e))?;
        Ok(())
    }

    async fn fetch(&self, doc_type: NcfType) -> StoreResult<NcfSequence> {
        let row: SequenceRow = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM ncf_sequences WHERE doc_type = $1"
        ))
        .bind(doc_type.code())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_sequence", e))?;
        row.try_into()
    }

    async fn reserve_once(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        self.ensure_row(doc_type, today).await?;

        let max_ordinal = to_db_int("reserve_next", MAX_ORDINAL)?;
        let row: Option<SequenceRow> = sqlx::query_as(&format!(
            r#"
            UPDATE ncf_sequences
            SET current_number = current_number + 1, updated_at = now()
            WHERE doc_type = $1
              AND is_active
              AND expiry_date >= $2
              AND current_number < LEAST(COALESCE(max_number, $3), $3)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(doc_type.code())
        .bind(today)
        .bind(max_ordinal)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("reserve_next", e))?;

        if let Some(row) = row {
            return row.try_into();
        }

        // Nothing advanced: classify against the row as it is now.
        let current = self.fetch(doc_type).await?;
        match current.next_ordinal(today) {
            Err(rejection) => Err(StoreError::Rejected(rejection)),
            // An admin change landed between the update and the read.
            Ok(_) => Err(StoreError::Transient(format!(
                "sequence {doc_type} changed during reservation"
            ))),
        }
    }

    async fn update_field(
        &self,
        operation: &str,
        doc_type: NcfType,
        today: NaiveDate,
        assignment: &str,
        bind: FieldValue,
    ) -> StoreResult<NcfSequence> {
        self.ensure_row(doc_type, today).await?;
        let sql = format!(
            "UPDATE ncf_sequences SET {assignment}, updated_at = now() WHERE doc_type = $1 RETURNING {COLUMNS}"
        );
        let query = sqlx::query_as::<_, SequenceRow>(&sql).bind(doc_type.code());
        let query = match bind {
            FieldValue::Bool(v) => query.bind(v),
            FieldValue::Date(v) => query.bind(v),
        };
        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(operation, e))?;
        row.try_into()
    }
}

enum FieldValue {
    Bool(bool),
    Date(NaiveDate),
}

#[async_trait]
impl SequenceStore for PostgresSequenceStore {
    #[instrument(skip(self), fields(doc_type = %doc_type), err)]
    async fn get_or_create(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        self.retry
            .run("get_or_create", move || async move {
                self.ensure_row(doc_type, today).await?;
                self.fetch(doc_type).await
            })
            .await
    }

    #[instrument(skip(self), fields(doc_type = %doc_type), err)]
    async fn reserve_next(&self, doc_type: NcfType, today: NaiveDate) -> StoreResult<NcfSequence> {
        self.retry
            .run("reserve_next", || self.reserve_once(doc_type, today))
            .await
    }

    #[instrument(skip(self), fields(doc_type = %doc_type), err)]
    async fn set_active(
        &self,
        doc_type: NcfType,
        active: bool,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        self.retry
            .run("set_active", || {
                self.update_field("set_active", doc_type, today, "is_active = $2", FieldValue::Bool(active))
            })
            .await
    }

    #[instrument(skip(self), fields(doc_type = %doc_type), err)]
    async fn set_expiry(
        &self,
        doc_type: NcfType,
        expiry_date: NaiveDate,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        self.retry
            .run("set_expiry", || {
                self.update_field(
                    "set_expiry",
                    doc_type,
                    today,
                    "expiry_date = $2",
                    FieldValue::Date(expiry_date),
                )
            })
            .await
    }

    #[instrument(skip(self), fields(doc_type = %doc_type), err)]
    async fn set_max_number(
        &self,
        doc_type: NcfType,
        max_number: Option<u64>,
        today: NaiveDate,
    ) -> StoreResult<NcfSequence> {
        if let Some(max) = max_number {
            // Shape check up front; the issued-count check is repeated in SQL.
            validate_ceiling(doc_type, max, 0)?;
        }
        let db_max = max_number.map(|m| to_db_int("set_max_number", m)).transpose()?;

        self.retry
            .run("set_max_number", move || async move {
                self.ensure_row(doc_type, today).await?;
                let row: Option<SequenceRow> = sqlx::query_as(&format!(
                    r#"
                    UPDATE ncf_sequences
                    SET max_number = $2, updated_at = now()
                    WHERE doc_type = $1 AND ($2::BIGINT IS NULL OR $2 >= current_number)
                    RETURNING {COLUMNS}
                    "#
                ))
                .bind(doc_type.code())
                .bind(db_max)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("set_max_number", e))?;

                match row {
                    Some(row) => row.try_into(),
                    None => {
                        let current = self.fetch(doc_type).await?;
                        let max = max_number.unwrap_or(MAX_ORDINAL);
                        validate_ceiling(doc_type, max, current.current_number)?;
                        Err(StoreError::Transient(format!(
                            "sequence {doc_type} changed while setting its ceiling"
                        )))
                    }
                }
            })
            .await
    }

    #[instrument(skip(self), err)]
    async fn list(&self) -> StoreResult<Vec<NcfSequence>> {
        self.retry
            .run("list_sequences", move || async move {
                let rows: Vec<SequenceRow> = sqlx::query_as(&format!(
                    "SELECT {COLUMNS} FROM ncf_sequences"
                ))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("list_sequences", e))?;

                let mut sequences = rows
                    .into_iter()
                    .map(NcfSequence::try_from)
                    .collect::<StoreResult<Vec<_>>>()?;
                sequences.sort_by_key(|s| s.doc_type);
                Ok(sequences)
            })
            .await
    }
}
