use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AppendOutcome, DocumentId, LedgerEntry, NewSeries, Result, Series, SeriesId, StoreError,
    store::SeriesStore,
};

const UNIQUE_SERIES_NAME: &str = "unique_series_name";
const UNIQUE_SERIES_VALUE: &str = "unique_series_value";
const FK_LEDGER_SERIES: &str = "fk_ledger_series";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// PostgreSQL-backed series store implementation.
///
/// `atomic_increment` is a single `UPDATE ... RETURNING`, so the row lock
/// taken by Postgres serializes increments across every process sharing the
/// database. `increment_and_record` runs both writes in one transaction.
#[derive(Clone)]
pub struct PostgresSeriesStore {
    pool: PgPool,
}

impl PostgresSeriesStore {
    /// Creates a new PostgreSQL series store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            document_id: DocumentId::new(row.try_get::<String, _>("doc_id")?),
            value: row.try_get("value")?,
            assigned_at: row.try_get::<DateTime<Utc>, _>("assigned_at")?,
        })
    }

    fn row_to_series(row: PgRow, ledger: Vec<LedgerEntry>) -> Result<Series> {
        Ok(Series {
            id: SeriesId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            doc_type: row.try_get("doc_type")?,
            last_value: row.try_get("last_value")?,
            ledger,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        })
    }

    async fn load_ledger(&self, series_id: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT doc_id, value, assigned_at
            FROM series_ledger
            WHERE series_id = $1
            ORDER BY value ASC
            "#,
        )
        .bind(series_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    fn map_increment_error(e: sqlx::Error, series_id: SeriesId) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e
            && db_err.code().as_deref() == Some(NUMERIC_VALUE_OUT_OF_RANGE)
        {
            return StoreError::SeriesExhausted(series_id.to_string());
        }
        StoreError::Database(e)
    }

    fn map_ledger_error(e: sqlx::Error, series_id: SeriesId, value: i64) -> StoreError {
        if let sqlx::Error::Database(ref db_err) = e {
            match db_err.constraint() {
                Some(UNIQUE_SERIES_VALUE) => {
                    return StoreError::ValueAlreadyClaimed {
                        series: series_id.to_string(),
                        value,
                    };
                }
                Some(FK_LEDGER_SERIES) => {
                    return StoreError::SeriesNotFound(series_id.to_string());
                }
                _ => {}
            }
        }
        StoreError::Database(e)
    }
}

#[async_trait]
impl SeriesStore for PostgresSeriesStore {
    async fn create_series(&self, new_series: NewSeries) -> Result<Series> {
        let name = new_series.name.clone();
        let series = new_series.into_series();

        let row = sqlx::query(
            r#"
            INSERT INTO series (id, name, doc_type, last_value, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, name, doc_type, last_value, created_at
            "#,
        )
        .bind(series.id.as_uuid())
        .bind(&series.name)
        .bind(&series.doc_type)
        .bind(series.last_value)
        .bind(series.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(UNIQUE_SERIES_NAME)
            {
                return StoreError::SeriesAlreadyExists(name.clone());
            }
            StoreError::Database(e)
        })?;

        tracing::info!(
            series_id = %series.id,
            name = %series.name,
            baseline = series.last_value,
            "series seeded"
        );
        Self::row_to_series(row, Vec::new())
    }

    async fn find_series(&self, name: &str) -> Result<Series> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, doc_type, last_value, created_at
            FROM series
            WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| StoreError::SeriesNotFound(name.to_string()))?;
        let ledger = self.load_ledger(row.try_get::<Uuid, _>("id")?).await?;
        Self::row_to_series(row, ledger)
    }

    async fn get_series(&self, series_id: SeriesId) -> Result<Series> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, name, doc_type, last_value, created_at
            FROM series
            WHERE id = $1
            "#,
        )
        .bind(series_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))?;
        let ledger = self.load_ledger(series_id.as_uuid()).await?;
        Self::row_to_series(row, ledger)
    }

    async fn find_ledger_entry(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<Option<LedgerEntry>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT doc_id, value, assigned_at
            FROM series_ledger
            WHERE series_id = $1 AND doc_id = $2
            "#,
        )
        .bind(series_id.as_uuid())
        .bind(document_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn atomic_increment(&self, series_id: SeriesId) -> Result<i64> {
        let value: Option<i64> = sqlx::query_scalar(
            "UPDATE series SET last_value = last_value + 1 WHERE id = $1 RETURNING last_value",
        )
        .bind(series_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_increment_error(e, series_id))?;

        value.ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))
    }

    async fn append_ledger_entry(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
        value: i64,
    ) -> Result<AppendOutcome> {
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO series_ledger (series_id, doc_id, value, assigned_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (series_id, doc_id) DO NOTHING
            RETURNING value
            "#,
        )
        .bind(series_id.as_uuid())
        .bind(document_id.as_str())
        .bind(value)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_ledger_error(e, series_id, value))?;

        if let Some(value) = inserted {
            return Ok(AppendOutcome::Recorded(value));
        }

        let existing = self
            .find_ledger_entry(series_id, document_id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        Ok(AppendOutcome::AlreadyPresent(existing.value))
    }

    async fn increment_and_record(
        &self,
        series_id: SeriesId,
        document_id: &DocumentId,
    ) -> Result<AppendOutcome> {
        let mut tx = self.pool.begin().await?;

        let value: i64 = sqlx::query_scalar(
            "UPDATE series SET last_value = last_value + 1 WHERE id = $1 RETURNING last_value",
        )
        .bind(series_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Self::map_increment_error(e, series_id))?
        .ok_or_else(|| StoreError::SeriesNotFound(series_id.to_string()))?;

        // Blocks on a concurrent uncommitted insert for the same document,
        // then either inserts or skips once that transaction resolves.
        let inserted: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO series_ledger (series_id, doc_id, value, assigned_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (series_id, doc_id) DO NOTHING
            RETURNING value
            "#,
        )
        .bind(series_id.as_uuid())
        .bind(document_id.as_str())
        .bind(value)
        .bind(Utc::now())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| Self::map_ledger_error(e, series_id, value))?;

        match inserted {
            Some(value) => {
                tx.commit().await?;
                Ok(AppendOutcome::Recorded(value))
            }
            None => {
                // The document won elsewhere; give the number back.
                tx.rollback().await?;
                let existing = self
                    .find_ledger_entry(series_id, document_id)
                    .await?
                    .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
                Ok(AppendOutcome::AlreadyPresent(existing.value))
            }
        }
    }
}
