use crate::models::{date_epoch, Job, JobDetail, JobStatus, Operation};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use instrument::symbols::InstrumentType;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use tracing::info;

pub trait FromRow: Sized {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self>;
}

impl FromRow for Job {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self> {
        let target_instrument_type = row
            .try_get::<Option<String>, _>("target_instrument_type")?
            .map(|t| InstrumentType::from_str(&t))
            .transpose()?;

        Ok(Job {
            id: row.try_get::<Option<i32>, _>("id")?,
            job_name: row.try_get::<String, _>("job_name")?,
            job_type: row.try_get::<String, _>("job_type")?,
            target_instrument_type,
            status: JobStatus::from_str(row.try_get::<&str, _>("status")?)?,
            started_at: row.try_get::<Option<DateTime<Utc>>, _>("started_at")?,
            completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at")?,
            duration_seconds: row.try_get::<Option<i64>, _>("duration_seconds")?,
            records_processed: row.try_get::<i64, _>("records_processed")?,
            records_inserted: row.try_get::<i64, _>("records_inserted")?,
            records_updated: row.try_get::<i64, _>("records_updated")?,
            records_failed: row.try_get::<i64, _>("records_failed")?,
            error_message: row.try_get::<Option<String>, _>("error_message")?,
            retry_count: row.try_get::<i32, _>("retry_count")?,
            max_retries: row.try_get::<i32, _>("max_retries")?,
            metadata: row.try_get::<Option<serde_json::Value>, _>("metadata")?,
        })
    }
}

impl FromRow for JobDetail {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self> {
        Ok(JobDetail {
            id: row.try_get::<Option<i64>, _>("id")?,
            job_id: row.try_get::<i32, _>("job_id")?,
            instrument_id: row.try_get::<Option<i32>, _>("instrument_id")?,
            symbol: row.try_get::<String, _>("symbol")?,
            operation: Operation::from_str(row.try_get::<&str, _>("operation")?)?,
            date_processed: row.try_get::<NaiveDate, _>("date_processed")?,
            records_count: row.try_get::<i64, _>("records_count")?,
            processing_time_ms: row.try_get::<Option<i64>, _>("processing_time_ms")?,
            error_details: row.try_get::<Option<String>, _>("error_details")?,
        })
    }
}

#[async_trait]
pub trait JobQueries: Sized {
    async fn create(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i32>;
    async fn read_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>>;
}

#[async_trait]
impl JobQueries for Job {
    async fn create(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i32> {
        info!("Creating job record: {}", self.job_name);
        let now = Utc::now();

        let job_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO etl_jobs (job_name, job_type, target_instrument_type, status,
                                  records_processed, records_inserted, records_updated, records_failed,
                                  retry_count, max_retries, metadata,
                                  created_at, created_at_epoch, updated_at, updated_at_epoch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $12, $13)
            RETURNING id
            "#,
        )
        .bind(&self.job_name)
        .bind(&self.job_type)
        .bind(self.target_instrument_type.map(|t| t.as_str()))
        .bind(self.status.as_str())
        .bind(self.records_processed)
        .bind(self.records_inserted)
        .bind(self.records_updated)
        .bind(self.records_failed)
        .bind(self.retry_count)
        .bind(self.max_retries)
        .bind(&self.metadata)
        .bind(now)
        .bind(now.timestamp())
        .fetch_one(&mut **tx)
        .await?;

        info!("Successfully created job with id: {}", job_id);
        Ok(job_id)
    }

    async fn read_by_id(pool: &PgPool, id: i32) -> Result<Option<Job>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM etl_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Job::from_row(&row)?)),
            None => Ok(None),
        }
    }
}

/// Current status, read inside the caller's transaction with a row lock so
/// transition checks cannot race.
pub async fn read_status_for_update(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
) -> Result<JobStatus> {
    let status: String = sqlx::query_scalar(
        r#"
        SELECT status FROM etl_jobs
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(JobStatus::from_str(&status)?)
}

pub async fn read_status(pool: &PgPool, id: i32) -> Result<JobStatus> {
    let status: String = sqlx::query_scalar(
        r#"
        SELECT status FROM etl_jobs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    Ok(JobStatus::from_str(&status)?)
}

pub async fn update_status(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
    status: JobStatus,
    started_at: Option<DateTime<Utc>>,
    error_message: Option<&str>,
) -> Result<()> {
    let now = Utc::now();

    let _ = sqlx::query(
        r#"
        UPDATE etl_jobs
        SET status = $1,
            started_at = COALESCE($2, started_at),
            started_at_epoch = COALESCE($3, started_at_epoch),
            error_message = COALESCE($4, error_message),
            updated_at = $5,
            updated_at_epoch = $6
        WHERE id = $7
        "#,
    )
    .bind(status.as_str())
    .bind(started_at)
    .bind(started_at.map(|t| t.timestamp()))
    .bind(error_message)
    .bind(now)
    .bind(now.timestamp())
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn increment_retry_count(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<()> {
    let _ = sqlx::query(
        r#"
        UPDATE etl_jobs
        SET retry_count = retry_count + 1
        WHERE id = $1
        "#,
    )
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Terminal write: status, completion timestamps, duration and the counts
/// aggregated from the detail rows.
#[allow(clippy::too_many_arguments)]
pub async fn finalize_job(
    tx: &mut Transaction<'_, Postgres>,
    id: i32,
    status: JobStatus,
    completed_at: DateTime<Utc>,
    duration_seconds: Option<i64>,
    aggregates: &JobAggregates,
    error_message: Option<&str>,
) -> Result<()> {
    let now = Utc::now();

    let _ = sqlx::query(
        r#"
        UPDATE etl_jobs
        SET status = $1,
            completed_at = $2,
            completed_at_epoch = $3,
            duration_seconds = $4,
            records_processed = $5,
            records_inserted = $6,
            records_updated = $7,
            records_failed = $8,
            error_message = COALESCE($9, error_message),
            updated_at = $10,
            updated_at_epoch = $11
        WHERE id = $12
        "#,
    )
    .bind(status.as_str())
    .bind(completed_at)
    .bind(completed_at.timestamp())
    .bind(duration_seconds)
    .bind(aggregates.processed)
    .bind(aggregates.inserted)
    .bind(aggregates.updated)
    .bind(aggregates.failed)
    .bind(error_message)
    .bind(now)
    .bind(now.timestamp())
    .bind(id)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[async_trait]
pub trait JobDetailQueries: Sized {
    async fn create(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()>;
    async fn list(pool: &PgPool, job_id: i32) -> Result<Vec<Self>>;
}

#[async_trait]
impl JobDetailQueries for JobDetail {
    async fn create(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        let now = Utc::now();

        let _ = sqlx::query(
            r#"
            INSERT INTO etl_job_details (job_id, instrument_id, symbol, operation,
                                         date_processed, date_processed_epoch, records_count,
                                         processing_time_ms, error_details,
                                         created_at, created_at_epoch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(self.job_id)
        .bind(self.instrument_id)
        .bind(&self.symbol)
        .bind(self.operation.as_str())
        .bind(self.date_processed)
        .bind(date_epoch(self.date_processed))
        .bind(self.records_count)
        .bind(self.processing_time_ms)
        .bind(&self.error_details)
        .bind(now)
        .bind(now.timestamp())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn list(pool: &PgPool, job_id: i32) -> Result<Vec<JobDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM etl_job_details
            WHERE job_id = $1
            ORDER BY id
            "#,
        )
        .bind(job_id)
        .fetch_all(pool)
        .await?;

        let mut details = Vec::new();
        for row in &rows {
            details.push(JobDetail::from_row(row)?);
        }

        Ok(details)
    }
}

/// Counts rolled up from the detail rows; the job row is a cache of these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobAggregates {
    pub processed: i64,
    pub inserted: i64,
    pub updated: i64,
    pub failed: i64,
    pub succeeded_operations: i64,
}

pub async fn aggregate_details(
    tx: &mut Transaction<'_, Postgres>,
    job_id: i32,
) -> Result<JobAggregates> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(SUM(records_count), 0)::BIGINT AS processed,
            COALESCE(SUM(records_count) FILTER (WHERE operation = 'insert'), 0)::BIGINT AS inserted,
            COALESCE(SUM(records_count) FILTER (WHERE operation = 'update'), 0)::BIGINT AS updated,
            COALESCE(SUM(records_count) FILTER (WHERE operation = 'error'), 0)::BIGINT AS failed,
            COALESCE(COUNT(*) FILTER (WHERE operation != 'error'), 0)::BIGINT AS succeeded_operations
        FROM etl_job_details
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(JobAggregates {
        processed: row.try_get::<i64, _>("processed")?,
        inserted: row.try_get::<i64, _>("inserted")?,
        updated: row.try_get::<i64, _>("updated")?,
        failed: row.try_get::<i64, _>("failed")?,
        succeeded_operations: row.try_get::<i64, _>("succeeded_operations")?,
    })
}
