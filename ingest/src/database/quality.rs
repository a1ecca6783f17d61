use crate::models::{date_epoch, QualityMetric, Severity};
use crate::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;

pub trait FromRow: Sized {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self>;
}

impl FromRow for QualityMetric {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self> {
        Ok(QualityMetric {
            id: row.try_get::<Option<i64>, _>("id")?,
            job_id: row.try_get::<Option<i32>, _>("job_id")?,
            instrument_id: row.try_get::<i32, _>("instrument_id")?,
            metric_date: row.try_get::<NaiveDate, _>("metric_date")?,
            metric_name: row.try_get::<String, _>("metric_name")?,
            metric_value: row.try_get::<Option<BigDecimal>, _>("metric_value")?,
            threshold_min: row.try_get::<Option<BigDecimal>, _>("threshold_min")?,
            threshold_max: row.try_get::<Option<BigDecimal>, _>("threshold_max")?,
            is_valid: row.try_get::<bool, _>("is_valid")?,
            severity: Severity::from_str(row.try_get::<&str, _>("severity")?)?,
            description: row.try_get::<Option<String>, _>("description")?,
        })
    }
}

#[async_trait]
pub trait QualityQueries: Sized {
    async fn upsert(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()>;
    async fn list_for_instrument(pool: &PgPool, instrument_id: i32) -> Result<Vec<Self>>;
}

#[async_trait]
impl QualityQueries for QualityMetric {
    /// Keyed on (instrument_id, metric_date, metric_name) so a rerun
    /// overwrites its previous verdict instead of duplicating it.
    async fn upsert(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        let now = Utc::now();

        let _ = sqlx::query(
            r#"
            INSERT INTO quality_metrics (job_id, instrument_id, metric_date, metric_date_epoch,
                                         metric_name, metric_value, threshold_min, threshold_max,
                                         is_valid, severity, description,
                                         created_at, created_at_epoch, updated_at, updated_at_epoch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $12, $13)
            ON CONFLICT (instrument_id, metric_date, metric_name)
            DO UPDATE SET
                job_id = EXCLUDED.job_id,
                metric_value = EXCLUDED.metric_value,
                threshold_min = EXCLUDED.threshold_min,
                threshold_max = EXCLUDED.threshold_max,
                is_valid = EXCLUDED.is_valid,
                severity = EXCLUDED.severity,
                description = EXCLUDED.description,
                updated_at = EXCLUDED.updated_at,
                updated_at_epoch = EXCLUDED.updated_at_epoch
            "#,
        )
        .bind(self.job_id)
        .bind(self.instrument_id)
        .bind(self.metric_date)
        .bind(date_epoch(self.metric_date))
        .bind(&self.metric_name)
        .bind(&self.metric_value)
        .bind(&self.threshold_min)
        .bind(&self.threshold_max)
        .bind(self.is_valid)
        .bind(self.severity.as_str())
        .bind(&self.description)
        .bind(now)
        .bind(now.timestamp())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn list_for_instrument(pool: &PgPool, instrument_id: i32) -> Result<Vec<QualityMetric>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM quality_metrics
            WHERE instrument_id = $1
            ORDER BY metric_date, metric_name
            "#,
        )
        .bind(instrument_id)
        .fetch_all(pool)
        .await?;

        let mut metrics = Vec::new();
        for row in &rows {
            metrics.push(QualityMetric::from_row(row)?);
        }

        Ok(metrics)
    }
}

/// Violation counts per severity for one job, surfaced in the job summary.
pub async fn violation_counts(
    tx: &mut Transaction<'_, Postgres>,
    job_id: i32,
) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT severity, COUNT(*)::BIGINT AS violations
        FROM quality_metrics
        WHERE job_id = $1 AND is_valid = false
        GROUP BY severity
        ORDER BY severity
        "#,
    )
    .bind(job_id)
    .fetch_all(&mut **tx)
    .await?;

    let mut counts = Vec::new();
    for row in &rows {
        counts.push((
            row.try_get::<String, _>("severity")?,
            row.try_get::<i64, _>("violations")?,
        ));
    }

    Ok(counts)
}
