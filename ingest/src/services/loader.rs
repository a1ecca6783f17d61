use super::utils::start_transaction;
use super::validator::validate;
use crate::database::jobs::JobDetailQueries;
use crate::database::prices::PriceQueries;
use crate::database::quality::QualityQueries;
use crate::models::{JobDetail, LoadOutcome, Operation, PriceRecord, QualityMetric};
use crate::Result;
use sqlx::PgPool;
use std::time::Instant;
use tracing::info;
use vendors::stooq::StooqRecord;

/// Commit one instrument's rows inside one transaction: upsert keyed on
/// (instrument_id, trading_date), one detail row per row processed, quality
/// metrics for every violation. An error propagates after the transaction
/// drops, so nothing of a failed instrument survives; the caller records the
/// failure and moves on.
pub async fn load(
    pool: &PgPool,
    job_id: i32,
    instrument_id: i32,
    symbol: &str,
    rows: &[StooqRecord],
) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();
    let mut tx = start_transaction(pool).await?;

    for row in rows {
        let row_start = Instant::now();
        let validation = validate(row);

        let record = PriceRecord::from_stooq(instrument_id, row);
        let operation = record.upsert(&mut tx).await?;

        outcome.processed += 1;
        match operation {
            Operation::Insert => outcome.inserted += 1,
            Operation::Update => outcome.updated += 1,
            _ => {}
        }

        let detail = JobDetail {
            id: None,
            job_id,
            instrument_id: Some(instrument_id),
            symbol: symbol.to_string(),
            operation,
            date_processed: row.trading_date,
            records_count: 1,
            processing_time_ms: Some(row_start.elapsed().as_millis() as i64),
            error_details: None,
        };
        detail.create(&mut tx).await?;

        for violation in &validation.violations {
            let metric = QualityMetric {
                id: None,
                job_id: Some(job_id),
                instrument_id,
                metric_date: row.trading_date,
                metric_name: violation.metric_name.to_string(),
                metric_value: None,
                threshold_min: None,
                threshold_max: None,
                is_valid: false,
                severity: violation.severity,
                description: Some(violation.description.clone()),
            };
            metric.upsert(&mut tx).await?;
        }
    }

    tx.commit().await?;

    info!(
        "Committed {} rows for {} ({} inserted, {} updated)",
        outcome.processed, symbol, outcome.inserted, outcome.updated
    );

    Ok(outcome)
}
