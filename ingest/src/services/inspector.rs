use crate::config::Settings;
use crate::database::prices::{price_summary, PriceSummary};
use crate::models::InstrumentState;
use crate::Result;
use chrono::NaiveDate;
use sqlx::PgPool;

/// Classify an instrument's stored history relative to the run's reference
/// date. Pure read; never mutates, safe to call repeatedly and concurrently.
pub async fn classify(
    pool: &PgPool,
    instrument_id: i32,
    as_of: NaiveDate,
    settings: &Settings,
) -> Result<InstrumentState> {
    let summary = price_summary(pool, instrument_id).await?;
    Ok(classify_summary(&summary, as_of, settings))
}

pub fn classify_summary(
    summary: &PriceSummary,
    as_of: NaiveDate,
    settings: &Settings,
) -> InstrumentState {
    if summary.row_count == 0 {
        return InstrumentState::Empty;
    }
    if summary.row_count < settings.sparse_min_rows {
        return InstrumentState::Sparse;
    }

    match summary.latest_trading_date {
        Some(latest) if (as_of - latest).num_days() > settings.freshness_days => {
            InstrumentState::Stale
        }
        _ => InstrumentState::Current,
    }
}
