use super::inspector::classify;
use super::loader;
use super::resolver::resolve;
use super::tracker::JobTracker;
use super::utils::start_transaction;
use crate::calendar;
use crate::config::{RunConfig, Settings};
use crate::database::jobs::{JobDetailQueries, JobQueries};
use crate::models::{ExtractionMode, Job, JobDetail, LoadOutcome, Operation};
use crate::response::ApiResponse;
use crate::{Error, Result};
use async_trait::async_trait;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{NaiveDate, Utc};
use instrument::database::symbols::{ensure_instrument, list_active_instruments};
use instrument::symbols::InstrumentType;
use serde_json::json;
use sqlx::PgPool;
use std::collections::BTreeSet;
use tracing::{error, info, warn};
use vendors::stooq::{FetchRange, StooqClient, StooqRecord};

/// Narrow contract the core consumes; retry and rate limiting live behind
/// it, so the loader only ever sees clean rows or a typed failure.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(
        &self,
        symbol: &str,
        mode: ExtractionMode,
        as_of: NaiveDate,
    ) -> vendors::Result<Vec<StooqRecord>>;
}

pub struct StooqSource {
    client: StooqClient,
    historical_window_days: u32,
}

impl StooqSource {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = StooqClient::new(
            &settings.stooq_base_url,
            settings.fetch_delay,
            settings.fetch_timeout,
            settings.fetch_max_retries,
        )?;

        Ok(StooqSource {
            client,
            historical_window_days: settings.historical_window_days,
        })
    }
}

#[async_trait]
impl MarketDataSource for StooqSource {
    async fn fetch(
        &self,
        symbol: &str,
        mode: ExtractionMode,
        as_of: NaiveDate,
    ) -> vendors::Result<Vec<StooqRecord>> {
        let range = match mode {
            ExtractionMode::Incremental => FetchRange::Latest,
            ExtractionMode::Historical => FetchRange::LastDays(self.historical_window_days),
            ExtractionMode::FullBackfill => FetchRange::Full,
        };

        self.client.fetch_daily(symbol, range, as_of).await
    }
}

fn derive_job_type(run_config: &RunConfig) -> &'static str {
    if run_config.is_backfill_context
        || matches!(
            run_config.extraction_mode,
            Some(ExtractionMode::Historical | ExtractionMode::FullBackfill)
        )
    {
        "historical_backfill"
    } else {
        "daily_incremental"
    }
}

fn is_recoverable(error: &Error) -> bool {
    match error {
        Error::FetchFailed(inner) => inner.is_retryable(),
        Error::SqlError(_) => true,
        _ => false,
    }
}

/// One pipeline invocation. Instrument-scoped errors never escape their
/// instrument; only configuration problems abort before work starts.
pub async fn run_pipeline<S: MarketDataSource>(
    pool: &PgPool,
    source: &S,
    settings: &Settings,
    run_config: &RunConfig,
) -> Result<Job> {
    let as_of = calendar::latest_trading_day_on_or_before(Utc::now().date_naive());

    // Every active registry instrument, plus override-only symbols that have
    // not been onboarded yet.
    let mut targets: Vec<(String, Option<i32>, InstrumentType)> = Vec::new();
    let mut seen = BTreeSet::new();
    for instrument in list_active_instruments(pool).await? {
        if let Some(id) = instrument.instrument_id {
            seen.insert(instrument.symbol.clone());
            targets.push((instrument.symbol, Some(id), instrument.instrument_type));
        }
    }
    for symbol in run_config.instruments.keys() {
        if !seen.contains(symbol) {
            targets.push((symbol.clone(), None, InstrumentType::Stock));
        }
    }

    let job_name = run_config
        .job_name
        .clone()
        .unwrap_or_else(|| format!("stock_etl_{}", as_of.format("%Y%m%d")));
    let metadata = json!({
        "as_of": as_of.to_string(),
        "run_id": run_config.run_id,
        "is_backfill_context": run_config.is_backfill_context,
        "target_count": targets.len(),
    });

    let tracker = JobTracker::start(
        pool,
        &job_name,
        derive_job_type(run_config),
        None,
        Some(metadata),
    )
    .await?;

    info!(
        "Job {} processing {} instruments (as of {})",
        tracker.job_id(),
        targets.len(),
        as_of
    );

    for (symbol, instrument_id, instrument_type) in &targets {
        match tracker.is_cancelled().await {
            Ok(false) => {}
            Ok(true) => {
                warn!(
                    "Job {} cancelled; not starting further instruments",
                    tracker.job_id()
                );
                break;
            }
            Err(e) => {
                error!("Failed to read job status: {:?}", e);
                break;
            }
        }

        process_instrument(
            pool,
            source,
            settings,
            run_config,
            &tracker,
            symbol,
            *instrument_id,
            *instrument_type,
            as_of,
        )
        .await;
    }

    tracker.finish().await
}

/// Fetch-validate-load for one instrument, with one bounded re-attempt after
/// a recoverable error. Failures are converted into a `failed` detail row
/// and never propagate past this boundary.
#[allow(clippy::too_many_arguments)]
async fn process_instrument<S: MarketDataSource>(
    pool: &PgPool,
    source: &S,
    settings: &Settings,
    run_config: &RunConfig,
    tracker: &JobTracker,
    symbol: &str,
    instrument_id: Option<i32>,
    instrument_type: InstrumentType,
    as_of: NaiveDate,
) {
    let instrument_id = match instrument_id {
        Some(id) => id,
        None => match onboard(pool, symbol, instrument_type, settings).await {
            Ok(id) => id,
            Err(e) => {
                error!("Failed to onboard {}: {:?}", symbol, e);
                record_failure(tracker, symbol, None, as_of, 0, &e).await;
                return;
            }
        },
    };

    let state = match classify(pool, instrument_id, as_of, settings).await {
        Ok(state) => Some(state),
        Err(e) => {
            warn!("State inspection failed for {}: {:?}", symbol, e);
            None
        }
    };
    let mode = resolve(symbol, state, run_config);
    info!("Resolved mode {} for {} (state {:?})", mode, symbol, state);

    let mut entered_retry = false;
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        match fetch_and_load(pool, source, tracker, symbol, instrument_id, mode, as_of).await {
            Ok(outcome) => {
                info!(
                    "Instrument {} done: {} processed, {} inserted, {} updated",
                    symbol, outcome.processed, outcome.inserted, outcome.updated
                );
                break;
            }
            Err((e, _)) if attempt == 1 && is_recoverable(&e) => {
                warn!("Recoverable error for {}; retrying once: {:?}", symbol, e);
                entered_retry = tracker.mark_retrying().await.is_ok();
            }
            Err((e, row_count)) => {
                error!("Instrument {} failed: {:?}", symbol, e);
                record_failure(tracker, symbol, Some(instrument_id), as_of, row_count, &e).await;
                break;
            }
        }
    }

    if entered_retry {
        if let Err(e) = tracker.resume().await {
            warn!("Could not resume job after retry: {:?}", e);
        }
    }
}

/// Error carries the row count already fetched, so a persistence failure is
/// attributed to every row it rolled back.
async fn fetch_and_load<S: MarketDataSource>(
    pool: &PgPool,
    source: &S,
    tracker: &JobTracker,
    symbol: &str,
    instrument_id: i32,
    mode: ExtractionMode,
    as_of: NaiveDate,
) -> std::result::Result<LoadOutcome, (Error, i64)> {
    let rows = source
        .fetch(symbol, mode, as_of)
        .await
        .map_err(|e| (Error::FetchFailed(e), 0))?;

    if rows.is_empty() {
        let detail = JobDetail {
            id: None,
            job_id: tracker.job_id(),
            instrument_id: Some(instrument_id),
            symbol: symbol.to_string(),
            operation: Operation::Skip,
            date_processed: as_of,
            records_count: 0,
            processing_time_ms: None,
            error_details: None,
        };
        tracker.record_detail(&detail).await.map_err(|e| (e, 0))?;
        return Ok(LoadOutcome::default());
    }

    let row_count = rows.len() as i64;
    loader::load(pool, tracker.job_id(), instrument_id, symbol, &rows)
        .await
        .map_err(|e| (e, row_count))
}

async fn onboard(
    pool: &PgPool,
    symbol: &str,
    instrument_type: InstrumentType,
    settings: &Settings,
) -> Result<i32> {
    let mut tx = start_transaction(pool).await?;
    let id = ensure_instrument(
        &mut tx,
        symbol,
        instrument_type,
        settings.default_exchange,
        None,
    )
    .await?;
    tx.commit().await?;

    Ok(id)
}

async fn record_failure(
    tracker: &JobTracker,
    symbol: &str,
    instrument_id: Option<i32>,
    as_of: NaiveDate,
    row_count: i64,
    error: &Error,
) {
    let detail = JobDetail {
        id: None,
        job_id: tracker.job_id(),
        instrument_id,
        symbol: symbol.to_string(),
        operation: Operation::Error,
        date_processed: as_of,
        records_count: row_count,
        processing_time_ms: None,
        error_details: Some(error.to_string()),
    };

    if let Err(e) = tracker.record_detail(&detail).await {
        error!("Failed to record failure detail for {}: {:?}", symbol, e);
    }
}

// Service
pub fn pipeline_service() -> Router {
    Router::new()
        .route("/run", post(run_etl))
        .route("/jobs/{id}", get(get_job))
        .route("/jobs/{id}/details", get(get_job_details))
        .route("/jobs/{id}/cancel", post(cancel_job))
}

// Handlers
pub async fn run_etl(
    Extension(pool): Extension<PgPool>,
    Json(payload): Json<serde_json::Value>,
) -> Result<impl IntoResponse> {
    info!("Handling request to run pipeline");

    // A malformed run configuration aborts before any job record exists.
    let run_config = RunConfig::from_value(payload)?;

    let settings = Settings::from_env();
    let source = StooqSource::from_settings(&settings)?;
    let job = run_pipeline(&pool, &source, &settings, &run_config).await?;

    let message = format!(
        "Job {} finished with status {}",
        job.id.unwrap_or(-1),
        job.status
    );
    Ok(ApiResponse::new("success", &message, StatusCode::OK, job))
}

pub async fn get_job(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    info!("Handling request to get job {}", id);

    match Job::read_by_id(&pool, id).await? {
        Some(job) => Ok(ApiResponse::new(
            "success",
            "Successfully retrieved job.",
            StatusCode::OK,
            Some(job),
        )),
        None => Ok(ApiResponse::new(
            "success",
            &format!("No job found with id {}", id),
            StatusCode::NOT_FOUND,
            None,
        )),
    }
}

pub async fn get_job_details(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    info!("Handling request to get details for job {}", id);

    let details = JobDetail::list(&pool, id).await?;
    Ok(ApiResponse::new(
        "success",
        &format!("Retrieved {} details.", details.len()),
        StatusCode::OK,
        details,
    ))
}

pub async fn cancel_job(
    Extension(pool): Extension<PgPool>,
    Path(id): Path<i32>,
) -> Result<impl IntoResponse> {
    info!("Handling request to cancel job {}", id);

    let status = JobTracker::cancel(&pool, id).await?;
    Ok(ApiResponse::new(
        "success",
        &format!("Job {} is {}", id, status),
        StatusCode::OK,
        status,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_derive_job_type() {
        let incremental = RunConfig::default();
        let backfill =
            RunConfig::from_value(json!({ "is_backfill_context": true })).unwrap();
        let historical =
            RunConfig::from_value(json!({ "extraction_mode": "historical" })).unwrap();

        // Validate
        assert_eq!(derive_job_type(&incremental), "daily_incremental");
        assert_eq!(derive_job_type(&backfill), "historical_backfill");
        assert_eq!(derive_job_type(&historical), "historical_backfill");
    }

    #[test]
    fn test_recoverable_errors() {
        // Validate
        assert!(is_recoverable(&Error::FetchFailed(
            vendors::Error::Transient("503".into())
        )));
        assert!(!is_recoverable(&Error::FetchFailed(vendors::Error::NotFound(
            "XYZ".into()
        ))));
        assert!(!is_recoverable(&Error::ConfigurationError("bad".into())));
    }
}
