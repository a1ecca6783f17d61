use crate::models::ExtractionMode;
use crate::{Error, Result};
use instrument::symbols::Exchange;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// Orchestrator-supplied run configuration, the JSON body of
/// `POST /pipeline/run`. Absence of all fields means full automatic
/// (state-driven) mode resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub extraction_mode: Option<ExtractionMode>,
    #[serde(default)]
    pub instruments: HashMap<String, ExtractionMode>,
    #[serde(default)]
    pub is_backfill_context: bool,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub run_id: Option<String>,
}

impl RunConfig {
    /// Parse and normalize an orchestrator payload. Any shape problem is a
    /// configuration error and aborts the run before a job record exists.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let mut config: RunConfig = serde_json::from_value(value)
            .map_err(|e| Error::ConfigurationError(e.to_string()))?;

        config.instruments = config
            .instruments
            .into_iter()
            .map(|(symbol, mode)| (symbol.trim().to_uppercase(), mode))
            .collect();

        Ok(config)
    }

    /// Per-instrument override, case-insensitive on the symbol.
    pub fn override_for(&self, symbol: &str) -> Option<ExtractionMode> {
        self.instruments.get(&symbol.trim().to_uppercase()).copied()
    }
}

/// Operational thresholds and fetcher knobs, resolved once from the
/// environment and threaded through every call. The numeric defaults are
/// operational, not load-bearing for correctness.
#[derive(Debug, Clone)]
pub struct Settings {
    pub sparse_min_rows: i64,
    pub freshness_days: i64,
    pub historical_window_days: u32,
    pub fetch_delay: Duration,
    pub fetch_timeout: Duration,
    pub fetch_max_retries: u32,
    pub stooq_base_url: String,
    pub default_exchange: Exchange,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            sparse_min_rows: 30,
            freshness_days: 7,
            historical_window_days: 1000,
            fetch_delay: Duration::from_millis(1000),
            fetch_timeout: Duration::from_secs(30),
            fetch_max_retries: 3,
            stooq_base_url: "https://stooq.com".to_string(),
            default_exchange: Exchange::Wse,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        Settings {
            sparse_min_rows: env_parse("ETL_SPARSE_MIN_ROWS", defaults.sparse_min_rows),
            freshness_days: env_parse("ETL_FRESHNESS_DAYS", defaults.freshness_days),
            historical_window_days: env_parse(
                "ETL_HISTORICAL_WINDOW_DAYS",
                defaults.historical_window_days,
            ),
            fetch_delay: Duration::from_millis(env_parse(
                "ETL_FETCH_DELAY_MS",
                defaults.fetch_delay.as_millis() as u64,
            )),
            fetch_timeout: Duration::from_secs(env_parse(
                "ETL_FETCH_TIMEOUT_SECS",
                defaults.fetch_timeout.as_secs(),
            )),
            fetch_max_retries: env_parse("ETL_FETCH_MAX_RETRIES", defaults.fetch_max_retries),
            stooq_base_url: std::env::var("STOOQ_BASE_URL")
                .unwrap_or(defaults.stooq_base_url),
            default_exchange: std::env::var("ETL_DEFAULT_EXCHANGE")
                .ok()
                .and_then(|v| v.parse::<Exchange>().ok())
                .unwrap_or(defaults.default_exchange),
        }
    }
}
