use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use instrument::symbols::{InstrumentType, ParseError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vendors::stooq::StooqRecord;

/// Final extraction mode for one instrument in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    Incremental,
    Historical,
    FullBackfill,
}

impl ExtractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMode::Incremental => "incremental",
            ExtractionMode::Historical => "historical",
            ExtractionMode::FullBackfill => "full_backfill",
        }
    }
}

impl FromStr for ExtractionMode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incremental" => Ok(ExtractionMode::Incremental),
            "historical" => Ok(ExtractionMode::Historical),
            "full_backfill" => Ok(ExtractionMode::FullBackfill),
            other => Err(ParseError(format!("Unknown extraction mode: {}", other))),
        }
    }
}

impl fmt::Display for ExtractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Store-derived classification of an instrument's existing history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentState {
    Empty,
    Sparse,
    Stale,
    Current,
}

/// ETL job status values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Retrying,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Retrying => "retrying",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Legal transitions, enforced at the tracker boundary rather than left
    /// implicit in column values.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Retrying)
                | (JobStatus::Retrying, JobStatus::Running)
                | (JobStatus::Retrying, JobStatus::Failed)
                | (JobStatus::Retrying, JobStatus::Cancelled)
        )
    }
}

impl FromStr for JobStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "retrying" => Ok(JobStatus::Retrying),
            other => Err(ParseError(format!("Unknown job status: {}", other))),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-row operation recorded in job details.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Insert,
    Update,
    Skip,
    Error,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Skip => "skip",
            Operation::Error => "error",
        }
    }
}

impl FromStr for Operation {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Operation::Insert),
            "update" => Ok(Operation::Update),
            "skip" => Ok(Operation::Skip),
            "error" => Ok(Operation::Error),
            other => Err(ParseError(format!("Unknown operation: {}", other))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data quality severity levels. Variant order gives Info < Warning < Error
/// < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

impl FromStr for Severity {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "error" => Ok(Severity::Error),
            "critical" => Ok(Severity::Critical),
            other => Err(ParseError(format!("Unknown severity: {}", other))),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One daily bar keyed on (instrument_id, trading_date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub id: Option<i64>,
    pub instrument_id: i32,
    pub trading_date: NaiveDate,
    pub open_price: BigDecimal,
    pub high_price: BigDecimal,
    pub low_price: BigDecimal,
    pub close_price: BigDecimal,
    pub volume: i64,
    pub adjusted_close: Option<BigDecimal>,
    pub split_factor: BigDecimal,
    pub dividend_amount: BigDecimal,
    pub data_source: String,
    pub raw_data_hash: Option<String>,
}

impl PriceRecord {
    pub fn from_stooq(instrument_id: i32, record: &StooqRecord) -> Self {
        PriceRecord {
            id: None,
            instrument_id,
            trading_date: record.trading_date,
            open_price: record.open.clone(),
            high_price: record.high.clone(),
            low_price: record.low.clone(),
            close_price: record.close.clone(),
            volume: record.volume,
            adjusted_close: Some(record.close.clone()),
            split_factor: BigDecimal::from(1),
            dividend_amount: BigDecimal::from(0),
            data_source: "stooq".to_string(),
            raw_data_hash: Some(record.raw_data_hash()),
        }
    }
}

/// One record per pipeline invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Option<i32>,
    pub job_name: String,
    pub job_type: String,
    pub target_instrument_type: Option<InstrumentType>,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i64>,
    pub records_processed: i64,
    pub records_inserted: i64,
    pub records_updated: i64,
    pub records_failed: i64,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub metadata: Option<serde_json::Value>,
}

impl Job {
    pub fn new(
        job_name: &str,
        job_type: &str,
        target_instrument_type: Option<InstrumentType>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Job {
            id: None,
            job_name: job_name.to_string(),
            job_type: job_type.to_string(),
            target_instrument_type,
            status: JobStatus::Pending,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            records_processed: 0,
            records_inserted: 0,
            records_updated: 0,
            records_failed: 0,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            metadata,
        }
    }
}

/// One record per (job, instrument, operation). Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDetail {
    pub id: Option<i64>,
    pub job_id: i32,
    pub instrument_id: Option<i32>,
    pub symbol: String,
    pub operation: Operation,
    pub date_processed: NaiveDate,
    pub records_count: i64,
    pub processing_time_ms: Option<i64>,
    pub error_details: Option<String>,
}

/// One record per (instrument, metric date, metric name); reruns overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetric {
    pub id: Option<i64>,
    pub job_id: Option<i32>,
    pub instrument_id: i32,
    pub metric_date: NaiveDate,
    pub metric_name: String,
    pub metric_value: Option<BigDecimal>,
    pub threshold_min: Option<BigDecimal>,
    pub threshold_max: Option<BigDecimal>,
    pub is_valid: bool,
    pub severity: Severity,
    pub description: Option<String>,
}

/// Per-instrument load result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub processed: i64,
    pub inserted: i64,
    pub updated: i64,
    pub failed: i64,
}

/// Redundant integer epoch carried next to every date column, computed
/// application-side.
pub fn date_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}
