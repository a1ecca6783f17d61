use super::parse::parse_daily_csv;
use super::{FetchRange, StooqRecord};
use crate::{Error, Result};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Lookback used to find the most recent available day; wide enough to span
/// weekends and holiday runs.
const LATEST_LOOKBACK_DAYS: i64 = 7;

const BACKOFF_BASE: Duration = Duration::from_millis(250);
const BACKOFF_CAP: Duration = Duration::from_secs(10);

/// Shared minimum-delay limiter. One instance guards one upstream
/// connection; holding the lock across the sleep is what serializes
/// concurrent callers.
pub struct RateLimiter {
    min_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        RateLimiter {
            min_delay,
            last_request: Mutex::new(None),
        }
    }

    pub async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_delay {
                tokio::time::sleep(self.min_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let delay = BACKOFF_BASE * 2u32.saturating_pow(attempt.saturating_sub(1));
    delay.min(BACKOFF_CAP)
}

pub struct StooqClient {
    base_url: String,
    client: reqwest::Client,
    limiter: Arc<RateLimiter>,
    max_retries: u32,
}

impl StooqClient {
    pub fn new(
        base_url: &str,
        min_delay: Duration,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let limiter = Arc::new(RateLimiter::new(min_delay));
        Self::with_limiter(base_url, limiter, timeout, max_retries)
    }

    /// Share one limiter across clients hitting the same provider.
    pub fn with_limiter(
        base_url: &str,
        limiter: Arc<RateLimiter>,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| Error::CustomError(e.to_string()))?;

        Ok(StooqClient {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            limiter,
            max_retries,
        })
    }

    fn build_url(&self, symbol: &str, range: FetchRange, as_of: NaiveDate) -> String {
        let mut url = format!(
            "{}/q/d/l/?s={}&f=csv&i=d",
            self.base_url,
            symbol.to_lowercase()
        );

        let window = match range {
            FetchRange::Full => None,
            FetchRange::Latest => Some(LATEST_LOOKBACK_DAYS),
            FetchRange::LastDays(n) => Some(i64::from(n)),
        };

        if let Some(days) = window {
            let start = as_of - chrono::Duration::days(days);
            url.push_str(&format!(
                "&d1={}&d2={}",
                start.format("%Y%m%d"),
                as_of.format("%Y%m%d")
            ));
        }

        url
    }

    /// Fetch daily bars for one symbol, oldest first. Rate limiting and a
    /// bounded retry with exponential backoff happen here, before any data
    /// reaches the loader.
    pub async fn fetch_daily(
        &self,
        symbol: &str,
        range: FetchRange,
        as_of: NaiveDate,
    ) -> Result<Vec<StooqRecord>> {
        let url = self.build_url(symbol, range, as_of);
        info!("Fetching daily bars for {} from {}", symbol, url);

        let mut attempt = 0u32;
        let content = loop {
            attempt += 1;
            self.limiter.acquire().await;

            match self.request(&url).await {
                Ok(body) => break body,
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let backoff = backoff_delay(attempt);
                    warn!(
                        "Retrying fetch for {} (attempt {}/{}) after {:?}: {:?}",
                        symbol, attempt, self.max_retries, backoff, e
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        };

        let mut records = parse_daily_csv(&content, symbol)?;

        if matches!(range, FetchRange::Latest) {
            // Only the most recent available day survives.
            if let Some(last) = records.pop() {
                records = vec![last];
            }
        }

        Ok(records)
    }

    async fn request(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if status.as_u16() == 429 {
            return Err(Error::RateLimited(format!("{} from {}", status, url)));
        }
        if status.as_u16() == 404 {
            return Err(Error::NotFound(format!("{} from {}", status, url)));
        }
        if status.is_server_error() {
            return Err(Error::Transient(format!("{} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(Error::CustomError(format!("{} from {}", status, url)));
        }

        Ok(response.text().await?)
    }
}
