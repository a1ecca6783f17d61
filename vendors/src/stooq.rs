pub mod client;
pub mod parse;

use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use client::{RateLimiter, StooqClient};

/// How much history a fetch should cover. The caller translates its
/// extraction mode into one of these; the client only understands date math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRange {
    /// Most recent available trading day only.
    Latest,
    /// Bounded window ending at the reference date.
    LastDays(u32),
    /// The provider's entire available history.
    Full,
}

/// One daily bar as Stooq serves it (`Date,Open,High,Low,Close,Volume`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StooqRecord {
    #[serde(rename = "Date")]
    pub trading_date: NaiveDate,
    #[serde(rename = "Open")]
    pub open: BigDecimal,
    #[serde(rename = "High")]
    pub high: BigDecimal,
    #[serde(rename = "Low")]
    pub low: BigDecimal,
    #[serde(rename = "Close")]
    pub close: BigDecimal,
    // Index series omit the volume column.
    #[serde(rename = "Volume", default)]
    pub volume: i64,
    #[serde(skip)]
    pub symbol: String,
}

impl StooqRecord {
    /// SHA-256 over the raw payload fields, stored for change detection and
    /// auditing. Not load-bearing for idempotence.
    pub fn raw_data_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.symbol.as_bytes());
        hasher.update(self.trading_date.to_string().as_bytes());
        hasher.update(self.open.to_string().as_bytes());
        hasher.update(self.high.to_string().as_bytes());
        hasher.update(self.low.to_string().as_bytes());
        hasher.update(self.close.to_string().as_bytes());
        hasher.update(self.volume.to_be_bytes());

        let result = hasher.finalize();
        result.iter().map(|byte| format!("{:02x}", byte)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn sample_record() -> StooqRecord {
        StooqRecord {
            trading_date: NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            open: BigDecimal::from_str("6.75").unwrap(),
            high: BigDecimal::from_str("6.85").unwrap(),
            low: BigDecimal::from_str("6.65").unwrap(),
            close: BigDecimal::from_str("6.80").unwrap(),
            volume: 750000,
            symbol: "XTB".to_string(),
        }
    }

    #[test]
    fn test_hash_is_stable() {
        let record = sample_record();

        // Test
        let hash = record.raw_data_hash();
        assert_eq!(hash, record.raw_data_hash());
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_hash_changes_with_payload() {
        let record = sample_record();
        let mut changed = sample_record();
        changed.volume = 750001;

        // Test
        assert_ne!(record.raw_data_hash(), changed.raw_data_hash());
    }
}
