use crate::models::Severity;
use bigdecimal::BigDecimal;
use vendors::stooq::StooqRecord;

pub const NON_NEGATIVE_PRICES: &str = "non_negative_prices";
pub const OHLC_CONSISTENCY: &str = "ohlc_consistency";
pub const ZERO_VOLUME_PRICE_CHANGE: &str = "zero_volume_price_change";

/// One failed structural check on one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub metric_name: &'static str,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
}

/// Structural checks on a raw row, run before the loader sees it. Rows are
/// written either way; violations become flagged quality metrics rather
/// than silent drops.
pub fn validate(record: &StooqRecord) -> ValidationResult {
    let mut violations = Vec::new();
    let zero = BigDecimal::from(0);

    if record.open < zero || record.high < zero || record.low < zero || record.close < zero {
        violations.push(Violation {
            metric_name: NON_NEGATIVE_PRICES,
            severity: Severity::Critical,
            description: format!(
                "Negative price on {}: open={} high={} low={} close={}",
                record.trading_date, record.open, record.high, record.low, record.close
            ),
        });
    }

    let max_oc = record.open.clone().max(record.close.clone());
    let min_oc = record.open.clone().min(record.close.clone());
    if record.high < max_oc || record.low > min_oc {
        violations.push(Violation {
            metric_name: OHLC_CONSISTENCY,
            severity: Severity::Error,
            description: format!(
                "OHLC ordering violated on {}: open={} high={} low={} close={}",
                record.trading_date, record.open, record.high, record.low, record.close
            ),
        });
    }

    // Zero volume on a day with price movement is suspicious but not
    // necessarily wrong.
    if record.volume == 0 && record.open != record.close {
        violations.push(Violation {
            metric_name: ZERO_VOLUME_PRICE_CHANGE,
            severity: Severity::Warning,
            description: format!(
                "Zero volume with price movement on {}: open={} close={}",
                record.trading_date, record.open, record.close
            ),
        });
    } else if record.volume < 0 {
        violations.push(Violation {
            metric_name: ZERO_VOLUME_PRICE_CHANGE,
            severity: Severity::Warning,
            description: format!(
                "Negative volume on {}: {}",
                record.trading_date, record.volume
            ),
        });
    }

    // Warnings flag without invalidating.
    let is_valid = !violations.iter().any(|v| v.severity >= Severity::Error);

    ValidationResult {
        is_valid,
        violations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn record(open: &str, high: &str, low: &str, close: &str, volume: i64) -> StooqRecord {
        StooqRecord {
            trading_date: NaiveDate::from_ymd_opt(2025, 7, 30).unwrap(),
            open: BigDecimal::from_str(open).unwrap(),
            high: BigDecimal::from_str(high).unwrap(),
            low: BigDecimal::from_str(low).unwrap(),
            close: BigDecimal::from_str(close).unwrap(),
            volume,
            symbol: "XTB".to_string(),
        }
    }

    #[test]
    fn test_clean_row_passes() {
        let result = validate(&record("6.70", "6.90", "6.60", "6.80", 500000));

        // Validate
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_negative_price_is_critical() {
        let result = validate(&record("-1.00", "6.90", "6.60", "6.80", 500000));

        // Validate
        assert!(!result.is_valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.metric_name == NON_NEGATIVE_PRICES && v.severity == Severity::Critical));
    }

    #[test]
    fn test_high_below_close_is_error() {
        let result = validate(&record("6.70", "6.75", "6.60", "6.80", 500000));

        // Validate
        assert!(!result.is_valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.metric_name == OHLC_CONSISTENCY && v.severity == Severity::Error));
    }

    #[test]
    fn test_low_above_open_is_error() {
        let result = validate(&record("6.70", "6.90", "6.75", "6.80", 500000));

        // Validate
        assert!(!result.is_valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.metric_name == OHLC_CONSISTENCY));
    }

    #[test]
    fn test_zero_volume_with_movement_warns_but_stays_valid() {
        let result = validate(&record("6.70", "6.90", "6.60", "6.80", 0));

        // Validate
        assert!(result.is_valid);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].severity, Severity::Warning);
    }

    #[test]
    fn test_zero_volume_without_movement_is_clean() {
        let result = validate(&record("6.70", "6.90", "6.60", "6.70", 0));

        // Validate
        assert!(result.is_valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_flat_day_at_high_passes() {
        // open = high = low = close is legal.
        let result = validate(&record("6.70", "6.70", "6.70", "6.70", 1000));

        // Validate
        assert!(result.is_valid);
    }
}
