use chrono::{Datelike, NaiveDate, Weekday};

// TODO: movable WSE holidays (Easter Monday, Corpus Christi) need a proper
// calendar source; only fixed-date closures are covered here.
fn is_fixed_holiday(date: NaiveDate) -> bool {
    matches!(
        (date.month(), date.day()),
        (1, 1) | (1, 6) | (5, 1) | (5, 3) | (8, 15) | (11, 1) | (11, 11) | (12, 24) | (12, 25)
            | (12, 26) | (12, 31)
    )
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    !is_weekend(date) && !is_fixed_holiday(date)
}

/// Most recent trading day strictly before `date`.
pub fn previous_trading_day(date: NaiveDate) -> NaiveDate {
    let mut day = date - chrono::Duration::days(1);
    while !is_trading_day(day) {
        day -= chrono::Duration::days(1);
    }
    day
}

/// `date` itself when it trades, otherwise the previous trading day. Used as
/// the run's reference date.
pub fn latest_trading_day_on_or_before(date: NaiveDate) -> NaiveDate {
    if is_trading_day(date) {
        date
    } else {
        previous_trading_day(date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_weekend_is_not_trading_day() {
        // 2025-08-02 is a Saturday.
        assert!(!is_trading_day(date(2025, 8, 2)));
        assert!(!is_trading_day(date(2025, 8, 3)));
        assert!(is_trading_day(date(2025, 8, 4)));
    }

    #[test]
    fn test_fixed_holiday_is_not_trading_day() {
        assert!(!is_trading_day(date(2025, 5, 1)));
        assert!(!is_trading_day(date(2025, 12, 25)));
    }

    #[test]
    fn test_previous_trading_day_skips_weekend() {
        // Monday steps back to Friday.
        assert_eq!(previous_trading_day(date(2025, 8, 4)), date(2025, 8, 1));
    }

    #[test]
    fn test_previous_trading_day_skips_holiday_run() {
        // Dec 27 2025 is a Saturday; the run Dec 24-28 resolves to Dec 23.
        assert_eq!(previous_trading_day(date(2025, 12, 28)), date(2025, 12, 23));
    }

    #[test]
    fn test_latest_on_or_before() {
        assert_eq!(
            latest_trading_day_on_or_before(date(2025, 8, 4)),
            date(2025, 8, 4)
        );
        assert_eq!(
            latest_trading_day_on_or_before(date(2025, 8, 3)),
            date(2025, 8, 1)
        );
    }
}
