use super::StooqRecord;
use crate::{Error, Result};
use tracing::{info, warn};

const EXPECTED_COLUMNS: [&str; 5] = ["Date", "Open", "High", "Low", "Close"];

/// Parse a Stooq daily CSV payload into validated records, oldest first.
///
/// Individual malformed rows are skipped, not fatal; an unusable payload
/// (error page, missing columns) is.
pub fn parse_daily_csv(content: &str, symbol: &str) -> Result<Vec<StooqRecord>> {
    if content.contains("Not Found") || content.lines().count() < 2 {
        return Err(Error::NotFound(format!(
            "No data returned for symbol {}",
            symbol
        )));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    for column in EXPECTED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(Error::ParseError(format!(
                "Missing expected column {} for symbol {}",
                column, symbol
            )));
        }
    }

    let mut records: Vec<StooqRecord> = Vec::new();
    let mut skipped = 0usize;
    for (idx, row) in reader.deserialize::<StooqRecord>().enumerate() {
        match row {
            Ok(mut record) => {
                record.symbol = symbol.to_uppercase();
                records.push(record);
            }
            Err(e) => {
                warn!(
                    "Skipping malformed row {} for symbol {}: {:?}",
                    idx + 1,
                    symbol,
                    e
                );
                skipped += 1;
            }
        }
    }

    // Stooq serves oldest first; enforce the ordering contract anyway.
    records.sort_by_key(|r| r.trading_date);

    info!(
        "Parsed {} rows for symbol {} ({} skipped)",
        records.len(),
        symbol,
        skipped
    );

    Ok(records)
}
