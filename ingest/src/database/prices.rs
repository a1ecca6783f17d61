use crate::models::{date_epoch, Operation, PriceRecord};
use crate::Result;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};

pub trait FromRow: Sized {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self>;
}

impl FromRow for PriceRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self> {
        Ok(PriceRecord {
            id: row.try_get::<Option<i64>, _>("id")?,
            instrument_id: row.try_get::<i32, _>("instrument_id")?,
            trading_date: row.try_get::<NaiveDate, _>("trading_date")?,
            open_price: row.try_get::<BigDecimal, _>("open_price")?,
            high_price: row.try_get::<BigDecimal, _>("high_price")?,
            low_price: row.try_get::<BigDecimal, _>("low_price")?,
            close_price: row.try_get::<BigDecimal, _>("close_price")?,
            volume: row.try_get::<i64, _>("volume")?,
            adjusted_close: row.try_get::<Option<BigDecimal>, _>("adjusted_close")?,
            split_factor: row.try_get::<BigDecimal, _>("split_factor")?,
            dividend_amount: row.try_get::<BigDecimal, _>("dividend_amount")?,
            data_source: row.try_get::<String, _>("data_source")?,
            raw_data_hash: row.try_get::<Option<String>, _>("raw_data_hash")?,
        })
    }
}

#[async_trait]
pub trait PriceQueries: Sized {
    async fn upsert(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Operation>;
    async fn read(
        pool: &PgPool,
        instrument_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Self>>;
}

#[async_trait]
impl PriceQueries for PriceRecord {
    /// Insert-or-overwrite keyed on (instrument_id, trading_date) so reruns
    /// reconcile corrected upstream data instead of duplicating or failing.
    async fn upsert(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Operation> {
        let now = Utc::now();

        // xmax = 0 only on rows created by the current transaction, which
        // distinguishes insert from overwrite without a pre-read.
        let inserted: bool = sqlx::query_scalar(
            r#"
            INSERT INTO price_records (instrument_id, trading_date, trading_date_epoch,
                                       open_price, high_price, low_price, close_price, volume,
                                       adjusted_close, split_factor, dividend_amount,
                                       data_source, raw_data_hash,
                                       created_at, created_at_epoch, updated_at, updated_at_epoch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $14, $15)
            ON CONFLICT (instrument_id, trading_date)
            DO UPDATE SET
                open_price = EXCLUDED.open_price,
                high_price = EXCLUDED.high_price,
                low_price = EXCLUDED.low_price,
                close_price = EXCLUDED.close_price,
                volume = EXCLUDED.volume,
                adjusted_close = EXCLUDED.adjusted_close,
                split_factor = EXCLUDED.split_factor,
                dividend_amount = EXCLUDED.dividend_amount,
                data_source = EXCLUDED.data_source,
                raw_data_hash = EXCLUDED.raw_data_hash,
                updated_at = EXCLUDED.updated_at,
                updated_at_epoch = EXCLUDED.updated_at_epoch
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(self.instrument_id)
        .bind(self.trading_date)
        .bind(date_epoch(self.trading_date))
        .bind(&self.open_price)
        .bind(&self.high_price)
        .bind(&self.low_price)
        .bind(&self.close_price)
        .bind(self.volume)
        .bind(&self.adjusted_close)
        .bind(&self.split_factor)
        .bind(&self.dividend_amount)
        .bind(&self.data_source)
        .bind(&self.raw_data_hash)
        .bind(now)
        .bind(now.timestamp())
        .fetch_one(&mut **tx)
        .await?;

        if inserted {
            Ok(Operation::Insert)
        } else {
            Ok(Operation::Update)
        }
    }

    async fn read(
        pool: &PgPool,
        instrument_id: i32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM price_records
            WHERE instrument_id = $1 AND trading_date BETWEEN $2 AND $3
            ORDER BY trading_date
            "#,
        )
        .bind(instrument_id)
        .bind(start)
        .bind(end)
        .fetch_all(pool)
        .await?;

        let mut records = Vec::new();
        for row in &rows {
            records.push(PriceRecord::from_row(row)?);
        }

        Ok(records)
    }
}

/// Row count and freshness for one instrument, the only store read the
/// state inspector needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSummary {
    pub row_count: i64,
    pub latest_trading_date: Option<NaiveDate>,
}

pub async fn price_summary(pool: &PgPool, instrument_id: i32) -> Result<PriceSummary> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS row_count, MAX(trading_date) AS latest_trading_date
        FROM price_records
        WHERE instrument_id = $1
        "#,
    )
    .bind(instrument_id)
    .fetch_one(pool)
    .await?;

    Ok(PriceSummary {
        row_count: row.try_get::<i64, _>("row_count")?,
        latest_trading_date: row.try_get::<Option<NaiveDate>, _>("latest_trading_date")?,
    })
}

pub async fn count_prices(pool: &PgPool, instrument_id: i32) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM price_records
        WHERE instrument_id = $1
        "#,
    )
    .bind(instrument_id)
    .fetch_one(pool)
    .await?;

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::init::init_db;
    use instrument::database::symbols::ensure_instrument;
    use instrument::symbols::{Exchange, InstrumentType};
    use serial_test::serial;
    use std::str::FromStr;

    fn sample_price(instrument_id: i32, day: u32, close: &str) -> PriceRecord {
        PriceRecord {
            id: None,
            instrument_id,
            trading_date: NaiveDate::from_ymd_opt(2025, 7, day).unwrap(),
            open_price: BigDecimal::from_str("6.70").unwrap(),
            high_price: BigDecimal::from_str("6.90").unwrap(),
            low_price: BigDecimal::from_str("6.60").unwrap(),
            close_price: BigDecimal::from_str(close).unwrap(),
            volume: 500000,
            adjusted_close: None,
            split_factor: BigDecimal::from(1),
            dividend_amount: BigDecimal::from(0),
            data_source: "stooq".to_string(),
            raw_data_hash: None,
        }
    }

    async fn setup_instrument(symbol: &str) -> anyhow::Result<(PgPool, i32)> {
        dotenv::dotenv().ok();
        let pool = init_db().await.unwrap();
        let mut tx = pool.begin().await.expect("Error setting up database.");
        let id = ensure_instrument(&mut tx, symbol, InstrumentType::Stock, Exchange::Wse, None)
            .await
            .expect("Error creating instrument.");
        let _ = tx.commit().await;
        Ok((pool, id))
    }

    async fn cleanup(pool: &PgPool, instrument_id: i32) {
        let _ = sqlx::query("DELETE FROM price_records WHERE instrument_id = $1")
            .bind(instrument_id)
            .execute(pool)
            .await;
        let _ = sqlx::query("DELETE FROM instruments WHERE id = $1")
            .bind(instrument_id)
            .execute(pool)
            .await;
    }

    #[sqlx::test]
    #[serial]
    #[ignore]
    async fn test_upsert_insert_then_update() -> anyhow::Result<()> {
        let (pool, instrument_id) = setup_instrument("UPS1").await?;

        // Test
        let mut tx = pool.begin().await.expect("Error setting up database.");
        let op1 = sample_price(instrument_id, 30, "6.75")
            .upsert(&mut tx)
            .await
            .expect("Error on upsert.");
        let op2 = sample_price(instrument_id, 30, "6.85")
            .upsert(&mut tx)
            .await
            .expect("Error on upsert.");
        let _ = tx.commit().await;

        // Validate
        assert_eq!(op1, Operation::Insert);
        assert_eq!(op2, Operation::Update);

        let count = count_prices(&pool, instrument_id).await?;
        assert_eq!(count, 1);

        let records = PriceRecord::read(
            &pool,
            instrument_id,
            NaiveDate::from_ymd_opt(2025, 7, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 7, 31).unwrap(),
        )
        .await?;
        assert_eq!(records[0].close_price, BigDecimal::from_str("6.85").unwrap());

        // Cleanup
        cleanup(&pool, instrument_id).await;

        Ok(())
    }

    #[sqlx::test]
    #[serial]
    #[ignore]
    async fn test_price_summary() -> anyhow::Result<()> {
        let (pool, instrument_id) = setup_instrument("UPS2").await?;

        let mut tx = pool.begin().await.expect("Error setting up database.");
        for day in [28, 29, 30] {
            let _ = sample_price(instrument_id, day, "6.75")
                .upsert(&mut tx)
                .await
                .expect("Error on upsert.");
        }
        let _ = tx.commit().await;

        // Test
        let summary = price_summary(&pool, instrument_id).await?;

        // Validate
        assert_eq!(summary.row_count, 3);
        assert_eq!(
            summary.latest_trading_date,
            Some(NaiveDate::from_ymd_opt(2025, 7, 30).unwrap())
        );

        // Cleanup
        cleanup(&pool, instrument_id).await;

        Ok(())
    }

    #[sqlx::test]
    #[serial]
    #[ignore]
    async fn test_price_summary_empty() -> anyhow::Result<()> {
        let (pool, instrument_id) = setup_instrument("UPS3").await?;

        // Test
        let summary = price_summary(&pool, instrument_id).await?;

        // Validate
        assert_eq!(summary.row_count, 0);
        assert_eq!(summary.latest_trading_date, None);

        // Cleanup
        cleanup(&pool, instrument_id).await;

        Ok(())
    }
}
