use crate::symbols::{Exchange, Instrument, InstrumentType};
use crate::{Error, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::info;

pub trait FromRow: Sized {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self>;
}

impl FromRow for Instrument {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self> {
        Ok(Instrument {
            instrument_id: row.try_get::<Option<i32>, _>("id")?,
            symbol: row.try_get::<String, _>("symbol")?,
            name: row.try_get::<String, _>("name")?,
            instrument_type: row
                .try_get::<&str, _>("instrument_type")?
                .parse::<InstrumentType>()?,
            exchange: row.try_get::<&str, _>("exchange")?.parse::<Exchange>()?,
            currency: row.try_get::<String, _>("currency")?,
            is_active: row.try_get::<bool, _>("is_active")?,
            first_trading_date: row.try_get::<Option<NaiveDate>, _>("first_trading_date")?,
            last_trading_date: row.try_get::<Option<NaiveDate>, _>("last_trading_date")?,
        })
    }
}

#[async_trait]
pub trait InstrumentsQueries: Sized {
    async fn create(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i32>;
    async fn read(pool: &PgPool, symbol: &str) -> Result<Vec<Instrument>>;
    async fn read_by_id(pool: &PgPool, id: i32) -> Result<Option<Instrument>>;
    async fn update(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()>;
    async fn deactivate(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<()>;
}

#[async_trait]
impl InstrumentsQueries for Instrument {
    /// Upsert keyed on (symbol, exchange) so onboarding reruns reconcile
    /// metadata instead of failing.
    async fn create(&self, tx: &mut Transaction<'_, Postgres>) -> Result<i32> {
        info!("Inserting instrument: {:?}", self);
        let now = Utc::now();

        let instrument_id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO instruments (symbol, name, instrument_type, exchange, currency, is_active,
                                     first_trading_date, last_trading_date,
                                     created_at, created_at_epoch, updated_at, updated_at_epoch)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $9, $10)
            ON CONFLICT (symbol, exchange)
            DO UPDATE SET
                name = EXCLUDED.name,
                instrument_type = EXCLUDED.instrument_type,
                currency = EXCLUDED.currency,
                first_trading_date = COALESCE(EXCLUDED.first_trading_date, instruments.first_trading_date),
                last_trading_date = COALESCE(EXCLUDED.last_trading_date, instruments.last_trading_date),
                updated_at = EXCLUDED.updated_at,
                updated_at_epoch = EXCLUDED.updated_at_epoch
            RETURNING id
            "#,
        )
        .bind(&self.symbol)
        .bind(&self.name)
        .bind(self.instrument_type.as_str())
        .bind(self.exchange.as_str())
        .bind(&self.currency)
        .bind(self.is_active)
        .bind(self.first_trading_date)
        .bind(self.last_trading_date)
        .bind(now)
        .bind(now.timestamp())
        .fetch_one(&mut **tx)
        .await?;

        info!("Successfully created instrument with id: {}", instrument_id);
        Ok(instrument_id)
    }

    async fn read(pool: &PgPool, symbol: &str) -> Result<Vec<Instrument>> {
        info!("Retrieving instrument: {:?}", symbol);

        let rows = sqlx::query(
            r#"
            SELECT * FROM instruments
            WHERE symbol = $1
            "#,
        )
        .bind(symbol.to_uppercase())
        .fetch_all(pool)
        .await?;

        let mut instruments = Vec::new();
        for row in &rows {
            instruments.push(Instrument::from_row(row)?);
        }

        info!("Successfully fetched {} instruments", instruments.len());

        Ok(instruments)
    }

    async fn read_by_id(pool: &PgPool, id: i32) -> Result<Option<Instrument>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM instruments
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Instrument::from_row(&row)?)),
            None => Ok(None),
        }
    }

    async fn update(&self, tx: &mut Transaction<'_, Postgres>) -> Result<()> {
        let id = self
            .instrument_id
            .ok_or_else(|| Error::CustomError("Instrument_id cannot be None.".into()))?;

        info!("Updating instrument with id {}.", id);
        let now = Utc::now();

        let _ = sqlx::query(
            r#"
            UPDATE instruments
            SET symbol=$1, name=$2, instrument_type=$3, exchange=$4, currency=$5, is_active=$6,
                first_trading_date=$7, last_trading_date=$8, updated_at=$9, updated_at_epoch=$10
            WHERE id = $11
            "#,
        )
        .bind(&self.symbol)
        .bind(&self.name)
        .bind(self.instrument_type.as_str())
        .bind(self.exchange.as_str())
        .bind(&self.currency)
        .bind(self.is_active)
        .bind(self.first_trading_date)
        .bind(self.last_trading_date)
        .bind(now)
        .bind(now.timestamp())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        info!("Successfully updated instrument with id {}", id);

        Ok(())
    }

    /// Instruments are never hard-deleted; delisting flips the active flag.
    async fn deactivate(tx: &mut Transaction<'_, Postgres>, id: i32) -> Result<()> {
        info!("Deactivating instrument with id {}", id);
        let now = Utc::now();

        let _ = sqlx::query(
            r#"
            UPDATE instruments
            SET is_active = false, updated_at = $1, updated_at_epoch = $2
            WHERE id = $3
            "#,
        )
        .bind(now)
        .bind(now.timestamp())
        .bind(id)
        .execute(&mut **tx)
        .await?;

        info!("Successfully deactivated instrument with id {}", id);

        Ok(())
    }
}

pub async fn list_instruments_by_type(
    pool: &PgPool,
    instrument_type: InstrumentType,
) -> Result<Vec<Instrument>> {
    info!("Fetching instruments for type: {}", instrument_type);

    let rows = sqlx::query(
        r#"
        SELECT * FROM instruments
        WHERE instrument_type = $1
        ORDER BY symbol
        "#,
    )
    .bind(instrument_type.as_str())
    .fetch_all(pool)
    .await?;

    let mut instruments = Vec::new();
    for row in &rows {
        instruments.push(Instrument::from_row(row)?);
    }

    info!("Successfully fetched {} instruments", instruments.len());

    Ok(instruments)
}

pub async fn list_active_instruments(pool: &PgPool) -> Result<Vec<Instrument>> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM instruments
        WHERE is_active = true
        ORDER BY symbol
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut instruments = Vec::new();
    for row in &rows {
        instruments.push(Instrument::from_row(row)?);
    }

    Ok(instruments)
}

/// Read-or-create used by the load path when an unseen symbol arrives.
pub async fn ensure_instrument(
    tx: &mut Transaction<'_, Postgres>,
    symbol: &str,
    instrument_type: InstrumentType,
    exchange: Exchange,
    first_trading_date: Option<NaiveDate>,
) -> Result<i32> {
    let existing: Option<i32> = sqlx::query_scalar(
        r#"
        SELECT id FROM instruments
        WHERE symbol = $1 AND exchange = $2
        "#,
    )
    .bind(symbol.to_uppercase())
    .bind(exchange.as_str())
    .fetch_optional(&mut **tx)
    .await?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let instrument = Instrument::new(
        None,
        symbol,
        &format!("{} - Auto-created", symbol.to_uppercase()),
        instrument_type,
        exchange,
        "PLN",
        true,
        first_trading_date,
        None,
    );
    let id = instrument.create(tx).await?;

    info!("Auto-onboarded instrument {} with id {}", symbol, id);

    Ok(id)
}
