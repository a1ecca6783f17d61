use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
#[error("Invalid value: {0}")]
pub struct ParseError(pub String);

/// Supported instrument kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentType {
    Stock,
    Index,
    Etf,
    Bond,
    Future,
    Option,
}

impl InstrumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentType::Stock => "stock",
            InstrumentType::Index => "index",
            InstrumentType::Etf => "etf",
            InstrumentType::Bond => "bond",
            InstrumentType::Future => "future",
            InstrumentType::Option => "option",
        }
    }
}

impl FromStr for InstrumentType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stock" => Ok(InstrumentType::Stock),
            "index" => Ok(InstrumentType::Index),
            "etf" => Ok(InstrumentType::Etf),
            "bond" => Ok(InstrumentType::Bond),
            "future" => Ok(InstrumentType::Future),
            "option" => Ok(InstrumentType::Option),
            other => Err(ParseError(format!("Unknown instrument type: {}", other))),
        }
    }
}

impl fmt::Display for InstrumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Supported exchange codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exchange {
    #[serde(rename = "WSE")]
    Wse,
    #[serde(rename = "NewConnect")]
    NewConnect,
    #[serde(rename = "Catalyst")]
    Catalyst,
    #[serde(rename = "BondSpot")]
    BondSpot,
    #[serde(rename = "NYSE")]
    Nyse,
    #[serde(rename = "NASDAQ")]
    Nasdaq,
    #[serde(rename = "LSE")]
    Lse,
}

impl Exchange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Wse => "WSE",
            Exchange::NewConnect => "NewConnect",
            Exchange::Catalyst => "Catalyst",
            Exchange::BondSpot => "BondSpot",
            Exchange::Nyse => "NYSE",
            Exchange::Nasdaq => "NASDAQ",
            Exchange::Lse => "LSE",
        }
    }
}

impl FromStr for Exchange {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WSE" => Ok(Exchange::Wse),
            "NewConnect" => Ok(Exchange::NewConnect),
            "Catalyst" => Ok(Exchange::Catalyst),
            "BondSpot" => Ok(Exchange::BondSpot),
            "NYSE" => Ok(Exchange::Nyse),
            "NASDAQ" => Ok(Exchange::Nasdaq),
            "LSE" => Ok(Exchange::Lse),
            other => Err(ParseError(format!("Unknown exchange: {}", other))),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical identity record for a tradable instrument. Never hard-deleted;
/// deactivation flips `is_active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument_id: Option<i32>,
    pub symbol: String,
    pub name: String,
    pub instrument_type: InstrumentType,
    pub exchange: Exchange,
    pub currency: String,
    pub is_active: bool,
    pub first_trading_date: Option<NaiveDate>,
    pub last_trading_date: Option<NaiveDate>,
}

impl Instrument {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instrument_id: Option<i32>,
        symbol: &str,
        name: &str,
        instrument_type: InstrumentType,
        exchange: Exchange,
        currency: &str,
        is_active: bool,
        first_trading_date: Option<NaiveDate>,
        last_trading_date: Option<NaiveDate>,
    ) -> Self {
        Instrument {
            instrument_id,
            symbol: symbol.trim().to_uppercase(),
            name: name.to_string(),
            instrument_type,
            exchange,
            currency: currency.trim().to_uppercase(),
            is_active,
            first_trading_date,
            last_trading_date,
        }
    }
}
