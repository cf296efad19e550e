//! Candle data structure and ingestion from raw feed records

use serde::Serialize;
use std::fmt;

use super::Granularity;
use super::time_key::{DateInput, TimeKey, Unparseable, normalize};
use crate::feed::{PriceField, RawCandle};

/// Canonical candle shared across the app
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candle {
    pub time: TimeKey,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Candle {
    pub fn new(time: TimeKey, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            time,
            open,
            high,
            low,
            close,
            volume: None,
        }
    }

    pub fn is_bullish(&self) -> bool {
        self.close >= self.open
    }

    /// Check `low <= min(open, close) <= max(open, close) <= high` with finite prices.
    pub fn validate(&self) -> Result<(), CandleError> {
        let prices = [self.open, self.high, self.low, self.close];
        let consistent = prices.iter().all(|p| p.is_finite())
            && self.low <= self.open.min(self.close)
            && self.open.max(self.close) <= self.high;

        if consistent {
            Ok(())
        } else {
            Err(CandleError::InvalidOhlc {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            })
        }
    }

    /// Convert one raw feed record, keyed for `granularity`.
    pub fn from_raw(raw: &RawCandle, granularity: Granularity) -> Result<Self, CandleError> {
        let date = raw
            .date()
            .ok_or(CandleError::MissingField("date"))?;
        let input = DateInput::from_json(date).ok_or_else(|| {
            CandleError::Unparseable(Unparseable {
                input: date.to_string(),
            })
        })?;
        let time = normalize(&input, granularity)?;

        let candle = Candle {
            time,
            open: required_price(raw, PriceField::Open)?,
            high: required_price(raw, PriceField::High)?,
            low: required_price(raw, PriceField::Low)?,
            close: required_price(raw, PriceField::Close)?,
            volume: raw
                .price(PriceField::Volume)
                .and_then(coerce_price)
                .filter(|v| *v >= 0.0),
        };

        candle.validate()?;
        Ok(candle)
    }
}

fn required_price(raw: &RawCandle, field: PriceField) -> Result<f64, CandleError> {
    let value = raw
        .price(field)
        .ok_or(CandleError::MissingField(field.name()))?;

    coerce_price(value).ok_or_else(|| CandleError::InvalidPrice {
        field: field.name(),
        value: value.to_string(),
    })
}

/// Prices arrive as JSON numbers or numeric strings.
fn coerce_price(value: &serde_json::Value) -> Option<f64> {
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|p| p.is_finite())
}

/// Reasons a single record is dropped during ingestion.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CandleError {
    #[error(transparent)]
    Unparseable(#[from] Unparseable),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("invalid {field} price: {value}")]
    InvalidPrice { field: &'static str, value: String },
    #[error("inconsistent OHLC: open={open} high={high} low={low} close={close}")]
    InvalidOhlc {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },
}

/// Per-record drop counts for one ingestion pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounts {
    pub unparseable: usize,
    pub invalid_price: usize,
    pub invalid_ohlc: usize,
    pub duplicates: usize,
}

impl DropCounts {
    pub fn record(&mut self, error: &CandleError) {
        match error {
            CandleError::Unparseable(_) => self.unparseable += 1,
            // A record without a date cannot be placed on the axis at all.
            CandleError::MissingField("date") => self.unparseable += 1,
            CandleError::MissingField(_) | CandleError::InvalidPrice { .. } => {
                self.invalid_price += 1
            }
            CandleError::InvalidOhlc { .. } => self.invalid_ohlc += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.unparseable + self.invalid_price + self.invalid_ohlc + self.duplicates
    }

    pub fn accumulate(&mut self, other: &DropCounts) {
        self.unparseable += other.unparseable;
        self.invalid_price += other.invalid_price;
        self.invalid_ohlc += other.invalid_ohlc;
        self.duplicates += other.duplicates;
    }
}

impl fmt::Display for DropCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} dropped (unparseable date: {}, bad price: {}, bad OHLC: {}, duplicate: {})",
            self.total(),
            self.unparseable,
            self.invalid_price,
            self.invalid_ohlc,
            self.duplicates
        )
    }
}

/// Convert a batch of raw records, dropping the ones that fail.
///
/// The returned candles are in feed order; ordering and de-duplication are
/// applied by [`super::CandleSeries`].
pub fn ingest(records: &[RawCandle], granularity: Granularity) -> (Vec<Candle>, DropCounts) {
    let mut dropped = DropCounts::default();
    let mut candles = Vec::with_capacity(records.len());

    for (index, raw) in records.iter().enumerate() {
        match Candle::from_raw(raw, granularity) {
            Ok(candle) => candles.push(candle),
            Err(e) => {
                tracing::debug!("Dropping record {}: {}", index, e);
                dropped.record(&e);
            }
        }
    }

    (candles, dropped)
}
