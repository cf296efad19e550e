//! Data feed record shapes and errors

use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::market_data::Granularity;
use crate::zones::{Zone, zones_from_values};

/// Request for one OHLC range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OhlcRequest {
    pub ticker: String,
    pub granularity: Granularity,
    pub range: DateRange,
}

impl OhlcRequest {
    pub fn new(ticker: &str, granularity: Granularity, range: DateRange) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            granularity,
            range,
        }
    }
}

/// Inclusive calendar range sent as `start_date` / `end_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The last `days` days ending at `end`.
    pub fn ending_at(end: NaiveDate, days: u32) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    /// Window of `days` days immediately before this range, for history paging.
    pub fn preceding(&self, days: u32) -> Self {
        let end = self.start - Duration::days(1);
        Self::ending_at(end, days)
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        day >= self.start && day <= self.end
    }
}

/// The last `days` days ending today (UTC).
pub fn default_range(days: u32) -> DateRange {
    DateRange::ending_at(Utc::now().date_naive(), days)
}

/// Upper-case the ticker and strip the exchange suffix the feed does not expect.
pub fn normalize_ticker(ticker: &str) -> String {
    let upper = ticker.trim().to_uppercase();
    match upper.strip_suffix(".NS") {
        Some(stripped) => stripped.to_string(),
        None => upper,
    }
}

/// OHLC field of a raw feed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    pub fn name(&self) -> &'static str {
        match self {
            PriceField::Open => "open",
            PriceField::High => "high",
            PriceField::Low => "low",
            PriceField::Close => "close",
            PriceField::Volume => "volume",
        }
    }

    fn aliases(&self) -> &'static [&'static str] {
        match self {
            PriceField::Open => &["open", "o"],
            PriceField::High => &["high", "h"],
            PriceField::Low => &["low", "l"],
            PriceField::Close => &["close", "c", "adj close"],
            PriceField::Volume => &["volume", "v"],
        }
    }
}

const DATE_ALIASES: &[&str] = &["date", "datetime", "time", "timestamp"];

/// One record exactly as the feed sent it.
///
/// The feed is a dataframe dump, so field names vary in casing (`Date`,
/// `Datetime`, `open`, `Close`) and prices may be numbers or strings. Field
/// lookup is case-insensitive and nothing past [`crate::market_data::Candle`]
/// sees this shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawCandle {
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl RawCandle {
    /// Build a record from a JSON object literal; non-objects yield an empty record.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    pub fn date(&self) -> Option<&serde_json::Value> {
        self.lookup(DATE_ALIASES)
    }

    pub fn price(&self, field: PriceField) -> Option<&serde_json::Value> {
        self.lookup(field.aliases())
    }

    fn lookup(&self, aliases: &[&str]) -> Option<&serde_json::Value> {
        aliases.iter().find_map(|alias| {
            self.fields
                .iter()
                .find(|(key, value)| key.eq_ignore_ascii_case(alias) && !value.is_null())
                .map(|(_, value)| value)
        })
    }
}

/// Paged zone listing returned by the zone service.
///
/// Entries are kept as raw JSON so one unreadable zone does not fail the page.
#[derive(Debug, Clone, Deserialize)]
pub struct ZonePage {
    #[serde(default)]
    pub data: Vec<serde_json::Value>,
    #[serde(default)]
    pub total: usize,
    #[serde(default)]
    pub page: usize,
    #[serde(default)]
    pub total_pages: usize,
}

impl ZonePage {
    /// Zones on this page plus the number of entries that could not be read.
    pub fn into_zones(self) -> (Vec<Zone>, usize) {
        zones_from_values(self.data)
    }
}

/// Error types for feed requests
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("HTTP request error: {0}")]
    Http(String),
    #[error("HTTP status error: {0} - {1}")]
    Status(u16, String),
    #[error("Decode error: {0}")]
    Decode(String),
}
