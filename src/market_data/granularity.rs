//! Candle interval handling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval requested from the data feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1h")]
    Hour1,
    #[default]
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1wk")]
    Week1,
    #[serde(rename = "1mo")]
    Month1,
    #[serde(rename = "3mo")]
    Month3,
}

impl Granularity {
    /// Wire label used by the data feed (`interval` query parameter).
    pub fn label(&self) -> &'static str {
        match self {
            Granularity::Min1 => "1m",
            Granularity::Min5 => "5m",
            Granularity::Min15 => "15m",
            Granularity::Min30 => "30m",
            Granularity::Hour1 => "1h",
            Granularity::Day1 => "1d",
            Granularity::Week1 => "1wk",
            Granularity::Month1 => "1mo",
            Granularity::Month3 => "3mo",
        }
    }

    /// True for intervals finer than one day; those are keyed by epoch seconds.
    pub fn is_intraday(&self) -> bool {
        matches!(
            self,
            Granularity::Min1
                | Granularity::Min5
                | Granularity::Min15
                | Granularity::Min30
                | Granularity::Hour1
        )
    }

    pub fn all() -> &'static [Granularity] {
        &[
            Granularity::Min1,
            Granularity::Min5,
            Granularity::Min15,
            Granularity::Min30,
            Granularity::Hour1,
            Granularity::Day1,
            Granularity::Week1,
            Granularity::Month1,
            Granularity::Month3,
        ]
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown granularity: {0}")]
pub struct UnknownGranularity(pub String);

impl FromStr for Granularity {
    type Err = UnknownGranularity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Granularity::all()
            .iter()
            .copied()
            .find(|g| g.label() == wanted)
            .ok_or_else(|| UnknownGranularity(s.to_string()))
    }
}
