//! Market data processing and management module
//!
//! Time normalization, candle ingestion and the ordered candle series with
//! its store.

pub mod candle;
pub mod candle_store;
pub mod granularity;
pub mod series;
pub mod time_key;

pub use candle::{Candle, CandleError, DropCounts, ingest};
pub use candle_store::{CandleStore, LoadOutcome, RequestClass, SeriesKey, StoreError};
pub use granularity::{Granularity, UnknownGranularity};
pub use series::{CandleSeries, MergeStats};
pub use time_key::{DateInput, TimeKey, Unparseable, normalize, parse_instant};
