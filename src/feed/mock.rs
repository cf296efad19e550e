//! Mock feed implementation
//! Used for tests and offline runs where the charting backend is not reachable

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::types::{DateRange, FeedError, OhlcRequest, RawCandle};
use super::{OhlcFeed, ZoneSource};
use crate::market_data::{DateInput, Granularity, parse_instant};
use crate::zones::Zone;

/// Upper bound on generated records per synthetic range.
const MAX_SYNTHETIC_RECORDS: usize = 5_000;

/// In-memory feed serving a fixed set of raw records.
///
/// Records are filtered by the requested date range; records whose date
/// cannot be read are always served so the ingestion path sees them.
pub struct MockFeed {
    records: Mutex<Vec<RawCandle>>,
    zones: Mutex<Vec<Zone>>,
    failures: Mutex<VecDeque<FeedError>>,
    requests: Mutex<Vec<OhlcRequest>>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl MockFeed {
    /// Create a new MockFeed
    pub fn new(records: Vec<RawCandle>) -> Self {
        Self {
            records: Mutex::new(records),
            zones: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            gate: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Feed that synthesizes a deterministic price path for any request.
    pub fn synthetic(range: DateRange, granularity: Granularity) -> Self {
        Self::new(synthetic_records(range, granularity))
    }

    pub fn with_zones(self, zones: Vec<Zone>) -> Self {
        Self {
            zones: Mutex::new(zones),
            ..self
        }
    }

    /// Hold every fetch until the returned handle is notified once per call.
    pub fn gated(self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        (
            Self {
                gate: Some(gate.clone()),
                ..self
            },
            gate,
        )
    }

    pub async fn set_records(&self, records: Vec<RawCandle>) {
        *self.records.lock().await = records;
    }

    /// Make the next fetch fail with `error`.
    pub async fn fail_next(&self, error: FeedError) {
        self.failures.lock().await.push_back(error);
    }

    pub async fn requests(&self) -> Vec<OhlcRequest> {
        self.requests.lock().await.clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OhlcFeed for MockFeed {
    async fn fetch_ohlc(&self, request: &OhlcRequest) -> Result<Vec<RawCandle>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }

        let records = self.records.lock().await;
        let served: Vec<RawCandle> = records
            .iter()
            .filter(|record| in_range(record, &request.range))
            .cloned()
            .collect();

        debug!(
            "Mock feed serving {} of {} records for {}",
            served.len(),
            records.len(),
            request.ticker
        );

        Ok(served)
    }
}

#[async_trait]
impl ZoneSource for MockFeed {
    async fn fetch_zones(
        &self,
        _ticker: &str,
        _granularity: Granularity,
    ) -> Result<Vec<Zone>, FeedError> {
        Ok(self.zones.lock().await.clone())
    }
}

fn in_range(record: &RawCandle, range: &DateRange) -> bool {
    let instant = record
        .date()
        .and_then(DateInput::from_json)
        .and_then(|input| parse_instant(&input));

    match instant {
        Some(instant) => range.contains(instant.date_naive()),
        None => true,
    }
}

/// Build a raw record the way the backend dumps dataframe rows.
pub fn raw_record(date: &str, open: f64, high: f64, low: f64, close: f64) -> RawCandle {
    RawCandle::from_json(serde_json::json!({
        "Date": date,
        "Open": open,
        "High": high,
        "Low": low,
        "Close": close,
        "Volume": 1000.0,
    }))
}

/// Deterministic OHLC path covering `range` at `granularity`.
pub fn synthetic_records(range: DateRange, granularity: Granularity) -> Vec<RawCandle> {
    let step = match granularity {
        Granularity::Min1 => Duration::minutes(1),
        Granularity::Min5 => Duration::minutes(5),
        Granularity::Min15 => Duration::minutes(15),
        Granularity::Min30 => Duration::minutes(30),
        Granularity::Hour1 => Duration::hours(1),
        Granularity::Day1 => Duration::days(1),
        Granularity::Week1 => Duration::weeks(1),
        Granularity::Month1 => Duration::days(30),
        Granularity::Month3 => Duration::days(91),
    };

    let (Some(start), Some(end)) = (
        range.start.and_hms_opt(0, 0, 0),
        range.end.and_hms_opt(23, 59, 59),
    ) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    let mut at = start;
    while at <= end && records.len() < MAX_SYNTHETIC_RECORDS {
        let index = (at - start).num_minutes() as f64 / step.num_minutes().max(1) as f64;
        let day_seed = day_seed(at.date());
        let mid = 100.0 + 12.0 * (index / 9.0).sin() + (day_seed % 7) as f64 * 0.5;
        let open = mid - 0.8 * (index / 3.0).cos();
        let close = mid + 0.8 * (index / 4.0).sin();
        let high = open.max(close) + 1.0;
        let low = open.min(close) - 1.0;

        records.push(raw_record(
            &at.and_utc().to_rfc3339(),
            round2(open),
            round2(high),
            round2(low),
            round2(close),
        ));
        at += step;
    }

    records
}

fn day_seed(day: NaiveDate) -> i64 {
    day.signed_duration_since(NaiveDate::MIN).num_days()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
