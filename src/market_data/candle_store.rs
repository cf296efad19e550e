//! Candle store: initial loads and backward history merges
//!
//! The store owns the series for one ticker/granularity at a time. Two
//! request classes exist, the initial load and "load more" paging; each is
//! single-flight and a second request of the same class while one is pending
//! is rejected with [`StoreError::Busy`]. Every request is tagged with a
//! sequence number and the store generation it started from, and a response
//! is only applied while that generation is still current. Replacing or
//! resetting the series bumps the generation, so a slow response can never
//! land on a series it was not fetched for.

use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::candle::{DropCounts, ingest};
use super::{CandleSeries, Granularity};
use crate::feed::{DateRange, FeedError, OhlcFeed, OhlcRequest, normalize_ticker};

/// Request classes tracked independently for single-flight purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestClass {
    Initial,
    More,
}

impl fmt::Display for RequestClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestClass::Initial => f.write_str("initial load"),
            RequestClass::More => f.write_str("load more"),
        }
    }
}

/// Ticker and granularity the current series belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub ticker: String,
    pub granularity: Granularity,
}

impl SeriesKey {
    pub fn new(ticker: &str, granularity: Granularity) -> Self {
        Self {
            ticker: normalize_ticker(ticker),
            granularity,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.ticker, self.granularity)
    }
}

/// Error types for store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("feed request failed: {0}")]
    Fetch(#[from] FeedError),
    #[error("no valid candles for {key}: {received} records received, {dropped}")]
    NoData {
        key: SeriesKey,
        received: usize,
        dropped: DropCounts,
    },
    #[error("a {0} request is already in flight")]
    Busy(RequestClass),
    #[error("load more requires a loaded series")]
    NoSeries,
    #[error("{class} response #{seq} was superseded before it arrived")]
    Stale { class: RequestClass, seq: u64 },
}

/// Outcome of a successful load.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub series: CandleSeries,
    pub seq: u64,
    pub received: usize,
    pub added: usize,
    pub dropped: DropCounts,
}

#[derive(Debug, Default)]
struct StoreState {
    key: Option<SeriesKey>,
    series: Option<CandleSeries>,
    range: Option<DateRange>,
    /// Oldest day already requested, including history pages that were empty.
    history_start: Option<NaiveDate>,
    generation: u64,
}

impl StoreState {
    fn clear(&mut self) {
        self.key = None;
        self.series = None;
        self.range = None;
        self.history_start = None;
    }

    fn mark_requested(&mut self, start: NaiveDate) {
        self.history_start = Some(self.history_start.map_or(start, |s| s.min(start)));
    }
}

/// Clears the in-flight flag for one request class when dropped.
struct InFlight<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool, class: RequestClass) -> Result<Self, StoreError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| StoreError::Busy(class))?;
        Ok(Self { flag })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Owner of the candle series for the chart.
pub struct CandleStore<F> {
    feed: F,
    state: Mutex<StoreState>,
    initial_in_flight: AtomicBool,
    more_in_flight: AtomicBool,
    initial_seq: AtomicU64,
    more_seq: AtomicU64,
}

impl<F: OhlcFeed> CandleStore<F> {
    pub fn new(feed: F) -> Self {
        Self {
            feed,
            state: Mutex::new(StoreState::default()),
            initial_in_flight: AtomicBool::new(false),
            more_in_flight: AtomicBool::new(false),
            initial_seq: AtomicU64::new(0),
            more_seq: AtomicU64::new(0),
        }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    /// Load the series for `ticker`/`granularity` over `range`.
    ///
    /// A series for a different ticker or granularity is discarded before
    /// the fetch starts.
    pub async fn load_initial(
        &self,
        ticker: &str,
        granularity: Granularity,
        range: DateRange,
    ) -> Result<LoadOutcome, StoreError> {
        let _in_flight = InFlight::acquire(&self.initial_in_flight, RequestClass::Initial)?;
        let seq = self.initial_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let key = SeriesKey::new(ticker, granularity);

        let generation = {
            let mut state = self.state.lock().await;
            if state.key.as_ref() != Some(&key) {
                if let Some(previous) = state.key.take() {
                    info!("Discarding series for {} before loading {}", previous, key);
                }
                state.clear();
                state.generation += 1;
            }
            state.generation
        };

        info!("Initial load #{} for {} {} → {}", seq, key, range.start, range.end);

        let request = OhlcRequest::new(&key.ticker, granularity, range);
        let records = self.feed.fetch_ohlc(&request).await.map_err(|e| {
            warn!("Initial load #{} for {} failed: {}", seq, key, e);
            StoreError::Fetch(e)
        })?;

        let received = records.len();
        let (candles, mut dropped) = ingest(&records, granularity);
        let (series, duplicates) = CandleSeries::from_unsorted(candles);
        dropped.duplicates = duplicates;

        if series.is_empty() {
            warn!(
                "Initial load #{} for {}: no valid candles out of {} records",
                seq, key, received
            );
            return Err(StoreError::NoData {
                key,
                received,
                dropped,
            });
        }

        let mut state = self.state.lock().await;
        if state.generation != generation || self.initial_seq.load(Ordering::SeqCst) != seq {
            debug!("Discarding stale initial load #{} for {}", seq, key);
            return Err(StoreError::Stale {
                class: RequestClass::Initial,
                seq,
            });
        }

        // A new series invalidates any history page fetched for the old one.
        state.generation += 1;
        state.key = Some(key.clone());
        state.series = Some(series.clone());
        state.range = Some(range);
        state.history_start = Some(range.start);

        if dropped.total() > 0 {
            warn!("Initial load #{} for {}: {}", seq, key, dropped);
        }
        info!(
            "Loaded {} candles for {} from {} records",
            series.len(),
            key,
            received
        );

        Ok(LoadOutcome {
            added: series.len(),
            series,
            seq,
            received,
            dropped,
        })
    }

    /// Fetch an older range and merge it into the current series.
    ///
    /// Candles already in the series win over fetched candles with the same
    /// key. On any failure the current series is left untouched.
    pub async fn load_more(&self, older: DateRange) -> Result<LoadOutcome, StoreError> {
        let _in_flight = InFlight::acquire(&self.more_in_flight, RequestClass::More)?;
        let seq = self.more_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let (key, generation) = {
            let state = self.state.lock().await;
            match (&state.key, &state.series) {
                (Some(key), Some(_)) => (key.clone(), state.generation),
                _ => return Err(StoreError::NoSeries),
            }
        };

        info!("Load more #{} for {} {} → {}", seq, key, older.start, older.end);

        let request = OhlcRequest::new(&key.ticker, key.granularity, older);
        let records = self.feed.fetch_ohlc(&request).await.map_err(|e| {
            warn!("Load more #{} for {} failed: {}", seq, key, e);
            StoreError::Fetch(e)
        })?;

        let received = records.len();
        let (candles, mut dropped) = ingest(&records, key.granularity);
        let (incoming, duplicates) = CandleSeries::from_unsorted(candles);
        dropped.duplicates = duplicates;

        if incoming.is_empty() {
            // An empty window still moves the paging cursor past it.
            let mut state = self.state.lock().await;
            if state.generation == generation {
                state.mark_requested(older.start);
            }
            warn!(
                "Load more #{} for {}: no valid candles out of {} records",
                seq, key, received
            );
            return Err(StoreError::NoData {
                key,
                received,
                dropped,
            });
        }

        let mut state = self.state.lock().await;
        let current = match (&state.series, state.generation == generation) {
            (Some(series), true) => series.clone(),
            _ => {
                debug!("Discarding stale load more #{} for {}", seq, key);
                return Err(StoreError::Stale {
                    class: RequestClass::More,
                    seq,
                });
            }
        };

        let (merged, stats) = current.merge(&incoming);
        state.series = Some(merged.clone());
        state.range = state.range.map(|r| DateRange::new(r.start.min(older.start), r.end));
        state.mark_requested(older.start);

        if stats.conflicts > 0 {
            debug!(
                "Load more #{} for {}: kept {} existing candles over refetched ones",
                seq, key, stats.conflicts
            );
        }
        info!(
            "Merged {} older candles into {} ({} total)",
            stats.added,
            key,
            merged.len()
        );

        Ok(LoadOutcome {
            series: merged,
            seq,
            received,
            added: stats.added,
            dropped,
        })
    }

    /// Drop the current series; responses still in flight become stale.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        state.clear();
        state.generation += 1;
        debug!("Candle store reset (generation {})", state.generation);
    }

    /// Read-only snapshot of the current series.
    pub async fn series(&self) -> Option<CandleSeries> {
        self.state.lock().await.series.clone()
    }

    pub async fn key(&self) -> Option<SeriesKey> {
        self.state.lock().await.key.clone()
    }

    /// Date range the current series was built from, widened by history pages.
    pub async fn loaded_range(&self) -> Option<DateRange> {
        self.state.lock().await.range
    }

    /// The `days`-long window just before the oldest day requested so far.
    ///
    /// Unlike [`loaded_range`](Self::loaded_range) this also steps past
    /// history pages that came back empty.
    pub async fn next_history_range(&self, days: u32) -> Option<DateRange> {
        let state = self.state.lock().await;
        state.series.as_ref()?;
        let start = state.history_start?;
        Some(DateRange::new(start, start).preceding(days))
    }

    pub fn is_busy(&self, class: RequestClass) -> bool {
        match class {
            RequestClass::Initial => self.initial_in_flight.load(Ordering::Acquire),
            RequestClass::More => self.more_in_flight.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::MockFeed;
    use crate::feed::mock::raw_record;
    use chrono::NaiveDate;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn june() -> DateRange {
        DateRange::new(day("2025-06-01"), day("2025-06-30"))
    }

    #[tokio::test]
    async fn test_load_more_without_series() {
        let store = CandleStore::new(MockFeed::new(Vec::new()));
        assert!(matches!(
            store.load_more(june()).await,
            Err(StoreError::NoSeries)
        ));
    }

    #[tokio::test]
    async fn test_initial_load_sorts_and_dedups() {
        let store = CandleStore::new(MockFeed::new(vec![
            raw_record("2025-06-03", 10.0, 11.0, 9.0, 10.0),
            raw_record("2025-06-02", 10.0, 11.0, 9.0, 10.0),
            raw_record("2025-06-03T15:30:00Z", 20.0, 21.0, 19.0, 20.0),
        ]));

        let outcome = store
            .load_initial("abb", Granularity::Day1, june())
            .await
            .unwrap();

        assert_eq!(outcome.series.len(), 2);
        assert_eq!(outcome.dropped.duplicates, 1);
        assert_eq!(outcome.series.last().unwrap().open, 10.0);
        assert_eq!(store.key().await, Some(SeriesKey::new("ABB", Granularity::Day1)));
        assert!(!store.is_busy(RequestClass::Initial));
    }

    #[tokio::test]
    async fn test_reset_discards_series() {
        let store = CandleStore::new(MockFeed::new(vec![raw_record(
            "2025-06-03",
            10.0,
            11.0,
            9.0,
            10.0,
        )]));
        store
            .load_initial("ABB", Granularity::Day1, june())
            .await
            .unwrap();

        store.reset().await;
        assert!(store.series().await.is_none());
        assert!(matches!(
            store.load_more(june()).await,
            Err(StoreError::NoSeries)
        ));
    }
}
