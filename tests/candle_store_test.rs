//! Candle store behaviour against the in-memory feed

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_test::{assert_err, assert_ok};
use zonechart::feed::mock::raw_record;
use zonechart::feed::{DateRange, FeedError, MockFeed, OhlcFeed, OhlcRequest, RawCandle};
use zonechart::market_data::{CandleStore, Granularity, RequestClass, StoreError, TimeKey};

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn june() -> DateRange {
    DateRange::new(day("2025-06-01"), day("2025-06-30"))
}

fn may() -> DateRange {
    DateRange::new(day("2025-05-01"), day("2025-05-31"))
}

fn good_days(range: DateRange, count: u32) -> Vec<RawCandle> {
    (0..count)
        .map(|i| {
            let date = range.start + chrono::Duration::days(i64::from(i));
            let base = 100.0 + f64::from(i);
            let date = date.format("%Y-%m-%d").to_string();
            raw_record(&date, base, base + 2.0, base - 2.0, base + 1.0)
        })
        .collect()
}

#[tokio::test]
async fn test_series_is_ascending_and_unique_for_messy_feed() {
    let records = vec![
        raw_record("2025-06-05", 10.0, 11.0, 9.0, 10.5),
        RawCandle::from_json(json!({
            "datetime": 1748908800000_i64,
            "open": "10", "high": "11", "low": "9", "close": "10.5"
        })),
        raw_record("2025-06-03T00:00:00.000Z", 10.0, 11.0, 9.0, 10.5),
        raw_record("2025-06-05T15:30:00+05:30", 12.0, 13.0, 11.0, 12.5),
        raw_record("not a date", 10.0, 11.0, 9.0, 10.5),
        raw_record("2025-06-04", 10.0, 11.0, 9.0, 10.5),
    ];
    let store = CandleStore::new(MockFeed::new(records));

    let outcome = assert_ok!(store.load_initial("TEST", Granularity::Day1, june()).await);

    assert!(outcome.series.is_strictly_ascending());
    let keys: Vec<String> = outcome.series.iter().map(|c| c.time.to_string()).collect();
    assert_eq!(keys, vec!["2025-06-03", "2025-06-04", "2025-06-05"]);
    assert_eq!(outcome.dropped.unparseable, 1);
    // 1748908800000 ms and the ISO string both land on 2025-06-03.
    assert_eq!(outcome.dropped.duplicates, 2);
    // First occurrence wins.
    let kept = outcome
        .series
        .get(&TimeKey::Day(day("2025-06-05")))
        .unwrap();
    assert_eq!(kept.open, 10.0);
}

#[tokio::test]
async fn test_one_bad_record_out_of_ten() {
    let mut records = good_days(june(), 9);
    records.insert(4, raw_record("2025-06-20", 100.0, 90.0, 95.0, 96.0));
    let store = CandleStore::new(MockFeed::new(records));

    let outcome = store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    assert_eq!(outcome.received, 10);
    assert_eq!(outcome.series.len(), 9);
    assert_eq!(outcome.dropped.invalid_ohlc, 1);
    assert!(outcome.series.get(&TimeKey::Day(day("2025-06-20"))).is_none());
}

#[tokio::test]
async fn test_no_valid_candles_is_an_error() {
    let store = CandleStore::new(MockFeed::new(vec![raw_record(
        "2025-06-02",
        100.0,
        90.0,
        95.0,
        96.0,
    )]));

    let err = assert_err!(store.load_initial("TEST", Granularity::Day1, june()).await);
    match err {
        StoreError::NoData {
            received, dropped, ..
        } => {
            assert_eq!(received, 1);
            assert_eq!(dropped.invalid_ohlc, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.series().await.is_none());
}

#[tokio::test]
async fn test_fully_overlapping_load_more_changes_nothing() {
    let store = CandleStore::new(MockFeed::new(good_days(june(), 20)));
    let initial = store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    let merged = store.load_more(june()).await.unwrap();

    assert_eq!(merged.added, 0);
    assert_eq!(merged.series, initial.series);
}

#[tokio::test]
async fn test_load_more_prepends_older_history() {
    let mut records = good_days(june(), 10);
    records.extend(good_days(may(), 31));
    let store = CandleStore::new(MockFeed::new(records));
    store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    let outcome = store.load_more(may()).await.unwrap();

    assert_eq!(outcome.added, 31);
    assert_eq!(outcome.series.len(), 41);
    assert!(outcome.series.is_strictly_ascending());
    assert_eq!(
        outcome.series.first().unwrap().time,
        TimeKey::Day(day("2025-05-01"))
    );
    assert_eq!(store.loaded_range().await.unwrap().start, day("2025-05-01"));
}

#[tokio::test]
async fn test_existing_candles_win_on_merge() {
    let feed = MockFeed::new(vec![raw_record("2025-06-02", 10.0, 11.0, 9.0, 10.5)]);
    let store = CandleStore::new(feed);
    store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    store
        .feed()
        .set_records(vec![
            raw_record("2025-06-02", 50.0, 51.0, 49.0, 50.5),
            raw_record("2025-06-01", 20.0, 21.0, 19.0, 20.5),
        ])
        .await;
    let outcome = store.load_more(june()).await.unwrap();

    assert_eq!(outcome.added, 1);
    let kept = outcome.series.get(&TimeKey::Day(day("2025-06-02"))).unwrap();
    assert_eq!(kept.open, 10.0);
}

#[tokio::test]
async fn test_failed_load_more_keeps_series() {
    let store = CandleStore::new(MockFeed::new(good_days(june(), 5)));
    let before = store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap()
        .series;

    store
        .feed()
        .fail_next(FeedError::Http("connection reset".to_string()))
        .await;
    assert!(matches!(
        store.load_more(may()).await,
        Err(StoreError::Fetch(_))
    ));

    // An empty page is an error too and leaves the series alone.
    assert!(matches!(
        store.load_more(may()).await,
        Err(StoreError::NoData { .. })
    ));

    assert_eq!(store.series().await, Some(before));
}

#[tokio::test]
async fn test_overlapping_requests_are_rejected() {
    let (feed, gate) = MockFeed::new(good_days(june(), 5)).gated();
    let store = CandleStore::new(feed);

    let (first, second, _) = tokio::join!(
        store.load_initial("TEST", Granularity::Day1, june()),
        store.load_initial("TEST", Granularity::Day1, june()),
        async {
            tokio::task::yield_now().await;
            assert!(store.is_busy(RequestClass::Initial));
            gate.notify_one();
        }
    );

    assert!(first.is_ok());
    assert!(matches!(second, Err(StoreError::Busy(RequestClass::Initial))));
    assert!(!store.is_busy(RequestClass::Initial));
    assert_eq!(store.feed().call_count(), 1);

    let (more_a, more_b, _) = tokio::join!(
        store.load_more(may()),
        store.load_more(may()),
        async {
            tokio::task::yield_now().await;
            gate.notify_one();
        }
    );
    assert!(matches!(more_a, Err(StoreError::NoData { .. })));
    assert!(matches!(more_b, Err(StoreError::Busy(RequestClass::More))));
}

#[tokio::test]
async fn test_response_after_reset_is_stale() {
    let (feed, gate) = MockFeed::new(good_days(june(), 5)).gated();
    let store = CandleStore::new(feed);

    gate.notify_one();
    store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    let (late, _) = tokio::join!(store.load_more(june()), async {
        tokio::task::yield_now().await;
        store.reset().await;
        gate.notify_one();
    });

    assert!(matches!(
        late,
        Err(StoreError::Stale {
            class: RequestClass::More,
            ..
        })
    ));
    assert!(store.series().await.is_none());
}

/// Feed that holds requests ending before `cutoff` until notified.
struct HistoryGate {
    inner: MockFeed,
    cutoff: NaiveDate,
    gate: Arc<Notify>,
}

#[async_trait]
impl OhlcFeed for HistoryGate {
    async fn fetch_ohlc(&self, request: &OhlcRequest) -> Result<Vec<RawCandle>, FeedError> {
        if request.range.end < self.cutoff {
            self.gate.notified().await;
        }
        self.inner.fetch_ohlc(request).await
    }
}

#[tokio::test]
async fn test_history_page_is_stale_after_reload() {
    let mut records = good_days(june(), 5);
    records.extend(good_days(may(), 31));
    let gate = Arc::new(Notify::new());
    let store = CandleStore::new(HistoryGate {
        inner: MockFeed::new(records),
        cutoff: day("2025-06-01"),
        gate: gate.clone(),
    });
    store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    let (late, _) = tokio::join!(store.load_more(may()), async {
        tokio::task::yield_now().await;
        assert!(store.is_busy(RequestClass::More));
        store
            .load_initial("TEST", Granularity::Day1, june())
            .await
            .unwrap();
        gate.notify_one();
    });

    assert!(matches!(
        late,
        Err(StoreError::Stale {
            class: RequestClass::More,
            ..
        })
    ));
    assert_eq!(store.series().await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_empty_history_window_advances_paging() {
    let store = CandleStore::new(MockFeed::new(vec![
        raw_record("2025-06-02", 10.0, 11.0, 9.0, 10.5),
        raw_record("2025-04-10", 8.0, 9.0, 7.0, 8.5),
    ]));
    let before = store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap()
        .series;

    let gap = store.next_history_range(30).await.unwrap();
    assert_eq!(gap, DateRange::new(day("2025-05-01"), day("2025-05-31")));
    assert!(matches!(
        store.load_more(gap).await,
        Err(StoreError::NoData { .. })
    ));
    assert_eq!(store.series().await, Some(before));

    let next = store.next_history_range(30).await.unwrap();
    assert_eq!(next, DateRange::new(day("2025-03-31"), day("2025-04-30")));
    let outcome = store.load_more(next).await.unwrap();

    assert_eq!(outcome.added, 1);
    assert_eq!(outcome.series.first().unwrap().time, TimeKey::Day(day("2025-04-10")));
    assert_eq!(store.loaded_range().await.unwrap().start, day("2025-03-31"));
}

#[tokio::test]
async fn test_failed_history_fetch_keeps_paging_position() {
    let store = CandleStore::new(MockFeed::new(good_days(june(), 5)));
    store
        .load_initial("TEST", Granularity::Day1, june())
        .await
        .unwrap();

    let window = store.next_history_range(30).await.unwrap();
    store
        .feed()
        .fail_next(FeedError::Http("timed out".to_string()))
        .await;
    assert!(store.load_more(window).await.is_err());

    assert_eq!(store.next_history_range(30).await, Some(window));
}

#[tokio::test]
async fn test_switching_ticker_discards_old_series_first() {
    let store = CandleStore::new(MockFeed::new(good_days(june(), 5)));
    store
        .load_initial("ABB", Granularity::Day1, june())
        .await
        .unwrap();

    store
        .feed()
        .fail_next(FeedError::Status(503, "unavailable".to_string()))
        .await;
    assert!(
        store
            .load_initial("TCS", Granularity::Day1, june())
            .await
            .is_err()
    );

    assert!(store.series().await.is_none());
    assert!(store.key().await.is_none());
}

#[test]
fn test_intraday_keys_are_epoch_seconds() {
    tokio_test::block_on(async {
        let store = CandleStore::new(MockFeed::new(vec![
            raw_record("2025-06-20T09:15:00.000Z", 10.0, 11.0, 9.0, 10.5),
            raw_record("2025-06-20T10:15:00.000Z", 10.5, 11.5, 9.5, 11.0),
        ]));

        let outcome = store
            .load_initial("TEST", Granularity::Hour1, june())
            .await
            .unwrap();

        let keys: Vec<TimeKey> = outcome.series.iter().map(|c| c.time).collect();
        assert_eq!(keys, vec![TimeKey::Epoch(1750410900), TimeKey::Epoch(1750414500)]);
    });
}
