//! End-to-end chart pipeline with a recording engine

use chrono::NaiveDate;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use zonechart::feed::mock::raw_record;
use zonechart::feed::{DateRange, MockFeed, RawCandle};
use zonechart::market_data::{CandleSeries, Granularity, StoreError};
use zonechart::session::{ChartEvent, ChartSession, SessionError, SessionSettings};
use zonechart::surface::{
    ChartEngine, Dimensions, Surface, SurfaceConfig, SurfaceError, SurfacePhase, SurfaceSlot,
};
use zonechart::zones::{Pattern, PriceLineAnnotation, Zone};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Created(Dimensions),
    Resize(Dimensions),
    Candles(usize),
    Lines(usize),
    Fit,
    Release,
}

type CallLog = Arc<Mutex<Vec<Call>>>;

struct RecordingEngine {
    log: CallLog,
}

impl ChartEngine for RecordingEngine {
    fn resize(&mut self, size: Dimensions) {
        self.log.lock().unwrap().push(Call::Resize(size));
    }
    fn set_candles(&mut self, series: &CandleSeries) {
        self.log.lock().unwrap().push(Call::Candles(series.len()));
    }
    fn set_price_lines(&mut self, lines: &[PriceLineAnnotation]) {
        self.log.lock().unwrap().push(Call::Lines(lines.len()));
    }
    fn fit_content(&mut self) {
        self.log.lock().unwrap().push(Call::Fit);
    }
    fn release(&mut self) {
        self.log.lock().unwrap().push(Call::Release);
    }
}

/// Surface with a fixed size; zero means "not laid out yet".
struct FixedSurface(Mutex<Dimensions>);

impl FixedSurface {
    fn new(width: u32, height: u32) -> Self {
        Self(Mutex::new(Dimensions::new(width, height)))
    }

    fn set(&self, width: u32, height: u32) {
        *self.0.lock().unwrap() = Dimensions::new(width, height);
    }
}

impl Surface for FixedSurface {
    fn rendered_box(&self) -> Option<Dimensions> {
        Some(*self.0.lock().unwrap())
    }
    fn content_box(&self) -> Option<Dimensions> {
        None
    }
    fn bounding_rect(&self) -> Option<Dimensions> {
        None
    }
}

fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn june() -> DateRange {
    DateRange::new(day("2025-06-01"), day("2025-06-30"))
}

fn daily_records(start: &str, count: u32) -> Vec<RawCandle> {
    (0..count)
        .map(|i| {
            let date = day(start) + chrono::Duration::days(i64::from(i));
            raw_record(&date.format("%Y-%m-%d").to_string(), 100.0, 102.0, 98.0, 101.0)
        })
        .collect()
}

fn settings(max_attempts: u32) -> SessionSettings {
    SessionSettings {
        surface: SurfaceConfig {
            poll_interval: Duration::from_millis(1),
            max_attempts,
            fallback: Dimensions::new(800, 500),
        },
        lookback_days: 30,
        load_more_days: 31,
    }
}

fn session_with(
    feed: MockFeed,
    max_attempts: u32,
) -> (ChartSession<MockFeed, RecordingEngine>, CallLog) {
    let log: CallLog = Arc::default();
    let factory_log = log.clone();
    let factory = move |size| {
        factory_log.lock().unwrap().push(Call::Created(size));
        RecordingEngine {
            log: factory_log.clone(),
        }
    };
    let session = ChartSession::new(
        feed,
        "RELIANCE.NS",
        Granularity::Day1,
        settings(max_attempts),
        factory,
    )
    .with_range(june());
    (session, log)
}

fn zone_with_nested() -> Zone {
    Zone::new("z1", 100.5, 95.0, Pattern::Rbr)
        .with_lower_zones(vec![Zone::new("z1-ltf", 98.0, 96.5, Pattern::Rbr)])
}

#[tokio::test]
async fn test_pipeline_order() {
    let (mut session, log) = session_with(MockFeed::new(daily_records("2025-06-01", 10)), 30);
    session.set_zones(vec![zone_with_nested()]);

    session.start(&FixedSurface::new(1024, 500)).await.unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            Call::Created(Dimensions::new(1024, 500)),
            Call::Candles(10),
            Call::Lines(4),
            Call::Fit,
        ]
    );
    assert_eq!(session.ticker(), "RELIANCE");
}

#[tokio::test]
async fn test_zone_updates_replace_lines() {
    let (mut session, log) = session_with(MockFeed::new(daily_records("2025-06-01", 3)), 30);
    session.start(&FixedSurface::new(640, 400)).await.unwrap();
    log.lock().unwrap().clear();

    let zones = vec![zone_with_nested(), Zone::new("z2", 80.0, 78.0, Pattern::Dbr)];
    let first = session.set_zones(zones.clone()).to_vec();
    let second = session.set_zones(zones).to_vec();

    assert_eq!(first, second);
    assert_eq!(second.len(), 6);
    assert_eq!(*log.lock().unwrap(), vec![Call::Lines(6), Call::Lines(6)]);

    session.set_zones(Vec::new());
    assert_eq!(log.lock().unwrap().last(), Some(&Call::Lines(0)));
}

#[tokio::test]
async fn test_surface_timeout_uses_fallback() {
    let (mut session, log) = session_with(MockFeed::new(daily_records("2025-06-01", 3)), 3);
    session.start(&FixedSurface::new(0, 0)).await.unwrap();

    let state = session.surface_state();
    assert_eq!(state.phase, SurfacePhase::Ready);
    assert_eq!((state.width, state.height, state.retry_count), (800, 500, 3));
    assert_eq!(log.lock().unwrap()[0], Call::Created(Dimensions::new(800, 500)));
    assert!(
        session
            .drain_events()
            .iter()
            .any(|e| matches!(e, ChartEvent::SurfaceTimeout(t) if t.attempts == 3))
    );
}

#[tokio::test]
async fn test_resize_propagates_width() {
    let surface = FixedSurface::new(1024, 500);
    let (mut session, log) = session_with(MockFeed::new(daily_records("2025-06-01", 3)), 30);
    session.start(&surface).await.unwrap();

    surface.set(1280, 720);
    assert_eq!(session.on_resize(&surface), Some(Dimensions::new(1280, 500)));
    assert_eq!(log.lock().unwrap().last(), Some(&Call::Resize(Dimensions::new(1280, 500))));
    assert_eq!(session.surface_state().phase, SurfacePhase::Ready);
}

#[tokio::test]
async fn test_interval_change_rebuilds_after_release() {
    let surface = FixedSurface::new(1024, 500);
    let (mut session, log) = session_with(MockFeed::new(daily_records("2025-06-01", 5)), 30);
    session.set_zones(vec![zone_with_nested()]);
    session.start(&surface).await.unwrap();
    log.lock().unwrap().clear();

    session
        .change_interval(Granularity::Week1, &surface)
        .await
        .unwrap();

    let calls = log.lock().unwrap().clone();
    assert_eq!(calls[0], Call::Release);
    assert_eq!(calls[1], Call::Created(Dimensions::new(1024, 500)));
    assert_eq!(calls.iter().filter(|c| matches!(c, Call::Created(_))).count(), 1);
    assert_eq!(session.granularity(), Granularity::Week1);
    // Zones belong to the ticker and survive an interval change.
    assert_eq!(session.annotations().len(), 4);
}

#[tokio::test]
async fn test_ticker_change_clears_zones() {
    let surface = FixedSurface::new(1024, 500);
    let (mut session, _log) = session_with(MockFeed::new(daily_records("2025-06-01", 5)), 30);
    session.set_zones(vec![zone_with_nested()]);
    session.start(&surface).await.unwrap();

    session.change_ticker("tcs", &surface).await.unwrap();

    assert_eq!(session.ticker(), "TCS");
    assert!(session.annotations().is_empty());
    let requests = session.store().feed().requests().await;
    assert_eq!(requests.last().unwrap().ticker, "TCS");
}

#[tokio::test]
async fn test_load_more_merges_without_refit() {
    let mut records = daily_records("2025-06-01", 30);
    records.extend(daily_records("2025-05-01", 31));
    let (mut session, log) = session_with(MockFeed::new(records), 30);
    session.start(&FixedSurface::new(1024, 500)).await.unwrap();
    log.lock().unwrap().clear();

    let outcome = session.load_more().await.unwrap();

    assert_eq!(outcome.added, 31);
    assert_eq!(*log.lock().unwrap(), vec![Call::Candles(61)]);
    assert!(session.drain_events().iter().any(|e| matches!(
        e,
        ChartEvent::HistoryExtended {
            added: 31,
            total: 61,
            ..
        }
    )));

    // Nothing older exists: the series stays as it is.
    let err = session.load_more().await.unwrap_err();
    assert!(matches!(err, SessionError::Store(StoreError::NoData { .. })));
    assert_eq!(session.series().await.unwrap().len(), 61);
}

#[tokio::test]
async fn test_load_more_steps_over_empty_window() {
    let records = vec![
        raw_record("2025-06-02", 100.0, 102.0, 98.0, 101.0),
        raw_record("2025-04-10", 90.0, 92.0, 88.0, 91.0),
    ];
    let (mut session, _log) = session_with(MockFeed::new(records), 30);
    session.start(&FixedSurface::new(1024, 500)).await.unwrap();

    let gap = session.load_more().await.unwrap_err();
    assert!(matches!(gap, SessionError::Store(StoreError::NoData { .. })));
    let outcome = session.load_more().await.unwrap();

    assert_eq!(outcome.added, 1);
    assert_eq!(session.series().await.unwrap().len(), 2);
    let requests = session.store().feed().requests().await;
    assert_ne!(requests[1].range, requests[2].range);
}

#[tokio::test]
async fn test_zones_from_source() {
    let feed = MockFeed::new(daily_records("2025-06-01", 3)).with_zones(vec![zone_with_nested()]);
    let source = MockFeed::new(Vec::new()).with_zones(vec![zone_with_nested()]);
    let (mut session, _log) = session_with(feed, 30);

    assert_eq!(session.refresh_zones(&source).await.unwrap(), 1);
    session.start(&FixedSurface::new(800, 400)).await.unwrap();
    assert_eq!(session.annotations().len(), 4);
}

#[tokio::test]
async fn test_one_live_engine_per_surface() {
    let slot = SurfaceSlot::new();
    let surface = FixedSurface::new(800, 400);
    let (first, _) = session_with(MockFeed::new(daily_records("2025-06-01", 3)), 30);
    let (second, _) = session_with(MockFeed::new(daily_records("2025-06-01", 3)), 30);
    let mut first = first.with_slot(slot.clone());
    let mut second = second.with_slot(slot.clone());

    first.start(&surface).await.unwrap();
    let err = second.start(&surface).await.unwrap_err();
    assert!(matches!(err, SessionError::Surface(SurfaceError::AlreadyOwned)));

    first.dispose().await;
    assert!(!slot.is_claimed());
    second.start(&surface).await.unwrap();
    assert_eq!(second.surface_state().phase, SurfacePhase::Ready);
}
