//! Chart session: the pipeline that ties store, annotator and surface together
//!
//! `start` waits for the surface, performs the initial load, annotates the
//! current zones and hands both to the engine. A ticker or interval change
//! disposes the surface controller, resets the store and runs the pipeline
//! again; "load more" only re-enters the store merge.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::action_channel::{ActionChannel, ChartEvent};
use crate::config::Config;
use crate::feed::{DateRange, FeedError, OhlcFeed, ZoneSource, default_range, normalize_ticker};
use crate::market_data::{
    CandleSeries, CandleStore, Granularity, LoadOutcome, RequestClass, SeriesKey, StoreError,
};
use crate::metrics::FetchMetrics;
use crate::surface::{
    ChartEngine, ChartSurfaceState, Dimensions, Readiness, Surface, SurfaceConfig,
    SurfaceController, SurfaceError, SurfaceSlot,
};
use crate::zones::{PriceLineAnnotation, Zone, annotate_with_report};

/// Knobs for one chart session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub surface: SurfaceConfig,
    /// Days covered by the initial load when no range is given
    pub lookback_days: u32,
    /// Days fetched per "load more" page
    pub load_more_days: u32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            surface: SurfaceConfig {
                poll_interval: Duration::from_millis(config.chart.poll_interval_ms),
                max_attempts: config.chart.max_poll_attempts,
                fallback: Dimensions::new(
                    config.chart.fallback_width,
                    config.chart.fallback_height,
                ),
            },
            lookback_days: config.feed.lookback_days,
            load_more_days: config.chart.load_more_days,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            surface: SurfaceConfig::default(),
            lookback_days: 365,
            load_more_days: 365,
        }
    }
}

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Surface(#[from] SurfaceError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("zone fetch failed: {0}")]
    Zones(#[source] FeedError),
}

type SharedFactory<E> = Arc<dyn Fn(Dimensions) -> E + Send + Sync>;

/// One chart: a ticker/granularity pair drawn onto one surface.
pub struct ChartSession<F: OhlcFeed, E: ChartEngine + 'static> {
    store: CandleStore<F>,
    controller: SurfaceController<E>,
    factory: SharedFactory<E>,
    slot: SurfaceSlot,
    settings: SessionSettings,
    ticker: String,
    granularity: Granularity,
    range: Option<DateRange>,
    zones: Vec<Zone>,
    annotations: Vec<PriceLineAnnotation>,
    channel: ActionChannel,
    metrics: FetchMetrics,
}

impl<F: OhlcFeed, E: ChartEngine + 'static> ChartSession<F, E> {
    /// Create a session; `factory` builds a fresh engine for every surface.
    pub fn new(
        feed: F,
        ticker: &str,
        granularity: Granularity,
        settings: SessionSettings,
        factory: impl Fn(Dimensions) -> E + Send + Sync + 'static,
    ) -> Self {
        let factory: SharedFactory<E> = Arc::new(factory);
        let controller = Self::controller_for(&factory, settings.surface);

        Self {
            store: CandleStore::new(feed),
            controller,
            factory,
            slot: SurfaceSlot::new(),
            settings,
            ticker: normalize_ticker(ticker),
            granularity,
            range: None,
            zones: Vec::new(),
            annotations: Vec::new(),
            channel: ActionChannel::new(),
            metrics: FetchMetrics::default(),
        }
    }

    /// Load `range` instead of the default lookback window.
    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Draw onto a shared surface slot.
    pub fn with_slot(mut self, slot: SurfaceSlot) -> Self {
        self.slot = slot;
        self
    }

    fn controller_for(factory: &SharedFactory<E>, config: SurfaceConfig) -> SurfaceController<E> {
        let factory = Arc::clone(factory);
        SurfaceController::new(config, move |size| factory(size))
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn key(&self) -> SeriesKey {
        SeriesKey::new(&self.ticker, self.granularity)
    }

    pub fn surface_state(&self) -> ChartSurfaceState {
        self.controller.state()
    }

    pub fn engine(&self) -> Option<&E> {
        self.controller.engine()
    }

    pub fn store(&self) -> &CandleStore<F> {
        &self.store
    }

    pub async fn series(&self) -> Option<CandleSeries> {
        self.store.series().await
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// The annotation set last handed to the engine.
    pub fn annotations(&self) -> &[PriceLineAnnotation] {
        &self.annotations
    }

    pub fn metrics(&self) -> &FetchMetrics {
        &self.metrics
    }

    /// Sender side for additional reporters.
    pub fn channel(&self) -> ActionChannel {
        self.channel.clone()
    }

    /// Events queued since the last call.
    pub fn drain_events(&mut self) -> Vec<ChartEvent> {
        self.channel.drain()
    }

    /// Wait for the surface, then load, annotate and render.
    pub async fn start<S: Surface + ?Sized>(
        &mut self,
        surface: &S,
    ) -> Result<LoadOutcome, SessionError> {
        self.controller.attach(&self.slot)?;

        match self.controller.wait_ready(surface).await? {
            Readiness::Measured(size) => self.emit(ChartEvent::SurfaceReady { size }),
            Readiness::Fallback(timeout) => self.emit(ChartEvent::SurfaceTimeout(timeout)),
        }

        self.load_initial().await
    }

    async fn load_initial(&mut self) -> Result<LoadOutcome, SessionError> {
        let range = self
            .range
            .unwrap_or_else(|| default_range(self.settings.lookback_days));

        let started = Instant::now();
        let result = self
            .store
            .load_initial(&self.ticker, self.granularity, range)
            .await;
        let outcome = self.track(RequestClass::Initial, started, result)?;

        if let Some(engine) = self.controller.engine_mut() {
            engine.set_candles(&outcome.series);
        }
        self.render_annotations();
        if let Some(engine) = self.controller.engine_mut() {
            engine.fit_content();
        }

        self.emit(ChartEvent::SeriesLoaded {
            key: self.key(),
            candles: outcome.series.len(),
            seq: outcome.seq,
        });
        Ok(outcome)
    }

    /// Fetch the page of history just before the loaded range and merge it.
    pub async fn load_more(&mut self) -> Result<LoadOutcome, SessionError> {
        let older = self
            .store
            .next_history_range(self.settings.load_more_days)
            .await
            .ok_or(StoreError::NoSeries)?;

        let started = Instant::now();
        let result = self.store.load_more(older).await;
        let outcome = self.track(RequestClass::More, started, result)?;

        if let Some(engine) = self.controller.engine_mut() {
            engine.set_candles(&outcome.series);
        }

        self.emit(ChartEvent::HistoryExtended {
            key: self.key(),
            added: outcome.added,
            total: outcome.series.len(),
        });
        Ok(outcome)
    }

    /// Replace the zone list and redraw every price line.
    pub fn set_zones(&mut self, zones: Vec<Zone>) -> &[PriceLineAnnotation] {
        self.zones = zones;
        self.render_annotations();
        &self.annotations
    }

    /// Fetch the current zones for this ticker and draw them.
    pub async fn refresh_zones<Z: ZoneSource + ?Sized>(
        &mut self,
        source: &Z,
    ) -> Result<usize, SessionError> {
        let zones = source
            .fetch_zones(&self.ticker, self.granularity)
            .await
            .map_err(|e| {
                warn!("Zone fetch for {} failed: {}", self.ticker, e);
                SessionError::Zones(e)
            })?;

        let count = zones.len();
        self.set_zones(zones);
        Ok(count)
    }

    /// Switch ticker; zones belong to the old ticker and are cleared.
    pub async fn change_ticker<S: Surface + ?Sized>(
        &mut self,
        ticker: &str,
        surface: &S,
    ) -> Result<LoadOutcome, SessionError> {
        let ticker = normalize_ticker(ticker);
        if ticker != self.ticker {
            self.zones.clear();
            self.annotations.clear();
        }
        let reason = format!("ticker {} → {}", self.ticker, ticker);
        self.ticker = ticker;
        self.rebuild(surface, reason).await
    }

    pub async fn change_interval<S: Surface + ?Sized>(
        &mut self,
        granularity: Granularity,
        surface: &S,
    ) -> Result<LoadOutcome, SessionError> {
        let reason = format!("interval {} → {}", self.granularity, granularity);
        self.granularity = granularity;
        self.rebuild(surface, reason).await
    }

    async fn rebuild<S: Surface + ?Sized>(
        &mut self,
        surface: &S,
        reason: String,
    ) -> Result<LoadOutcome, SessionError> {
        info!("Rebuilding chart: {}", reason);
        self.emit(ChartEvent::Rebuilding { reason });

        // The old engine must be gone before the replacement claims the slot.
        self.controller.dispose();
        self.store.reset().await;
        self.controller = Self::controller_for(&self.factory, self.settings.surface);

        self.start(surface).await
    }

    /// Forward a resize of the surface to the engine.
    pub fn on_resize<S: Surface + ?Sized>(&mut self, surface: &S) -> Option<Dimensions> {
        self.controller.on_resize(surface)
    }

    /// Tear down the surface; the session can be restarted with `start`.
    pub async fn dispose(&mut self) {
        self.controller.dispose();
        self.store.reset().await;
        self.controller = Self::controller_for(&self.factory, self.settings.surface);
    }

    fn render_annotations(&mut self) {
        let set = annotate_with_report(&self.zones);
        self.annotations = set.lines;

        if let Some(engine) = self.controller.engine_mut() {
            engine.set_price_lines(&self.annotations);
        }

        debug!(
            "Annotated {} zones into {} price lines ({} skipped)",
            self.zones.len(),
            self.annotations.len(),
            set.skipped.len()
        );
        self.emit(ChartEvent::AnnotationsReplaced {
            lines: self.annotations.len(),
            skipped: set.skipped,
        });
    }

    /// Fold a store result into the metrics and report it.
    fn track(
        &mut self,
        class: RequestClass,
        started: Instant,
        result: Result<LoadOutcome, StoreError>,
    ) -> Result<LoadOutcome, StoreError> {
        let elapsed = started.elapsed();

        match &result {
            Ok(outcome) => {
                self.metrics
                    .record_load(class, elapsed, outcome.received, &outcome.dropped);
                if outcome.dropped.total() > 0 {
                    self.emit(ChartEvent::RecordsDropped {
                        key: self.key(),
                        dropped: outcome.dropped,
                    });
                }
            }
            Err(StoreError::NoData {
                key,
                received,
                dropped,
            }) => {
                self.metrics.record_failure(elapsed);
                self.metrics.record_dropped(*received, dropped);
                self.emit(ChartEvent::RecordsDropped {
                    key: key.clone(),
                    dropped: *dropped,
                });
            }
            Err(StoreError::Fetch(_)) => self.metrics.record_failure(elapsed),
            Err(StoreError::Stale { .. }) => self.metrics.record_stale(),
            Err(StoreError::Busy(_)) | Err(StoreError::NoSeries) => {}
        }

        if let Err(e) = &result {
            self.emit(ChartEvent::Error {
                message: e.to_string(),
            });
        }
        self.emit(ChartEvent::MetricsUpdate {
            metrics: self.metrics.snapshot(),
        });

        result
    }

    fn emit(&self, event: ChartEvent) {
        if let Err(e) = self.channel.send_event(event) {
            debug!("Dropping chart event: {}", e);
        }
    }
}
