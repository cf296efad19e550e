//! Action Channel for asynchronous event reporting

use anyhow::Result;
use tokio::sync::mpsc;

use crate::market_data::{DropCounts, SeriesKey};
use crate::metrics::FetchSnapshot;
use crate::surface::{Dimensions, SurfaceTimeout};
use crate::zones::ZoneRenderError;

/// Status events emitted by a chart session
#[derive(Debug, Clone)]
pub enum ChartEvent {
    /// Surface measured and engine created
    SurfaceReady { size: Dimensions },
    /// Readiness polling gave up; engine runs at the fallback size
    SurfaceTimeout(SurfaceTimeout),
    /// A full series replaced whatever was displayed
    SeriesLoaded {
        key: SeriesKey,
        candles: usize,
        seq: u64,
    },
    /// Older candles merged into the displayed series
    HistoryExtended {
        key: SeriesKey,
        added: usize,
        total: usize,
    },
    /// Records dropped during ingestion
    RecordsDropped { key: SeriesKey, dropped: DropCounts },
    /// The price-line set was recomputed and replaced
    AnnotationsReplaced {
        lines: usize,
        skipped: Vec<ZoneRenderError>,
    },
    /// The surface was torn down for a rebuild
    Rebuilding { reason: String },
    /// Fetch metrics after a load
    MetricsUpdate { metrics: FetchSnapshot },
    /// Error event
    Error { message: String },
}

/// Action channel for event processing
pub struct ActionChannel {
    /// Event sender
    event_tx: mpsc::UnboundedSender<ChartEvent>,
    /// Event receiver
    event_rx: Option<mpsc::UnboundedReceiver<ChartEvent>>,
}

impl Clone for ActionChannel {
    fn clone(&self) -> Self {
        Self {
            event_tx: self.event_tx.clone(),
            event_rx: None,
        }
    }
}

impl ActionChannel {
    pub fn new() -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Self {
            event_tx,
            event_rx: Some(event_rx),
        }
    }

    /// Send event to channel
    pub fn send_event(&self, event: ChartEvent) -> Result<()> {
        self.event_tx
            .send(event)
            .map_err(|e| anyhow::anyhow!("Failed to send event: {}", e))
    }

    /// Get next event from channel
    pub async fn next_event(&mut self) -> Option<ChartEvent> {
        match &mut self.event_rx {
            Some(event_rx) => event_rx.recv().await,
            None => None,
        }
    }

    /// Events already queued, without waiting.
    pub fn drain(&mut self) -> Vec<ChartEvent> {
        let mut events = Vec::new();
        if let Some(event_rx) = &mut self.event_rx {
            while let Ok(event) = event_rx.try_recv() {
                events.push(event);
            }
        }
        events
    }

    /// Take the receiver for use elsewhere.
    pub fn event_rx(&mut self) -> Option<mpsc::UnboundedReceiver<ChartEvent>> {
        self.event_rx.take()
    }

    pub fn send_error(&self, message: String) -> Result<()> {
        self.send_event(ChartEvent::Error { message })
    }

    pub fn is_closed(&self) -> bool {
        self.event_tx.is_closed()
    }
}

impl Default for ActionChannel {
    fn default() -> Self {
        Self::new()
    }
}
