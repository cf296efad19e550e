//! Chart surface module
//!
//! A surface is whatever the chart is drawn into; its size becomes known
//! asynchronously. The [`SurfaceController`] waits for a usable size, owns the
//! rendering engine for one ticker/granularity and tears it down again.

pub mod controller;
pub mod terminal;

use serde::Serialize;
use std::fmt;

use crate::market_data::CandleSeries;
use crate::zones::PriceLineAnnotation;

pub use controller::{
    ChartSurfaceState, ListenerId, PollStatus, Readiness, SurfaceConfig, SurfaceController,
    SurfaceError, SurfacePhase, SurfaceSlot, SurfaceTimeout,
};
pub use terminal::{TerminalEngine, TerminalSurface};

/// Width and height of a surface in engine units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_positive(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Layout measurements of a rendering surface.
///
/// Any accessor may report nothing or a zero size while layout is still
/// settling.
pub trait Surface {
    /// Size as laid out, including borders.
    fn rendered_box(&self) -> Option<Dimensions>;

    /// Inner content size.
    fn content_box(&self) -> Option<Dimensions>;

    /// Size of the bounding rectangle.
    fn bounding_rect(&self) -> Option<Dimensions>;

    /// First accessor reporting a non-zero width and height.
    fn measure(&self) -> Option<Dimensions> {
        [self.rendered_box(), self.content_box(), self.bounding_rect()]
            .into_iter()
            .flatten()
            .find(Dimensions::is_positive)
    }
}

/// Rendering engine fed by the controller.
pub trait ChartEngine {
    fn resize(&mut self, size: Dimensions);

    /// Replace the whole candle series.
    fn set_candles(&mut self, series: &CandleSeries);

    /// Replace the whole set of price lines.
    fn set_price_lines(&mut self, lines: &[PriceLineAnnotation]);

    /// Scale the time axis so every candle is visible.
    fn fit_content(&mut self);

    /// Free everything the engine holds. Called exactly once, on disposal.
    fn release(&mut self);
}
