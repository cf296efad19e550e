//! Surface controller: readiness polling, resize propagation and teardown
//!
//! Lifecycle: `Unmounted → Polling → Ready → Disposed`. `Ready` stays
//! `Ready` across resizes. `Disposed` is terminal; a rebuild creates a new
//! controller after the old one has released the surface.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChartEngine, Dimensions, Surface};

/// Lifecycle phase of a surface controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SurfacePhase {
    Unmounted,
    Polling,
    Ready,
    Disposed,
}

impl fmt::Display for SurfacePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SurfacePhase::Unmounted => "unmounted",
            SurfacePhase::Polling => "polling",
            SurfacePhase::Ready => "ready",
            SurfacePhase::Disposed => "disposed",
        };
        f.write_str(name)
    }
}

/// Observable controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChartSurfaceState {
    pub phase: SurfacePhase,
    pub width: u32,
    pub height: u32,
    pub retry_count: u32,
}

impl Default for ChartSurfaceState {
    fn default() -> Self {
        Self {
            phase: SurfacePhase::Unmounted,
            width: 0,
            height: 0,
            retry_count: 0,
        }
    }
}

/// Polling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub poll_interval: Duration,
    pub max_attempts: u32,
    pub fallback: Dimensions,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_attempts: 30,
            fallback: Dimensions::new(800, 500),
        }
    }
}

/// Polling gave up; the chart runs at the fallback size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("surface not measurable after {attempts} attempts, using {fallback}")]
pub struct SurfaceTimeout {
    pub attempts: u32,
    pub fallback: Dimensions,
}

/// How the controller became ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Measured(Dimensions),
    Fallback(SurfaceTimeout),
}

impl Readiness {
    pub fn dimensions(&self) -> Dimensions {
        match self {
            Readiness::Measured(size) => *size,
            Readiness::Fallback(timeout) => timeout.fallback,
        }
    }
}

/// Result of one polling step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Pending { attempt: u32 },
    Ready(Readiness),
}

/// Error types for controller operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("surface already has a live chart engine")]
    AlreadyOwned,
    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        phase: SurfacePhase,
        operation: &'static str,
    },
}

/// Exclusive claim on one rendering surface.
///
/// At most one controller holds the slot at a time, so two live engines can
/// never share a surface. Clones refer to the same slot.
#[derive(Debug, Clone, Default)]
pub struct SurfaceSlot {
    claimed: Arc<AtomicBool>,
}

impl SurfaceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    fn claim(&self) -> Result<(), SurfaceError> {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SurfaceError::AlreadyOwned)
    }

    fn release(&self) {
        self.claimed.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ResizeListener = Box<dyn FnMut(Dimensions) + Send>;
type EngineFactory<E> = Box<dyn FnMut(Dimensions) -> E + Send>;

/// Owner of the rendering engine for one surface.
pub struct SurfaceController<E: ChartEngine> {
    config: SurfaceConfig,
    state: ChartSurfaceState,
    factory: EngineFactory<E>,
    engine: Option<E>,
    slot: Option<SurfaceSlot>,
    listeners: Vec<(ListenerId, ResizeListener)>,
    next_listener: u64,
}

impl<E: ChartEngine> SurfaceController<E> {
    /// Create a controller; `factory` builds the engine once a size is known.
    pub fn new(
        config: SurfaceConfig,
        factory: impl FnMut(Dimensions) -> E + Send + 'static,
    ) -> Self {
        Self {
            config,
            state: ChartSurfaceState::default(),
            factory: Box::new(factory),
            engine: None,
            slot: None,
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn state(&self) -> ChartSurfaceState {
        self.state
    }

    pub fn phase(&self) -> SurfacePhase {
        self.state.phase
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// The live engine, only while `Ready`.
    pub fn engine_mut(&mut self) -> Option<&mut E> {
        self.engine.as_mut()
    }

    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Attach to a surface and start polling for its size.
    pub fn attach(&mut self, slot: &SurfaceSlot) -> Result<(), SurfaceError> {
        self.expect_phase(SurfacePhase::Unmounted, "attach")?;
        slot.claim()?;
        self.slot = Some(slot.clone());
        self.state.phase = SurfacePhase::Polling;
        debug!("Surface attached, polling for layout");
        Ok(())
    }

    /// Measure once; becomes `Ready` on a usable size or when attempts run out.
    pub fn poll_once<S: Surface + ?Sized>(
        &mut self,
        surface: &S,
    ) -> Result<PollStatus, SurfaceError> {
        self.expect_phase(SurfacePhase::Polling, "poll")?;

        if let Some(size) = surface.measure() {
            info!(
                "Surface ready at {} after {} retries",
                size, self.state.retry_count
            );
            self.become_ready(size);
            return Ok(PollStatus::Ready(Readiness::Measured(size)));
        }

        self.state.retry_count += 1;
        if self.state.retry_count >= self.config.max_attempts {
            let timeout = SurfaceTimeout {
                attempts: self.state.retry_count,
                fallback: self.config.fallback,
            };
            warn!("{}", timeout);
            self.become_ready(self.config.fallback);
            return Ok(PollStatus::Ready(Readiness::Fallback(timeout)));
        }

        debug!(
            "Surface not measurable yet (attempt {}/{})",
            self.state.retry_count, self.config.max_attempts
        );
        Ok(PollStatus::Pending {
            attempt: self.state.retry_count,
        })
    }

    /// Poll on the configured interval until the controller is `Ready`.
    pub async fn wait_ready<S: Surface + ?Sized>(
        &mut self,
        surface: &S,
    ) -> Result<Readiness, SurfaceError> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        loop {
            ticker.tick().await;
            if let PollStatus::Ready(readiness) = self.poll_once(surface)? {
                return Ok(readiness);
            }
        }
    }

    /// Re-measure the width after a resize and pass it to the engine.
    ///
    /// Height stays at the latched value. Returns the new size when it changed;
    /// outside `Ready` the event is ignored.
    pub fn on_resize<S: Surface + ?Sized>(&mut self, surface: &S) -> Option<Dimensions> {
        if self.state.phase != SurfacePhase::Ready {
            debug!("Ignoring resize while {}", self.state.phase);
            return None;
        }

        let width = surface.measure()?.width;
        if width == self.state.width {
            return None;
        }

        self.state.width = width;
        let size = Dimensions::new(width, self.state.height);
        if let Some(engine) = self.engine.as_mut() {
            engine.resize(size);
        }
        for (_, listener) in self.listeners.iter_mut() {
            listener(size);
        }

        debug!("Surface resized to {}", size);
        Some(size)
    }

    /// Register a callback for size changes; dropped on disposal.
    pub fn add_resize_listener(
        &mut self,
        listener: impl FnMut(Dimensions) + Send + 'static,
    ) -> ListenerId {
        self.next_listener += 1;
        let id = ListenerId(self.next_listener);
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn remove_resize_listener(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Release the engine, listeners and surface claim. Idempotent.
    pub fn dispose(&mut self) {
        if self.state.phase == SurfacePhase::Disposed {
            return;
        }

        if let Some(mut engine) = self.engine.take() {
            engine.release();
        }
        self.listeners.clear();
        if let Some(slot) = self.slot.take() {
            slot.release();
        }

        info!("Surface controller disposed (was {})", self.state.phase);
        self.state.phase = SurfacePhase::Disposed;
    }

    fn become_ready(&mut self, size: Dimensions) {
        self.state.phase = SurfacePhase::Ready;
        self.state.width = size.width;
        self.state.height = size.height;
        self.engine = Some((self.factory)(size));
    }

    fn expect_phase(
        &self,
        phase: SurfacePhase,
        operation: &'static str,
    ) -> Result<(), SurfaceError> {
        if self.state.phase == phase {
            Ok(())
        } else {
            Err(SurfaceError::InvalidTransition {
                phase: self.state.phase,
                operation,
            })
        }
    }
}

impl<E: ChartEngine> Drop for SurfaceController<E> {
    fn drop(&mut self) {
        self.dispose();
    }
}
