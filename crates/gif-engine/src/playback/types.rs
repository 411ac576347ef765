use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, AtomicUsize, Ordering};

use super::GifEngine;
use super::clock::{Clock, MonotonicClock};
use crate::error::ErrorCode;
use crate::render::BackBuffer;

/// Options for [`GifEngine::open`].
pub struct OpenOptions {
    /// Parse metadata only; no back-buffer is allocated and nothing renders.
    pub metadata_only: bool,
    /// Buffer left over from a previous engine, adopted when the new image fits.
    pub reuse_buffer: Option<BackBuffer>,
    pub clock: Arc<dyn Clock>,
}

impl OpenOptions {
    pub fn metadata_only(mut self) -> Self {
        self.metadata_only = true;
        self
    }

    pub fn reuse_buffer(mut self, buffer: BackBuffer) -> Self {
        self.reuse_buffer = Some(buffer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            metadata_only: false,
            reuse_buffer: None,
            clock: Arc::new(MonotonicClock::new()),
        }
    }
}

impl fmt::Debug for OpenOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenOptions")
            .field("metadata_only", &self.metadata_only)
            .field(
                "reuse_buffer",
                &self.reuse_buffer.as_ref().map(|b| (b.width(), b.height())),
            )
            .finish_non_exhaustive()
    }
}

/// Result of [`GifEngine::render_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Milliseconds until the next frame is due, already scaled by speed.
    pub delay_ms: u32,
    /// The final frame of a loop was just rendered.
    pub loop_completed: bool,
    /// Frame now in the back-buffer.
    pub frame_index: usize,
    /// False when the displayed frame was not due to change yet.
    pub advanced: bool,
}

const NO_FRAME: usize = usize::MAX;

/// Lock-free view of a player's state, written by the playback thread and
/// readable from anywhere.
pub struct PlaybackStatus {
    running: AtomicBool,
    recycled: AtomicBool,
    width: AtomicU32,
    height: AtomicU32,
    frame_count: AtomicUsize,
    frame_index: AtomicUsize,
    loop_count: AtomicU16,
    loops_completed: AtomicU32,
    duration_ms: AtomicU32,
    /// Position at `anchor_ms`; extrapolated while running.
    position_ms: AtomicU32,
    /// Loop-relative end of the displayed frame; extrapolation stops here.
    frame_end_ms: AtomicU32,
    anchor_ms: AtomicU64,
    speed_bits: AtomicU32,
    error: AtomicU16,
    clock: Arc<dyn Clock>,
}

impl PlaybackStatus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            running: AtomicBool::new(false),
            recycled: AtomicBool::new(false),
            width: AtomicU32::new(0),
            height: AtomicU32::new(0),
            frame_count: AtomicUsize::new(0),
            frame_index: AtomicUsize::new(NO_FRAME),
            loop_count: AtomicU16::new(0),
            loops_completed: AtomicU32::new(0),
            duration_ms: AtomicU32::new(0),
            position_ms: AtomicU32::new(0),
            frame_end_ms: AtomicU32::new(0),
            anchor_ms: AtomicU64::new(0),
            speed_bits: AtomicU32::new(1.0f32.to_bits()),
            error: AtomicU16::new(0),
            clock,
        }
    }

    /// Copy the engine's current state.
    pub(crate) fn publish(&self, engine: &GifEngine, running: bool) {
        self.width.store(engine.width(), Ordering::Relaxed);
        self.height.store(engine.height(), Ordering::Relaxed);
        self.frame_count.store(engine.frame_count(), Ordering::Relaxed);
        self.frame_index.store(
            engine.current_frame_index().unwrap_or(NO_FRAME),
            Ordering::Relaxed,
        );
        self.loop_count.store(engine.loop_count(), Ordering::Relaxed);
        self.loops_completed
            .store(engine.loops_completed(), Ordering::Relaxed);
        self.duration_ms.store(engine.duration_ms(), Ordering::Relaxed);
        self.position_ms
            .store(engine.current_position_ms(), Ordering::Relaxed);
        self.frame_end_ms
            .store(engine.displayed_frame_end_ms(), Ordering::Relaxed);
        self.anchor_ms.store(self.clock.now_ms(), Ordering::Relaxed);
        self.speed_bits
            .store(engine.speed_factor().to_bits(), Ordering::Relaxed);
        self.error.store(engine.last_error().code(), Ordering::Relaxed);
        self.running
            .store(running && !engine.is_finished(), Ordering::SeqCst);
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    pub(crate) fn mark_recycled(&self) {
        self.recycled.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.is_recycled()
    }

    pub fn is_recycled(&self) -> bool {
        self.recycled.load(Ordering::SeqCst)
    }

    pub fn width(&self) -> u32 {
        self.width.load(Ordering::Relaxed)
    }

    pub fn height(&self) -> u32 {
        self.height.load(Ordering::Relaxed)
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Frame currently shown, if any has been rendered.
    pub fn current_frame_index(&self) -> Option<usize> {
        match self.frame_index.load(Ordering::Relaxed) {
            NO_FRAME => None,
            i => Some(i),
        }
    }

    pub fn loop_count(&self) -> u16 {
        self.loop_count.load(Ordering::Relaxed)
    }

    pub fn loops_completed(&self) -> u32 {
        self.loops_completed.load(Ordering::Relaxed)
    }

    pub fn duration_ms(&self) -> u32 {
        self.duration_ms.load(Ordering::Relaxed)
    }

    pub fn speed_factor(&self) -> f32 {
        f32::from_bits(self.speed_bits.load(Ordering::Relaxed))
    }

    /// Loop-relative playback position in milliseconds.
    pub fn current_position_ms(&self) -> u32 {
        let position = self.position_ms.load(Ordering::Relaxed);
        if !self.is_running() {
            return position;
        }
        let elapsed = self
            .clock
            .now_ms()
            .saturating_sub(self.anchor_ms.load(Ordering::Relaxed));
        let advanced = (elapsed as f64 * f64::from(self.speed_factor())) as u64;
        let end = self.frame_end_ms.load(Ordering::Relaxed).max(position);
        (u64::from(position) + advanced).min(u64::from(end)) as u32
    }

    pub fn error(&self) -> ErrorCode {
        ErrorCode::from_code(self.error.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackStatus")
            .field("running", &self.is_running())
            .field("recycled", &self.is_recycled())
            .field("frame_index", &self.current_frame_index())
            .field("position_ms", &self.current_position_ms())
            .field("error", &self.error())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::clock::ManualClock;
    use crate::source::Source;
    use crate::test_support::three_frame_gif;

    #[test]
    fn position_extrapolates_while_running_up_to_frame_end() {
        let clock = ManualClock::new();
        let mut engine = GifEngine::open(
            Source::Bytes(three_frame_gif()),
            OpenOptions::default().clock(Arc::new(clock.clone())),
        )
        .unwrap();
        let status = PlaybackStatus::new(Arc::new(clock.clone()));
        engine.render_frame().unwrap();
        status.publish(&engine, true);

        assert_eq!(status.current_frame_index(), Some(0));
        assert_eq!(status.current_position_ms(), 0);
        clock.advance(60);
        assert_eq!(status.current_position_ms(), 60);
        clock.advance(500);
        assert_eq!(status.current_position_ms(), 100);

        status.set_running(false);
        assert_eq!(status.current_position_ms(), 0);
    }

    #[test]
    fn fresh_status_has_no_frame() {
        let status = PlaybackStatus::new(Arc::new(ManualClock::new()));
        assert_eq!(status.current_frame_index(), None);
        assert!(!status.is_running());
        assert_eq!(status.error(), ErrorCode::None);
        assert_eq!(status.speed_factor(), 1.0);
    }
}
