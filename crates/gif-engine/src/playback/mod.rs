//! Animation timing on top of the compositor.
//!
//! [`GifEngine`] is single-threaded: whoever owns it drives
//! [`GifEngine::render_frame`] on a timer. [`GifPlayer`] wraps it in an owning
//! thread with a command queue for use from anywhere.

pub mod clock;
pub mod listeners;
pub mod player;
pub mod types;

use std::fmt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use listeners::{AnimationListener, ListenerId, ListenerSet};
pub use player::GifPlayer;
pub use types::{OpenOptions, PlaybackStatus, RenderOutcome};

use crate::decoder::parser::read_header;
use crate::decoder::{GifInfo, parse};
use crate::error::{ErrorCode, GifError, Result};
use crate::render::{BackBuffer, Compositor};
use crate::source::{MarkableStream, Source, SourceReader};

/// Scale a frame duration by the playback speed.
fn scale_delay(duration_ms: u32, speed: f32) -> u32 {
    (f64::from(duration_ms) / f64::from(speed)).round() as u32
}

struct EngineInner {
    reader: SourceReader,
    info: GifInfo,
    compositor: Compositor,
    /// `None` when opened for metadata only.
    buffer: Option<BackBuffer>,
    clock: Arc<dyn Clock>,
    displayed: Option<usize>,
    /// Clock time at which the displayed frame expires.
    next_due_ms: u64,
    /// Full scaled delay of the displayed frame.
    frame_delay_ms: u32,
    /// Time left on the displayed frame, captured by `save_remainder`.
    saved_remainder: Option<u64>,
    loops_completed: u32,
    /// A seek landed on the last frame; its loop completes on the next render.
    loop_pending: bool,
    finished: bool,
    speed: f32,
    error: ErrorCode,
}

impl EngineInner {
    fn render(&mut self) -> Option<RenderOutcome> {
        if self.finished {
            return None;
        }
        let now = self.clock.now_ms();
        if let Some(index) = self.displayed {
            if now < self.next_due_ms {
                return Some(RenderOutcome {
                    delay_ms: (self.next_due_ms - now) as u32,
                    loop_completed: false,
                    frame_index: index,
                    advanced: false,
                });
            }
        }

        let crossed = std::mem::take(&mut self.loop_pending);
        if crossed {
            self.complete_loop();
            if self.finished {
                return Some(RenderOutcome {
                    delay_ms: 0,
                    loop_completed: true,
                    frame_index: self.displayed.unwrap_or_default(),
                    advanced: false,
                });
            }
        }

        let buffer = self.buffer.as_mut()?;
        let outcome = self
            .compositor
            .render_next(&mut self.reader, &self.info, buffer);
        if let Some(err) = &outcome.error {
            self.error = err.code();
        }
        self.displayed = Some(outcome.index);

        let delay = scale_delay(outcome.duration_ms, self.speed);
        self.frame_delay_ms = delay;
        self.next_due_ms = now + u64::from(delay);

        if outcome.last_in_loop {
            self.complete_loop();
        }

        Some(RenderOutcome {
            delay_ms: delay,
            loop_completed: crossed || outcome.last_in_loop,
            frame_index: outcome.index,
            advanced: true,
        })
    }

    fn complete_loop(&mut self) {
        self.loops_completed += 1;
        let limit = u32::from(self.info.loop_count);
        if limit > 0 && self.loops_completed >= limit {
            log::debug!("Loop limit of {limit} reached");
            self.finished = true;
        }
    }

    /// Composite every frame after the displayed one up to `target`.
    fn render_through(&mut self, target: usize) {
        let Some(buffer) = self.buffer.as_mut() else {
            return;
        };
        loop {
            let outcome = self
                .compositor
                .render_next(&mut self.reader, &self.info, buffer);
            if let Some(err) = &outcome.error {
                self.error = err.code();
            }
            self.displayed = Some(outcome.index);
            if outcome.last_in_loop {
                self.loop_pending = true;
                return;
            }
            if outcome.index >= target {
                return;
            }
        }
    }

    /// Leave `remaining_ms` (unscaled) on the displayed frame.
    fn schedule_remaining(&mut self, remaining_ms: u32) {
        let Some(index) = self.displayed else {
            return;
        };
        self.frame_delay_ms = scale_delay(self.info.frames[index].duration_ms(), self.speed);
        let scaled = u64::from(scale_delay(remaining_ms, self.speed));
        if self.saved_remainder.is_some() {
            self.saved_remainder = Some(scaled);
        }
        self.next_due_ms = self.clock.now_ms() + scaled;
    }

    fn remaining_ms(&self) -> u64 {
        match self.saved_remainder {
            Some(r) => r,
            None => self.next_due_ms.saturating_sub(self.clock.now_ms()),
        }
    }

    fn displayed_frame_end_ms(&self) -> u32 {
        match self.displayed {
            Some(index) if self.info.frame_count() > 1 => self.info.frame_end_ms(index),
            _ => 0,
        }
    }

    fn position_ms(&self) -> u32 {
        if self.info.frame_count() <= 1 {
            return 0;
        }
        let Some(index) = self.displayed else {
            return 0;
        };
        let end = self.info.frame_end_ms(index);
        let duration = self.info.frames[index].duration_ms();
        let unscaled = if self.frame_delay_ms == 0 {
            0
        } else {
            self.remaining_ms() * u64::from(duration) / u64::from(self.frame_delay_ms)
        };
        end - (unscaled.min(u64::from(duration)) as u32)
    }
}

/// A decoded GIF with its playback state.
///
/// All entry points are no-ops (or return neutral values) once the engine
/// has been freed.
pub struct GifEngine {
    inner: Option<EngineInner>,
}

impl GifEngine {
    pub fn open(source: Source, options: OpenOptions) -> Result<Self> {
        let kind = source.kind();
        let mut reader = SourceReader::open(source)?;
        let info = parse(&mut reader)?;

        let (width, height) = (u32::from(info.width), u32::from(info.height));
        let buffer = if options.metadata_only {
            None
        } else {
            Some(match options.reuse_buffer {
                Some(mut buffer) if buffer.fits(width, height) => {
                    log::debug!(
                        "Reusing {}x{} back-buffer for {width}x{height} GIF",
                        buffer.width(),
                        buffer.height()
                    );
                    buffer.clear();
                    buffer
                }
                _ => BackBuffer::new(width, height),
            })
        };

        log::info!(
            "Opened GIF from {kind}: {width}x{height}, {} frame(s), loop count {}",
            info.frame_count(),
            info.loop_count
        );

        let error = info
            .parse_error
            .as_ref()
            .map_or(ErrorCode::None, |e| e.code());
        let now = options.clock.now_ms();
        Ok(Self {
            inner: Some(EngineInner {
                reader,
                info,
                compositor: Compositor::new(),
                buffer,
                clock: options.clock,
                displayed: None,
                next_due_ms: now,
                frame_delay_ms: 0,
                saved_remainder: None,
                loops_completed: 0,
                loop_pending: false,
                finished: false,
                speed: 1.0,
                error,
            }),
        })
    }

    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(Source::Path(path.into()), OpenOptions::default())
    }

    /// Read from the descriptor's current position.
    pub fn open_file(file: File) -> Result<Self> {
        Self::open(Source::File(file), OpenOptions::default())
    }

    pub fn open_buffer(buffer: Arc<[u8]>) -> Result<Self> {
        Self::open(Source::Buffer(buffer), OpenOptions::default())
    }

    pub fn open_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::open(Source::Bytes(bytes), OpenOptions::default())
    }

    pub fn open_stream(stream: impl MarkableStream + 'static) -> Result<Self> {
        Self::open(Source::Stream(Box::new(stream)), OpenOptions::default())
    }

    /// `length` bytes of `file` starting at `start`.
    pub fn open_asset_fd(file: File, start: u64, length: u64) -> Result<Self> {
        Self::open(
            Source::AssetFd {
                file,
                start,
                length,
            },
            OpenOptions::default(),
        )
    }

    /// Render the next frame if it is due.
    ///
    /// Returns `None` once freed, when opened for metadata only, or after the
    /// loop limit has been reached; the back-buffer keeps the last frame.
    pub fn render_frame(&mut self) -> Option<RenderOutcome> {
        self.inner.as_mut()?.render()
    }

    /// Seek forward to the loop-relative time `ms`.
    ///
    /// Earlier targets and single-frame images are ignored; targets past the
    /// end of the loop clamp to it. Every frame in between is composited.
    pub fn seek_to_time(&mut self, ms: i32) -> Result<()> {
        if ms < 0 {
            return Err(GifError::InvalidArgument(format!(
                "seek position {ms} is negative"
            )));
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        if inner.info.frame_count() <= 1 || inner.buffer.is_none() {
            return Ok(());
        }
        let target_ms = (ms as u32).min(inner.info.duration_ms());
        if target_ms < inner.position_ms() {
            log::debug!("Ignoring backward seek to {target_ms} ms");
            return Ok(());
        }
        let target = inner.info.frame_at_time(target_ms);
        match inner.displayed {
            Some(shown) if target < shown => return Ok(()),
            Some(shown) if target == shown => {}
            _ => inner.render_through(target),
        }
        log::debug!("Seeked to {target_ms} ms (frame {target})");
        let remaining = inner.info.frame_end_ms(target).saturating_sub(target_ms);
        inner.schedule_remaining(remaining);
        Ok(())
    }

    /// Seek forward to frame `index`, clamped to the last frame. Ignored for
    /// single-frame images.
    pub fn seek_to_frame(&mut self, index: i32) -> Result<()> {
        if index < 0 {
            return Err(GifError::InvalidArgument(format!(
                "frame index {index} is negative"
            )));
        }
        let Some(inner) = self.inner.as_mut() else {
            return Ok(());
        };
        if inner.info.frame_count() <= 1 || inner.buffer.is_none() {
            return Ok(());
        }
        let target = (index as usize).min(inner.info.frame_count() - 1);
        if inner.displayed.is_some_and(|shown| target <= shown) {
            return Ok(());
        }
        inner.render_through(target);
        log::debug!("Seeked to frame {target}");
        let duration = inner.info.frames[target].duration_ms();
        inner.schedule_remaining(duration);
        Ok(())
    }

    /// Freeze the time left on the displayed frame (on stop).
    pub fn save_remainder(&mut self) {
        if let Some(inner) = self.inner.as_mut() {
            if inner.saved_remainder.is_none() {
                let now = inner.clock.now_ms();
                inner.saved_remainder = Some(inner.next_due_ms.saturating_sub(now));
            }
        }
    }

    /// Resume the frozen remainder (on start). Returns the delay until the
    /// next frame is due, if a remainder was saved.
    pub fn restore_remainder(&mut self) -> Option<u64> {
        let inner = self.inner.as_mut()?;
        let remainder = inner.saved_remainder.take()?;
        inner.next_due_ms = inner.clock.now_ms() + remainder;
        Some(remainder)
    }

    /// Rewind the source and restart from frame 0. Returns false, leaving
    /// the state untouched, when the source cannot be rewound.
    pub fn reset(&mut self) -> bool {
        let Some(inner) = self.inner.as_mut() else {
            return false;
        };
        if let Err(e) = inner.reader.rewind() {
            log::debug!("Reset skipped, source cannot rewind: {e}");
            return false;
        }
        if let Err(e) = read_header(&mut inner.reader) {
            log::warn!("Reset skipped, header no longer valid: {e}");
            return false;
        }
        inner.compositor.reset();
        inner.displayed = None;
        inner.loops_completed = 0;
        inner.loop_pending = false;
        inner.finished = false;
        inner.frame_delay_ms = 0;
        inner.next_due_ms = inner.clock.now_ms();
        if inner.saved_remainder.is_some() {
            inner.saved_remainder = Some(0);
        }
        true
    }

    /// Playback speed multiplier. Applies from the next rendered frame.
    pub fn set_speed_factor(&mut self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(GifError::InvalidArgument(format!(
                "speed factor {factor} is not positive"
            )));
        }
        if let Some(inner) = self.inner.as_mut() {
            inner.speed = factor;
        }
        Ok(())
    }

    pub fn speed_factor(&self) -> f32 {
        self.inner.as_ref().map_or(1.0, |i| i.speed)
    }

    pub fn width(&self) -> u32 {
        self.inner.as_ref().map_or(0, |i| u32::from(i.info.width))
    }

    pub fn height(&self) -> u32 {
        self.inner.as_ref().map_or(0, |i| u32::from(i.info.height))
    }

    pub fn frame_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.info.frame_count())
    }

    /// Number of loops to play, 0 = infinite.
    pub fn loop_count(&self) -> u16 {
        self.inner.as_ref().map_or(0, |i| i.info.loop_count)
    }

    pub fn loops_completed(&self) -> u32 {
        self.inner.as_ref().map_or(0, |i| i.loops_completed)
    }

    /// The loop limit was reached; nothing more will render.
    pub fn is_finished(&self) -> bool {
        self.inner.as_ref().is_some_and(|i| i.finished)
    }

    /// Duration of one loop in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        self.inner.as_ref().map_or(0, |i| i.info.duration_ms())
    }

    /// Loop-relative position. Always 0 for single-frame images.
    pub fn current_position_ms(&self) -> u32 {
        self.inner.as_ref().map_or(0, EngineInner::position_ms)
    }

    pub(crate) fn displayed_frame_end_ms(&self) -> u32 {
        self.inner
            .as_ref()
            .map_or(0, EngineInner::displayed_frame_end_ms)
    }

    /// Index of the frame in the back-buffer, if any has been rendered.
    pub fn current_frame_index(&self) -> Option<usize> {
        self.inner.as_ref().and_then(|i| i.displayed)
    }

    pub fn comment(&self) -> Option<&str> {
        self.inner.as_ref().and_then(|i| i.info.comment.as_deref())
    }

    /// Most recent decode error, sticky until the engine is freed.
    pub fn last_error(&self) -> ErrorCode {
        self.inner.as_ref().map_or(ErrorCode::None, |i| i.error)
    }

    /// Parsed metadata.
    pub fn info(&self) -> Option<&GifInfo> {
        self.inner.as_ref().map(|i| &i.info)
    }

    /// Bytes held by the engine: metadata, decoder tables and back-buffer.
    pub fn allocation_byte_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| {
            i.info.heap_size()
                + i.compositor.heap_size()
                + i.buffer.as_ref().map_or(0, BackBuffer::allocation_byte_count)
        })
    }

    /// Bytes needed for one ARGB frame (width × height × 4).
    pub fn frame_byte_count(&self) -> usize {
        self.width() as usize * self.height() as usize * 4
    }

    /// Length of the input in bytes, or -1 when unknown.
    pub fn input_source_byte_count(&self) -> i64 {
        self.inner.as_ref().map_or(-1, |i| i.reader.byte_count())
    }

    pub fn can_seek_forward(&self) -> bool {
        self.frame_count() > 1
    }

    pub fn can_seek_backward(&self) -> bool {
        false
    }

    /// ARGB value at `(x, y)` in the current frame.
    pub fn pixel(&self, x: u32, y: u32) -> Result<u32> {
        let inner = self.inner.as_ref().ok_or(GifError::Recycled)?;
        let buffer = inner
            .buffer
            .as_ref()
            .ok_or_else(|| GifError::InvalidArgument("opened for metadata only".into()))?;
        if x >= u32::from(inner.info.width) || y >= u32::from(inner.info.height) {
            return Err(GifError::InvalidArgument(format!(
                "pixel ({x}, {y}) outside {}x{}",
                inner.info.width, inner.info.height
            )));
        }
        buffer
            .pixel(x, y)
            .ok_or_else(|| GifError::InvalidArgument(format!("pixel ({x}, {y}) outside buffer")))
    }

    /// Copy of the current frame, `width × height` pixels row-major.
    pub fn pixels(&self) -> Result<Vec<u32>> {
        let inner = self.inner.as_ref().ok_or(GifError::Recycled)?;
        let buffer = inner
            .buffer
            .as_ref()
            .ok_or_else(|| GifError::InvalidArgument("opened for metadata only".into()))?;
        Ok(buffer.copy_region(u32::from(inner.info.width), u32::from(inner.info.height)))
    }

    /// The back-buffer. Its stride may exceed `width()` when it was reused.
    pub fn buffer(&self) -> Option<&BackBuffer> {
        self.inner.as_ref().and_then(|i| i.buffer.as_ref())
    }

    /// Release the source and buffer. Safe to call repeatedly.
    pub fn free(&mut self) {
        if self.inner.take().is_some() {
            log::info!("GIF engine freed");
        }
    }

    pub fn is_recycled(&self) -> bool {
        self.inner.is_none()
    }

    /// Free the engine, handing its back-buffer to the caller for reuse.
    pub fn take_buffer(&mut self) -> Option<BackBuffer> {
        let inner = self.inner.take()?;
        log::info!("GIF engine freed, back-buffer handed over");
        inner.buffer
    }
}

impl fmt::Display for GifEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.inner {
            Some(inner) => write!(
                f,
                "GIF: size: {}x{}, frames: {}, loop count: {}, error: {}",
                inner.info.width,
                inner.info.height,
                inner.info.frame_count(),
                inner.info.loop_count,
                inner.error.code()
            ),
            None => write!(f, "GIF: recycled"),
        }
    }
}

impl fmt::Debug for GifEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GifEngine({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::DisposalMethod;
    use crate::test_support::{
        BLUE, FixtureFrame, GifBuilder, RED, encode_with_gif_crate, three_frame_gif,
    };

    fn engine(bytes: Vec<u8>) -> (GifEngine, ManualClock) {
        let _ = env_logger::builder().is_test(true).try_init();
        let clock = ManualClock::new();
        let options = OpenOptions::default().clock(Arc::new(clock.clone()));
        (GifEngine::open(Source::Bytes(bytes), options).unwrap(), clock)
    }

    /// Render one frame and move the clock to when the next is due.
    fn step(engine: &mut GifEngine, clock: &ManualClock) -> RenderOutcome {
        let out = engine.render_frame().unwrap();
        clock.advance(u64::from(out.delay_ms));
        out
    }

    #[test]
    fn free_is_idempotent() {
        let (mut e, _) = engine(three_frame_gif());
        assert!(!e.is_recycled());
        e.free();
        e.free();
        assert!(e.is_recycled());
        assert!(e.render_frame().is_none());
        assert_eq!(e.width(), 0);
        assert!(matches!(e.pixel(0, 0), Err(GifError::Recycled)));
        assert_eq!(e.to_string(), "GIF: recycled");
        assert!(e.seek_to_time(10).is_ok());
    }

    #[test]
    fn frames_follow_their_delays() {
        let (mut e, clock) = engine(three_frame_gif());
        let delays: Vec<u32> = (0..3).map(|_| step(&mut e, &clock).delay_ms).collect();
        assert_eq!(delays, vec![100, 200, 300]);
        assert_eq!(e.current_frame_index(), Some(2));
    }

    #[test]
    fn frame_is_held_until_due() {
        let (mut e, clock) = engine(three_frame_gif());
        e.render_frame().unwrap();
        clock.advance(40);
        let held = e.render_frame().unwrap();
        assert!(!held.advanced);
        assert_eq!(held.frame_index, 0);
        assert_eq!(held.delay_ms, 60);
        assert_eq!(e.current_position_ms(), 40);
    }

    #[test]
    fn backward_seek_is_ignored() {
        let (mut e, clock) = engine(three_frame_gif());
        for _ in 0..3 {
            step(&mut e, &clock);
        }
        let before = e.pixels().unwrap();
        e.seek_to_time(50).unwrap();
        e.seek_to_frame(1).unwrap();
        assert_eq!(e.current_frame_index(), Some(2));
        assert_eq!(e.pixels().unwrap(), before);
    }

    #[test]
    fn forward_seek_lands_on_containing_frame() {
        let (mut e, _) = engine(three_frame_gif());
        e.seek_to_time(150).unwrap();
        assert_eq!(e.current_frame_index(), Some(1));
        assert_eq!(e.current_position_ms(), 150);

        // Window ends are inclusive.
        e.seek_to_time(300).unwrap();
        assert_eq!(e.current_frame_index(), Some(1));

        e.seek_to_time(301).unwrap();
        assert_eq!(e.current_frame_index(), Some(2));
        // Frame 1 was disposed on the way.
        assert_eq!(e.pixel(1, 1).unwrap(), 0);
        assert_eq!(e.pixel(0, 0).unwrap(), BLUE);
    }

    #[test]
    fn seek_past_end_clamps_to_last_frame() {
        let (mut e, _) = engine(three_frame_gif());
        e.seek_to_time(i32::MAX).unwrap();
        assert_eq!(e.current_frame_index(), Some(2));
        assert_eq!(e.current_position_ms(), 600);
    }

    #[test]
    fn seek_to_frame_clamps_and_resets_timing() {
        let (mut e, _) = engine(three_frame_gif());
        e.seek_to_frame(1).unwrap();
        assert_eq!(e.current_position_ms(), 100);
        e.seek_to_frame(99).unwrap();
        assert_eq!(e.current_frame_index(), Some(2));
        assert_eq!(e.render_frame().unwrap().delay_ms, 300);
    }

    #[test]
    fn speed_scales_elapsed_time() {
        let (mut e, clock) = engine(three_frame_gif());
        e.set_speed_factor(2.0).unwrap();
        let total: u32 = (0..3).map(|_| step(&mut e, &clock).delay_ms).sum();
        assert_eq!(total, 300);

        e.set_speed_factor(0.5).unwrap();
        let total: u32 = (0..3).map(|_| step(&mut e, &clock).delay_ms).sum();
        assert_eq!(total, 1200);
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let (mut e, _) = engine(three_frame_gif());
        for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                e.set_speed_factor(bad),
                Err(GifError::InvalidArgument(_))
            ));
        }
        assert!(matches!(e.seek_to_time(-1), Err(GifError::InvalidArgument(_))));
        assert!(matches!(e.seek_to_frame(-1), Err(GifError::InvalidArgument(_))));
        assert_eq!(e.speed_factor(), 1.0);
        assert!(matches!(e.pixel(4, 0), Err(GifError::InvalidArgument(_))));
    }

    #[test]
    fn infinite_loop_completes_every_traversal() {
        let (mut e, clock) = engine(three_frame_gif());
        let completions = (0..30).filter(|_| step(&mut e, &clock).loop_completed).count();
        assert_eq!(completions, 10);
        assert_eq!(e.loops_completed(), 10);
        assert!(!e.is_finished());
    }

    #[test]
    fn finite_loop_count_stops_rendering() {
        let bytes = GifBuilder::new(1, 1, 4)
            .loop_count(2)
            .image(0, 0, 1, 1, &[1])
            .image(0, 0, 1, 1, &[3])
            .finish();
        let (mut e, clock) = engine(bytes);
        let mut completions = 0;
        while let Some(out) = e.render_frame() {
            completions += usize::from(out.loop_completed);
            clock.advance(u64::from(out.delay_ms));
        }
        assert_eq!(completions, 2);
        assert!(e.is_finished());
        assert_eq!(e.pixel(0, 0).unwrap(), BLUE);
    }

    #[test]
    fn seek_onto_last_frame_completes_its_loop_on_wrap() {
        let bytes = GifBuilder::new(1, 1, 4)
            .loop_count(1)
            .control(DisposalMethod::Keep, 10, None)
            .image(0, 0, 1, 1, &[1])
            .control(DisposalMethod::Keep, 10, None)
            .image(0, 0, 1, 1, &[2])
            .control(DisposalMethod::Keep, 10, None)
            .image(0, 0, 1, 1, &[3])
            .finish();
        let (mut e, _) = engine(bytes);
        e.seek_to_time(i32::MAX).unwrap();
        assert_eq!(e.current_frame_index(), Some(2));
        assert_eq!(e.loops_completed(), 0);

        let out = e.render_frame().unwrap();
        assert!(out.loop_completed);
        assert!(!out.advanced);
        assert_eq!(e.loops_completed(), 1);
        assert!(e.is_finished());
        assert!(e.render_frame().is_none());
        assert_eq!(e.pixel(0, 0).unwrap(), BLUE);
    }

    #[test]
    fn seek_to_last_frame_counts_wrap_when_looping_forever() {
        let (mut e, clock) = engine(three_frame_gif());
        e.seek_to_frame(2).unwrap();
        clock.advance(300);
        let out = step(&mut e, &clock);
        assert_eq!(out.frame_index, 0);
        assert!(out.loop_completed);
        assert_eq!(e.loops_completed(), 1);

        let completions = (0..3).filter(|_| step(&mut e, &clock).loop_completed).count();
        assert_eq!(completions, 1);
        assert_eq!(e.loops_completed(), 2);
    }

    #[test]
    fn single_frame_reports_static_metadata() {
        let bytes = GifBuilder::new(2, 2, 4)
            .control(DisposalMethod::Keep, 50, None)
            .image(0, 0, 2, 2, &[1; 4])
            .finish();
        let (mut e, _) = engine(bytes);
        assert_eq!(e.frame_count(), 1);
        assert!(!e.can_seek_forward());
        assert!(!e.can_seek_backward());
        assert_eq!(e.duration_ms(), 500);
        e.seek_to_frame(0).unwrap();
        assert_eq!(e.current_frame_index(), None);
        e.render_frame().unwrap();
        assert_eq!(e.current_position_ms(), 0);
        e.seek_to_time(100).unwrap();
        assert_eq!(e.pixel(1, 1).unwrap(), RED);
    }

    #[test]
    fn stop_and_start_resume_the_remainder() {
        let (mut e, clock) = engine(three_frame_gif());
        e.render_frame().unwrap();
        clock.advance(30);
        e.save_remainder();
        clock.advance(1000);
        assert_eq!(e.current_position_ms(), 30);
        assert_eq!(e.restore_remainder(), Some(70));
        assert!(!e.render_frame().unwrap().advanced);
        clock.advance(70);
        assert_eq!(e.render_frame().unwrap().frame_index, 1);
        assert_eq!(e.restore_remainder(), None);
    }

    #[test]
    fn reset_restarts_from_first_frame() {
        let (mut e, clock) = engine(three_frame_gif());
        for _ in 0..2 {
            step(&mut e, &clock);
        }
        assert!(e.reset());
        assert_eq!(e.current_frame_index(), None);
        assert_eq!(e.render_frame().unwrap().frame_index, 0);
        assert_eq!(e.pixel(1, 1).unwrap(), RED);
    }

    #[test]
    fn corrupt_frame_sets_sticky_error() {
        let bytes = GifBuilder::new(1, 1, 4)
            .image(0, 0, 1, 1, &[1])
            .raw(&[0x2C, 0, 0, 0, 0, 1, 0, 1, 0, 0, 2, 1, 0b0011_1100, 0])
            .finish();
        let (mut e, clock) = engine(bytes);
        assert_eq!(e.last_error(), ErrorCode::None);
        step(&mut e, &clock);
        step(&mut e, &clock);
        assert_eq!(e.last_error(), ErrorCode::CorruptStream);
        assert_eq!(e.pixel(0, 0).unwrap(), RED);
        step(&mut e, &clock);
        assert_eq!(e.last_error(), ErrorCode::CorruptStream);
    }

    #[test]
    fn reused_buffer_is_adopted_when_it_fits() {
        let (mut big, _) = engine(encode_with_gif_crate(
            8,
            8,
            0,
            &[FixtureFrame::full(8, 8, 3, 5)],
        ));
        big.render_frame().unwrap();
        let buffer = big.take_buffer().unwrap();
        assert!(big.is_recycled());

        let options = OpenOptions::default().reuse_buffer(buffer);
        let small = GifEngine::open(Source::Bytes(three_frame_gif()), options).unwrap();
        let adopted = small.buffer().unwrap();
        assert_eq!((adopted.width(), adopted.height()), (8, 8));
        assert!(adopted.pixels().iter().all(|&p| p == 0));
        assert_eq!(small.pixels().unwrap().len(), 16);
        assert_eq!(small.frame_byte_count(), 64);
    }

    #[test]
    fn metadata_only_does_not_render() {
        let options = OpenOptions::default().metadata_only();
        let mut e = GifEngine::open(Source::Bytes(three_frame_gif()), options).unwrap();
        assert_eq!(e.frame_count(), 3);
        assert!(e.buffer().is_none());
        assert!(e.render_frame().is_none());
        assert!(e.pixels().is_err());
    }

    #[test]
    fn byte_counts_and_display() {
        let (e, _) = engine(three_frame_gif());
        let len = three_frame_gif().len() as i64;
        assert_eq!(e.input_source_byte_count(), len);
        assert!(e.allocation_byte_count() >= 64);
        assert_eq!(e.to_string(), "GIF: size: 4x4, frames: 3, loop count: 0, error: 0");

        let e = GifEngine::open_stream(std::io::Cursor::new(three_frame_gif())).unwrap();
        assert_eq!(e.input_source_byte_count(), -1);
    }

    #[test]
    fn open_reports_source_errors() {
        let err = GifEngine::open_path("/nonexistent/anim.gif").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        let err = GifEngine::open_bytes(b"PNG\x89garbage".to_vec()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidHeader);
    }

    #[test]
    fn opens_from_files_and_regions() {
        use std::io::Write;

        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"pad").unwrap();
        tmp.write_all(&three_frame_gif()).unwrap();
        let len = three_frame_gif().len() as u64;

        let e = GifEngine::open_asset_fd(File::open(tmp.path()).unwrap(), 3, len).unwrap();
        assert_eq!(e.frame_count(), 3);

        let e = GifEngine::open_buffer(Arc::from(three_frame_gif())).unwrap();
        assert_eq!(e.width(), 4);

        let mut file = File::open(tmp.path()).unwrap();
        std::io::Seek::seek(&mut file, std::io::SeekFrom::Start(3)).unwrap();
        let mut e = GifEngine::open_file(file).unwrap();
        assert_eq!(e.input_source_byte_count(), -1);
        assert!(e.reset());
        assert_eq!(e.render_frame().unwrap().frame_index, 0);
    }
}
