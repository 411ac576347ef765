//! Thread-owning player.
//!
//! The engine lives on a dedicated thread. Mutating calls enqueue a
//! [`Command`] and return immediately; the thread executes commands in order
//! and renders frames when they are due. State is read through
//! [`PlaybackStatus`] and the last composited frame through [`FrameSlot`].

use std::fmt;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};

use super::clock::MonotonicClock;
use super::listeners::{AnimationListener, ListenerId, ListenerSet};
use super::types::{OpenOptions, PlaybackStatus};
use super::GifEngine;
use crate::config::PlayerConfig;
use crate::error::{ErrorCode, GifError, Result};
use crate::render::{BackBuffer, Rect};
use crate::source::Source;

/// Request executed on the playback thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start,
    Stop,
    Reset,
    SeekTime(i32),
    SeekFrame(i32),
    SetSpeed(f32),
    Recycle,
}

impl Command {
    fn is_seek(&self) -> bool {
        matches!(self, Command::SeekTime(_) | Command::SeekFrame(_))
    }
}

/// Collapse every run of consecutive seeks into its last seek.
fn coalesce_seeks(batch: Vec<Command>) -> Vec<Command> {
    let mut out: Vec<Command> = Vec::with_capacity(batch.len());
    for cmd in batch {
        if cmd.is_seek() && out.last().is_some_and(Command::is_seek) {
            if let Some(last) = out.last_mut() {
                log::debug!("Coalescing {last:?} into {cmd:?}");
                *last = cmd;
            }
        } else {
            out.push(cmd);
        }
    }
    out
}

#[derive(Default)]
struct Frame {
    width: u32,
    height: u32,
    index: Option<usize>,
    pixels: Vec<u32>,
}

/// Copy of the last fully composited frame, shared with the playback thread.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Frame>>,
}

impl FrameSlot {
    fn publish(&self, engine: &GifEngine) {
        let Some(buffer) = engine.buffer() else {
            return;
        };
        if let Ok(mut frame) = self.inner.lock() {
            frame.width = engine.width();
            frame.height = engine.height();
            frame.index = engine.current_frame_index();
            let region = Rect::new(0, 0, frame.width, frame.height);
            buffer.save_rect(region, &mut frame.pixels);
        }
    }

    fn clear(&self) {
        if let Ok(mut frame) = self.inner.lock() {
            *frame = Frame::default();
        }
    }

    /// Index of the frame held, if any has been rendered.
    pub fn frame_index(&self) -> Option<usize> {
        self.inner.lock().ok().and_then(|f| f.index)
    }

    /// Copy of the frame, `width × height` ARGB pixels row-major.
    pub fn snapshot(&self) -> Option<Vec<u32>> {
        let frame = self.inner.lock().ok()?;
        frame.index.map(|_| frame.pixels.clone())
    }

    /// Run `f` on the pixels without copying them.
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u32], u32, u32) -> R) -> Option<R> {
        let frame = self.inner.lock().ok()?;
        frame.index?;
        Some(f(&frame.pixels, frame.width, frame.height))
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        self.with_pixels(|pixels, width, height| {
            (x < width && y < height).then(|| pixels[y as usize * width as usize + x as usize])
        })
        .flatten()
    }
}

/// Static facts captured at open time, still answerable after recycle.
#[derive(Debug, Clone)]
struct OpenedInfo {
    comment: Option<String>,
    input_source_byte_count: i64,
    allocation_byte_count: usize,
}

/// Plays a GIF on its own thread.
pub struct GifPlayer {
    command_tx: Option<Sender<Command>>,
    status: Arc<PlaybackStatus>,
    frame: FrameSlot,
    listeners: ListenerSet,
    config: PlayerConfig,
    opened: OpenedInfo,
    thread: Option<JoinHandle<Option<BackBuffer>>>,
}

impl GifPlayer {
    /// Open with the config from the user config directory.
    pub fn open(source: Source) -> Result<Self> {
        Self::open_with(source, PlayerConfig::load())
    }

    pub fn open_with(source: Source, config: PlayerConfig) -> Result<Self> {
        Self::spawn(source, config, None)
    }

    /// Open `source`, adopting `previous`'s back-buffer when it is large enough.
    /// `previous` is recycled.
    pub fn open_reusing(source: Source, previous: GifPlayer) -> Result<Self> {
        let config = previous.config.clone();
        let buffer = previous.into_buffer();
        Self::spawn(source, config, buffer)
    }

    fn spawn(source: Source, config: PlayerConfig, reuse: Option<BackBuffer>) -> Result<Self> {
        let clock = Arc::new(MonotonicClock::new());
        let mut options = OpenOptions::default().clock(clock.clone());
        if let Some(buffer) = reuse {
            options = options.reuse_buffer(buffer);
        }
        let mut engine = GifEngine::open(source, options)?;
        if let Err(e) = engine.set_speed_factor(config.default_speed) {
            log::warn!("Ignoring configured speed: {e}");
        }

        let status = Arc::new(PlaybackStatus::new(clock));
        status.publish(&engine, false);
        let opened = OpenedInfo {
            comment: engine.comment().map(str::to_owned),
            input_source_byte_count: engine.input_source_byte_count(),
            allocation_byte_count: engine.allocation_byte_count(),
        };

        let (command_tx, command_rx) = bounded::<Command>(config.command_queue_capacity.max(1));
        let frame = FrameSlot::default();
        let listeners = ListenerSet::new();

        let worker = Worker {
            engine,
            commands: command_rx,
            status: Arc::clone(&status),
            frame: frame.clone(),
            listeners: listeners.clone(),
            min_frame_interval_ms: config.min_frame_interval_ms,
            coalesce: config.coalesce_seeks,
            running: false,
        };
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || worker.run())
            .map_err(|e| {
                log::error!("Failed to spawn playback thread: {e}");
                GifError::from(e)
            })?;

        Ok(Self {
            command_tx: Some(command_tx),
            status,
            frame,
            listeners,
            config,
            opened,
            thread: Some(handle),
        })
    }

    fn send(&self, cmd: Command) {
        if self.status.is_recycled() {
            log::debug!("Ignoring {cmd:?} on recycled player");
            return;
        }
        let Some(tx) = &self.command_tx else {
            return;
        };
        match tx.try_send(cmd) {
            Ok(()) => {}
            Err(TrySendError::Full(cmd)) => {
                log::warn!("Player command queue full, dropping {cmd:?}");
            }
            Err(TrySendError::Disconnected(_)) => {
                log::debug!("Playback thread gone, dropping {cmd:?}");
            }
        }
    }

    /// Start or resume playback. Idempotent.
    pub fn start(&self) {
        if !self.status.is_recycled() {
            self.status.set_running(true);
        }
        self.send(Command::Start);
    }

    /// Stop playback, keeping the position within the current frame.
    pub fn stop(&self) {
        self.status.set_running(false);
        self.send(Command::Stop);
    }

    pub fn pause(&self) {
        self.stop();
    }

    /// Restart from the first frame, keeping the running state. Nothing
    /// changes if the source cannot be rewound.
    pub fn reset(&self) {
        self.send(Command::Reset);
    }

    /// Seek forward to `ms` within the loop. See [`GifEngine::seek_to_time`].
    pub fn seek_to(&self, ms: i32) -> Result<()> {
        if ms < 0 {
            return Err(GifError::InvalidArgument(format!(
                "seek position {ms} is negative"
            )));
        }
        self.send(Command::SeekTime(ms));
        Ok(())
    }

    pub fn seek_to_frame(&self, index: i32) -> Result<()> {
        if index < 0 {
            return Err(GifError::InvalidArgument(format!(
                "frame index {index} is negative"
            )));
        }
        self.send(Command::SeekFrame(index));
        Ok(())
    }

    pub fn set_speed(&self, factor: f32) -> Result<()> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(GifError::InvalidArgument(format!(
                "speed factor {factor} is not positive"
            )));
        }
        self.send(Command::SetSpeed(factor));
        Ok(())
    }

    /// Release the engine and its buffer. Later calls are ignored.
    pub fn recycle(&self) {
        if self.status.is_recycled() {
            return;
        }
        if let Some(tx) = &self.command_tx {
            // A full queue still shuts down: the flag stops further rendering.
            if tx.try_send(Command::Recycle).is_err() {
                log::debug!("Recycle queued behind a full command queue");
            }
        }
        self.status.mark_recycled();
        self.frame.clear();
    }

    /// Recycle and wait for the thread, returning the back-buffer.
    fn into_buffer(mut self) -> Option<BackBuffer> {
        self.recycle();
        self.command_tx.take();
        let handle = self.thread.take()?;
        handle.join().ok().flatten()
    }

    pub fn is_recycled(&self) -> bool {
        self.status.is_recycled()
    }

    pub fn add_listener(&self, listener: Arc<dyn AnimationListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    /// Returns whether the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn status(&self) -> &Arc<PlaybackStatus> {
        &self.status
    }

    pub fn frame_slot(&self) -> &FrameSlot {
        &self.frame
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.status.is_running()
    }

    pub fn is_playing(&self) -> bool {
        self.is_running()
    }

    pub fn width(&self) -> u32 {
        self.status.width()
    }

    pub fn height(&self) -> u32 {
        self.status.height()
    }

    pub fn frame_count(&self) -> usize {
        self.status.frame_count()
    }

    pub fn loop_count(&self) -> u16 {
        self.status.loop_count()
    }

    pub fn loops_completed(&self) -> u32 {
        self.status.loops_completed()
    }

    pub fn duration_ms(&self) -> u32 {
        self.status.duration_ms()
    }

    pub fn current_position_ms(&self) -> u32 {
        self.status.current_position_ms()
    }

    pub fn current_frame_index(&self) -> Option<usize> {
        self.status.current_frame_index()
    }

    pub fn error(&self) -> ErrorCode {
        self.status.error()
    }

    pub fn comment(&self) -> Option<&str> {
        self.opened.comment.as_deref()
    }

    pub fn input_source_byte_count(&self) -> i64 {
        self.opened.input_source_byte_count
    }

    /// Engine allocation measured at open time.
    pub fn allocation_byte_count(&self) -> usize {
        self.opened.allocation_byte_count
    }

    pub fn frame_byte_count(&self) -> usize {
        self.width() as usize * self.height() as usize * 4
    }

    pub fn can_seek_forward(&self) -> bool {
        self.frame_count() > 1
    }

    pub fn can_seek_backward(&self) -> bool {
        false
    }

    /// Copy of the last rendered frame.
    pub fn current_frame(&self) -> Option<Vec<u32>> {
        if self.is_recycled() {
            return None;
        }
        self.frame.snapshot()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Result<u32> {
        if self.is_recycled() {
            return Err(GifError::Recycled);
        }
        if x >= self.width() || y >= self.height() {
            return Err(GifError::InvalidArgument(format!(
                "pixel ({x}, {y}) outside {}x{}",
                self.width(),
                self.height()
            )));
        }
        self.frame
            .pixel(x, y)
            .ok_or_else(|| GifError::InvalidArgument("no frame rendered yet".into()))
    }
}

impl fmt::Display for GifPlayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_recycled() {
            return write!(f, "GIF: recycled");
        }
        write!(
            f,
            "GIF: size: {}x{}, frames: {}, loop count: {}, error: {}",
            self.width(),
            self.height(),
            self.frame_count(),
            self.loop_count(),
            self.error().code()
        )
    }
}

impl Drop for GifPlayer {
    fn drop(&mut self) {
        // Dropping the sender ends the thread's receive loop
        self.command_tx.take();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// State owned by the playback thread.
struct Worker {
    engine: GifEngine,
    commands: Receiver<Command>,
    status: Arc<PlaybackStatus>,
    frame: FrameSlot,
    listeners: ListenerSet,
    min_frame_interval_ms: u32,
    coalesce: bool,
    running: bool,
}

enum Flow {
    Continue,
    Exit,
}

impl Worker {
    fn run(mut self) -> Option<BackBuffer> {
        // Players start stopped.
        self.engine.save_remainder();
        let mut wait: Option<Duration> = None;
        loop {
            let first = match wait {
                Some(timeout) => match self.commands.recv_timeout(timeout) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => break,
                },
                None => match self.commands.recv() {
                    Ok(cmd) => Some(cmd),
                    Err(_) => break,
                },
            };

            if let Some(first) = first {
                let mut batch = vec![first];
                batch.extend(self.commands.try_iter());
                if self.coalesce {
                    batch = coalesce_seeks(batch);
                }
                for cmd in batch {
                    if let Flow::Exit = self.handle(cmd) {
                        return self.engine.take_buffer();
                    }
                }
            }

            if self.status.is_recycled() {
                return self.engine.take_buffer();
            }

            wait = if self.running { self.tick() } else { None };
            self.status.publish(&self.engine, self.running);
        }
        log::debug!("Playback thread exiting (channel closed)");
        self.engine.free();
        None
    }

    fn handle(&mut self, cmd: Command) -> Flow {
        log::debug!("Player command: {cmd:?}");
        match cmd {
            Command::Start => {
                if !self.running {
                    self.running = true;
                    self.engine.restore_remainder();
                }
            }
            Command::Stop => {
                if self.running {
                    self.running = false;
                    self.engine.save_remainder();
                }
            }
            Command::Reset => {
                if self.engine.reset() {
                    log::debug!("Playback reset to first frame");
                }
            }
            Command::SeekTime(ms) => {
                if let Err(e) = self.engine.seek_to_time(ms) {
                    log::warn!("Seek to {ms} ms failed: {e}");
                }
                self.frame.publish(&self.engine);
            }
            Command::SeekFrame(index) => {
                if let Err(e) = self.engine.seek_to_frame(index) {
                    log::warn!("Seek to frame {index} failed: {e}");
                }
                self.frame.publish(&self.engine);
            }
            Command::SetSpeed(factor) => {
                if let Err(e) = self.engine.set_speed_factor(factor) {
                    log::warn!("Speed change rejected: {e}");
                }
            }
            Command::Recycle => return Flow::Exit,
        }
        Flow::Continue
    }

    /// Render if due. Returns how long to wait before the next frame, or
    /// `None` when nothing more needs scheduling.
    fn tick(&mut self) -> Option<Duration> {
        let Some(outcome) = self.engine.render_frame() else {
            return None;
        };
        if outcome.advanced {
            self.frame.publish(&self.engine);
        }
        if outcome.loop_completed {
            self.listeners.notify();
        }
        if self.engine.frame_count() <= 1 || self.engine.is_finished() {
            return None;
        }
        let delay = if outcome.delay_ms == 0 {
            self.min_frame_interval_ms
        } else {
            outcome.delay_ms
        };
        Some(Duration::from_millis(u64::from(delay)))
    }
}
