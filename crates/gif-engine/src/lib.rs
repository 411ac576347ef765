//! Stateful GIF decoding and animation playback.
//!
//! A GIF is opened from a [`Source`] into a [`GifEngine`], which parses the
//! stream once, then decodes and composites frames on demand into a single
//! reusable ARGB [`BackBuffer`]. The engine tracks frame timing, speed, loop
//! counts and forward seeking. [`GifPlayer`] runs an engine on its own thread
//! and accepts commands from any thread.
//!
//! ```no_run
//! use std::sync::Arc;
//! use gif_engine::{GifPlayer, Source};
//!
//! let player = GifPlayer::open(Source::Path("anim.gif".into()))?;
//! player.add_listener(Arc::new(|| log::info!("loop finished")));
//! player.start();
//! # Ok::<(), gif_engine::GifError>(())
//! ```

pub mod config;
pub mod decoder;
pub mod error;
pub mod playback;
pub mod render;
pub mod source;

#[cfg(test)]
mod test_support;

pub use config::PlayerConfig;
pub use decoder::{DisposalMethod, FrameDescriptor, GifInfo};
pub use error::{DecodeError, ErrorCode, GifError, OpenError, Result};
pub use playback::player::FrameSlot;
pub use playback::{
    AnimationListener, Clock, GifEngine, GifPlayer, ListenerId, ListenerSet, ManualClock,
    MonotonicClock, OpenOptions, PlaybackStatus, RenderOutcome,
};
pub use render::{BackBuffer, Rect};
pub use source::{MarkableStream, Source, SourceReader};
