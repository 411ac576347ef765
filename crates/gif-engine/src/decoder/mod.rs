//! GIF stream structure: signatures, block labels and the metadata the
//! parser extracts.
//!
//! Supports GIF87a and GIF89a with:
//!
//! - Global and local color tables
//! - Graphic control extensions (delay, disposal, transparency)
//! - NETSCAPE2.0 / ANIMEXTS1.0 loop counts
//! - Comment extensions
//! - Interlaced images

pub mod lzw;
pub mod parser;

pub use parser::parse;

use crate::error::DecodeError;

/// GIF87a file signature.
pub const GIF87A_SIGNATURE: &[u8; 6] = b"GIF87a";
/// GIF89a file signature.
pub const GIF89A_SIGNATURE: &[u8; 6] = b"GIF89a";

/// Extension introducer byte.
pub const EXTENSION_INTRODUCER: u8 = 0x21;
/// Image separator byte.
pub const IMAGE_SEPARATOR: u8 = 0x2C;
/// File trailer byte.
pub const TRAILER: u8 = 0x3B;

/// Graphic control extension label.
pub const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
/// Comment extension label.
pub const COMMENT_LABEL: u8 = 0xFE;
/// Application extension label.
pub const APPLICATION_LABEL: u8 = 0xFF;
/// Plain text extension label.
pub const PLAIN_TEXT_LABEL: u8 = 0x01;

/// Color table used when a frame has neither a local nor a global table.
pub static DEFAULT_PALETTE: [u32; 256] = grayscale_palette();

const fn grayscale_palette() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u32;
        table[i] = 0xFF00_0000 | (v << 16) | (v << 8) | v;
        i += 1;
    }
    table
}

/// Pack an RGB triple into an opaque ARGB pixel.
#[inline]
pub fn argb(r: u8, g: u8, b: u8) -> u32 {
    0xFF00_0000 | (u32::from(r) << 16) | (u32::from(g) << 8) | u32::from(b)
}

/// How the canvas is treated once a frame's display time is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisposalMethod {
    /// No disposal specified; the frame is left in place.
    #[default]
    Unspecified,
    /// Do not dispose.
    Keep,
    /// Clear the frame's rect to the background (transparent).
    RestoreBackground,
    /// Restore the canvas to what it was before the frame was drawn.
    RestorePrevious,
}

impl DisposalMethod {
    /// Parse from the packed flags byte of a graphic control extension.
    /// Reserved values 4-7 are treated as unspecified.
    pub fn from_flags(flags: u8) -> Self {
        match (flags >> 2) & 0x07 {
            1 => DisposalMethod::Keep,
            2 => DisposalMethod::RestoreBackground,
            3 => DisposalMethod::RestorePrevious,
            _ => DisposalMethod::Unspecified,
        }
    }
}

/// Per-frame metadata. Pixel data stays in the source and is decoded on demand.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameDescriptor {
    /// Offset of the LZW minimum code size byte, relative to the source start.
    pub data_offset: u64,
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    /// Local color table as opaque ARGB, if present.
    pub local_palette: Option<Vec<u32>>,
    pub disposal: DisposalMethod,
    pub transparent_index: Option<u8>,
    /// Delay in hundredths of a second.
    pub delay_cs: u16,
    pub interlaced: bool,
}

impl FrameDescriptor {
    /// Frame duration in milliseconds (always a multiple of 10).
    pub fn duration_ms(&self) -> u32 {
        u32::from(self.delay_cs) * 10
    }

    pub fn pixel_count(&self) -> usize {
        usize::from(self.width) * usize::from(self.height)
    }
}

/// Metadata of an opened GIF. Immutable after parsing.
#[derive(Debug, Clone)]
pub struct GifInfo {
    pub width: u16,
    pub height: u16,
    pub global_palette: Option<Vec<u32>>,
    pub background_index: u8,
    /// Number of loops, 0 = infinite.
    pub loop_count: u16,
    pub comment: Option<String>,
    pub frames: Vec<FrameDescriptor>,
    /// Non-fatal problem found while scanning (e.g. a truncated last frame).
    pub parse_error: Option<DecodeError>,
}

impl GifInfo {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Duration of one loop in milliseconds, saturating at `u32::MAX`.
    pub fn duration_ms(&self) -> u32 {
        self.frame_end_ms(self.frames.len().saturating_sub(1))
    }

    /// Loop-relative time at which frame `index` stops being displayed.
    pub fn frame_end_ms(&self, index: usize) -> u32 {
        self.frames
            .iter()
            .take(index + 1)
            .fold(0u32, |end, frame| end.saturating_add(frame.duration_ms()))
    }

    /// First frame whose display window `[start, end]` contains `ms`.
    /// Times past the end of the loop resolve to the last frame.
    pub fn frame_at_time(&self, ms: u32) -> usize {
        let mut end = 0u32;
        for (i, frame) in self.frames.iter().enumerate() {
            end = end.saturating_add(frame.duration_ms());
            if end >= ms {
                return i;
            }
        }
        self.frames.len().saturating_sub(1)
    }

    /// Color table in effect for `frame`.
    pub fn palette_for<'a>(&'a self, frame: &'a FrameDescriptor) -> &'a [u32] {
        frame
            .local_palette
            .as_deref()
            .or(self.global_palette.as_deref())
            .unwrap_or(&DEFAULT_PALETTE[..])
    }

    /// Heap bytes held by this metadata.
    pub fn heap_size(&self) -> usize {
        let palettes: usize = self
            .frames
            .iter()
            .filter_map(|f| f.local_palette.as_ref())
            .map(|p| p.len() * 4)
            .sum();
        self.frames.len() * std::mem::size_of::<FrameDescriptor>()
            + palettes
            + self.global_palette.as_ref().map_or(0, |p| p.len() * 4)
            + self.comment.as_ref().map_or(0, String::len)
    }
}
