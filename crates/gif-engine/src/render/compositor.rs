use super::{BackBuffer, Rect, TRANSPARENT};
use crate::decoder::lzw::{LzwDecoder, SubBlocks, interlaced_row};
use crate::decoder::{DisposalMethod, FrameDescriptor, GifInfo};
use crate::error::DecodeError;
use crate::source::SourceReader;

/// Result of compositing one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOutcome {
    pub index: usize,
    /// Unscaled frame duration (multiple of 10, may be 0).
    pub duration_ms: u32,
    /// This was the final frame of the loop.
    pub last_in_loop: bool,
    /// Decode failure for this frame. The buffer keeps its previous content
    /// for the failed region.
    pub error: Option<DecodeError>,
}

/// How the previous frame must be cleaned up before the next one is drawn.
#[derive(Debug, Clone, Copy)]
struct PendingDisposal {
    method: DisposalMethod,
    rect: Rect,
}

/// Decodes frames in order and composites them into a [`BackBuffer`],
/// applying each frame's disposal before the following frame.
pub struct Compositor {
    lzw: LzwDecoder,
    indices: Vec<u8>,
    /// Canvas content under the last `RestorePrevious` frame.
    snapshot: Vec<u32>,
    pending: Option<PendingDisposal>,
    next_index: usize,
}

impl Compositor {
    pub fn new() -> Self {
        Self {
            lzw: LzwDecoder::new(),
            indices: Vec::new(),
            snapshot: Vec::new(),
            pending: None,
            next_index: 0,
        }
    }

    /// Index of the frame the next sequential render produces.
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// Start over from frame 0 on the next render.
    pub fn reset(&mut self) {
        self.next_index = 0;
        self.pending = None;
        self.snapshot.clear();
    }

    pub fn heap_size(&self) -> usize {
        self.lzw.heap_size() + self.indices.capacity() + self.snapshot.capacity() * 4
    }

    /// Render the next frame in sequence.
    pub fn render_next(
        &mut self,
        reader: &mut SourceReader,
        info: &GifInfo,
        buffer: &mut BackBuffer,
    ) -> FrameOutcome {
        let index = self.next_index;
        self.composite(index, reader, info, buffer)
    }

    /// Render frame `index`. Frames between the current position and `index`
    /// are composited on the way; an index behind the current position starts
    /// a new loop from frame 0.
    pub fn render_frame(
        &mut self,
        index: usize,
        reader: &mut SourceReader,
        info: &GifInfo,
        buffer: &mut BackBuffer,
    ) -> FrameOutcome {
        let index = index.min(info.frame_count().saturating_sub(1));
        if index < self.next_index {
            self.reset();
        }
        loop {
            let outcome = self.render_next(reader, info, buffer);
            if outcome.index == index {
                return outcome;
            }
        }
    }

    fn composite(
        &mut self,
        index: usize,
        reader: &mut SourceReader,
        info: &GifInfo,
        buffer: &mut BackBuffer,
    ) -> FrameOutcome {
        let frame = &info.frames[index];
        let screen_w = u32::from(info.width);
        let screen_h = u32::from(info.height);

        if index == 0 {
            buffer.clear();
            self.pending = None;
        } else if let Some(pending) = self.pending.take() {
            self.dispose(pending, buffer);
        }

        let rect = Rect::new(
            u32::from(frame.left),
            u32::from(frame.top),
            u32::from(frame.width),
            u32::from(frame.height),
        )
        .clip(screen_w, screen_h);

        if frame.disposal == DisposalMethod::RestorePrevious {
            buffer.save_rect(rect, &mut self.snapshot);
        }

        let error = match self.decode(frame, reader) {
            Ok(written) => {
                self.blit(frame, info, written, buffer);
                None
            }
            Err(e) => {
                log::warn!("Frame {index} failed to decode: {e}");
                Some(e)
            }
        };

        self.pending = Some(PendingDisposal {
            method: frame.disposal,
            rect,
        });

        let last_in_loop = index + 1 >= info.frame_count();
        self.next_index = if last_in_loop { 0 } else { index + 1 };

        FrameOutcome {
            index,
            duration_ms: frame.duration_ms(),
            last_in_loop,
            error,
        }
    }

    fn dispose(&self, pending: PendingDisposal, buffer: &mut BackBuffer) {
        match pending.method {
            DisposalMethod::Unspecified | DisposalMethod::Keep => {}
            DisposalMethod::RestoreBackground => buffer.fill_rect(pending.rect, TRANSPARENT),
            DisposalMethod::RestorePrevious => buffer.restore_rect(pending.rect, &self.snapshot),
        }
    }

    fn decode(&mut self, frame: &FrameDescriptor, reader: &mut SourceReader) -> Result<usize, DecodeError> {
        reader
            .seek_to(frame.data_offset)
            .map_err(|_| DecodeError::TruncatedData {
                offset: frame.data_offset,
            })?;
        let min_code_size = reader.read_u8()?;
        self.indices.clear();
        self.indices.resize(frame.pixel_count(), 0);
        self.lzw
            .decode(min_code_size, SubBlocks::new(reader), &mut self.indices)
    }

    /// Write the first `written` decoded indices through the palette.
    fn blit(&self, frame: &FrameDescriptor, info: &GifInfo, written: usize, buffer: &mut BackBuffer) {
        let palette = info.palette_for(frame);
        let fw = usize::from(frame.width);
        let fh = usize::from(frame.height);
        if fw == 0 {
            return;
        }
        let screen_w = u32::from(info.width);
        let screen_h = u32::from(info.height);

        for (n, row) in self.indices[..written].chunks(fw).enumerate() {
            let raster_row = if frame.interlaced {
                interlaced_row(n, fh)
            } else {
                n
            };
            let y = u32::from(frame.top) + raster_row as u32;
            let x = u32::from(frame.left);
            if y >= screen_h || x >= screen_w {
                continue;
            }
            let dst = buffer.row_mut(x, y, screen_w - x);
            for (px, &index) in dst.iter_mut().zip(row) {
                if frame.transparent_index == Some(index) {
                    continue;
                }
                if let Some(&color) = palette.get(usize::from(index)) {
                    *px = color;
                }
            }
        }
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}
