//! GIF fixtures shared by the unit tests.

use std::borrow::Cow;

use crate::decoder::DisposalMethod;

/// Fixture palette: index 0 black, 1 red, 2 green, 3 blue, then grays.
pub const RED: u32 = 0xFFFF_0000;
pub const GREEN: u32 = 0xFF00_FF00;
pub const BLUE: u32 = 0xFF00_00FF;
pub const BLACK: u32 = 0xFF00_0000;

fn palette_rgb(entries: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(entries * 3);
    for i in 0..entries {
        let c: [u8; 3] = match i {
            0 => [0, 0, 0],
            1 => [255, 0, 0],
            2 => [0, 255, 0],
            3 => [0, 0, 255],
            n => {
                let v = (n * 16) as u8;
                [v, v, v]
            }
        };
        rgb.extend_from_slice(&c);
    }
    rgb
}

/// Writes raw GIF blocks. Image data is LZW encoded with literal codes only,
/// clearing before the code table would widen.
pub struct GifBuilder {
    out: Vec<u8>,
    palette_entries: usize,
}

impl GifBuilder {
    /// `palette_entries` must be a power of two in 2..=256.
    pub fn new(width: u16, height: u16, palette_entries: usize) -> Self {
        let size_bits = palette_entries.trailing_zeros() as u8 - 1;
        let mut out = Vec::new();
        out.extend_from_slice(b"GIF89a");
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.push(0x80 | size_bits);
        out.push(0);
        out.push(0);
        out.extend_from_slice(&palette_rgb(palette_entries));
        Self {
            out,
            palette_entries,
        }
    }

    pub fn loop_count(mut self, count: u16) -> Self {
        self.out.extend_from_slice(&[0x21, 0xFF, 11]);
        self.out.extend_from_slice(b"NETSCAPE2.0");
        self.out.extend_from_slice(&[3, 1]);
        self.out.extend_from_slice(&count.to_le_bytes());
        self.out.push(0);
        self
    }

    pub fn comment(mut self, text: &str) -> Self {
        self.out.extend_from_slice(&[0x21, 0xFE]);
        push_sub_blocks(&mut self.out, text.as_bytes());
        self
    }

    pub fn control(mut self, disposal: DisposalMethod, delay_cs: u16, transparent: Option<u8>) -> Self {
        let disposal_bits: u8 = match disposal {
            DisposalMethod::Unspecified => 0,
            DisposalMethod::Keep => 1,
            DisposalMethod::RestoreBackground => 2,
            DisposalMethod::RestorePrevious => 3,
        };
        let flags = (disposal_bits << 2) | u8::from(transparent.is_some());
        self.out.extend_from_slice(&[0x21, 0xF9, 4, flags]);
        self.out.extend_from_slice(&delay_cs.to_le_bytes());
        self.out.push(transparent.unwrap_or(0));
        self.out.push(0);
        self
    }

    pub fn image(self, left: u16, top: u16, width: u16, height: u16, indices: &[u8]) -> Self {
        self.image_with(left, top, width, height, indices, false)
    }

    /// `indices` are written as given; for interlaced frames they must
    /// already be in interlaced row order.
    pub fn image_with(
        mut self,
        left: u16,
        top: u16,
        width: u16,
        height: u16,
        indices: &[u8],
        interlaced: bool,
    ) -> Self {
        self.out.push(0x2C);
        for v in [left, top, width, height] {
            self.out.extend_from_slice(&v.to_le_bytes());
        }
        self.out.push(if interlaced { 0x40 } else { 0 });
        let min_code_size = (self.palette_entries.trailing_zeros() as u8).max(2);
        self.out.push(min_code_size);
        let data = encode_literals(indices, min_code_size);
        push_sub_blocks(&mut self.out, &data);
        self
    }

    /// Append raw bytes, e.g. a hand-made data section.
    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.out.extend_from_slice(bytes);
        self
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.out.push(0x3B);
        self.out
    }
}

fn push_sub_blocks(out: &mut Vec<u8>, data: &[u8]) {
    for chunk in data.chunks(255) {
        out.push(chunk.len() as u8);
        out.extend_from_slice(chunk);
    }
    out.push(0);
}

fn encode_literals(indices: &[u8], min_code_size: u8) -> Vec<u8> {
    let clear = 1u32 << min_code_size;
    let width = u32::from(min_code_size) + 1;
    let run = (clear - 2) as usize;
    let mut out = Vec::new();
    let mut acc = 0u32;
    let mut n = 0u32;
    let mut emit = |code: u32, out: &mut Vec<u8>| {
        acc |= code << n;
        n += width;
        while n >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            n -= 8;
        }
    };
    for chunk in indices.chunks(run) {
        emit(clear, &mut out);
        for &i in chunk {
            emit(u32::from(i), &mut out);
        }
    }
    emit(clear + 1, &mut out);
    if n > 0 {
        out.push(acc as u8);
    }
    out
}

/// One frame for [`encode_with_gif_crate`].
pub struct FixtureFrame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub indices: Vec<u8>,
    pub delay_cs: u16,
    pub disposal: DisposalMethod,
    pub transparent: Option<u8>,
}

impl FixtureFrame {
    pub fn full(width: u16, height: u16, index: u8, delay_cs: u16) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            indices: vec![index; usize::from(width) * usize::from(height)],
            delay_cs,
            disposal: DisposalMethod::Keep,
            transparent: None,
        }
    }
}

/// Encode frames with the reference `gif` encoder (real LZW compression).
pub fn encode_with_gif_crate(width: u16, height: u16, loops: u16, frames: &[FixtureFrame]) -> Vec<u8> {
    let mut out = Vec::new();
    {
        let palette = palette_rgb(16);
        let mut encoder = gif::Encoder::new(&mut out, width, height, &palette).unwrap();
        let repeat = if loops == 0 {
            gif::Repeat::Infinite
        } else {
            gif::Repeat::Finite(loops)
        };
        encoder.set_repeat(repeat).unwrap();
        for f in frames {
            let mut frame = gif::Frame::default();
            frame.left = f.left;
            frame.top = f.top;
            frame.width = f.width;
            frame.height = f.height;
            frame.delay = f.delay_cs;
            frame.transparent = f.transparent;
            frame.dispose = match f.disposal {
                DisposalMethod::Unspecified => gif::DisposalMethod::Any,
                DisposalMethod::Keep => gif::DisposalMethod::Keep,
                DisposalMethod::RestoreBackground => gif::DisposalMethod::Background,
                DisposalMethod::RestorePrevious => gif::DisposalMethod::Previous,
            };
            frame.buffer = Cow::Borrowed(&f.indices);
            encoder.write_frame(&frame).unwrap();
        }
    }
    out
}

/// Three full-screen-ish frames with delays [10, 20, 30] cs; frame 1 is a
/// smaller rect disposed to background.
pub fn three_frame_gif() -> Vec<u8> {
    GifBuilder::new(4, 4, 4)
        .control(DisposalMethod::Keep, 10, None)
        .image(0, 0, 4, 4, &[1; 16])
        .control(DisposalMethod::RestoreBackground, 20, None)
        .image(1, 1, 2, 2, &[2; 4])
        .control(DisposalMethod::Keep, 30, Some(0))
        .image(0, 0, 2, 1, &[3, 0])
        .finish()
}
