//! ARGB back-buffer and frame compositing.

pub mod compositor;

pub use compositor::{Compositor, FrameOutcome};

/// Transparent ARGB pixel.
pub const TRANSPARENT: u32 = 0;

/// Pixel rectangle on the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Intersect with `(0, 0, width, height)`.
    pub fn clip(self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// ARGB (`0xAARRGGBB`) pixel surface the engine renders into.
///
/// A buffer may be larger than the GIF it currently holds when it was
/// adopted from a previous engine; rows are always `width()` pixels apart.
#[derive(Debug, Clone)]
pub struct BackBuffer {
    pixels: Vec<u32>,
    width: u32,
    height: u32,
}

impl BackBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![TRANSPARENT; width as usize * height as usize],
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Whether an image of the given size fits without reallocating.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width >= width && self.height >= height
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Raw bytes in native endianness, e.g. for texture upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.pixels)
    }

    /// Bytes allocated for pixel storage.
    pub fn allocation_byte_count(&self) -> usize {
        self.pixels.capacity() * std::mem::size_of::<u32>()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.pixels[self.offset(x, y)])
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn clear(&mut self) {
        self.pixels.fill(TRANSPARENT);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: u32) {
        let rect = rect.clip(self.width, self.height);
        for y in rect.y..rect.y + rect.height {
            let start = self.offset(rect.x, y);
            self.pixels[start..start + rect.width as usize].fill(color);
        }
    }

    /// Copy the pixels under `rect` into `out` (row-major, replacing its contents).
    pub fn save_rect(&self, rect: Rect, out: &mut Vec<u32>) {
        let rect = rect.clip(self.width, self.height);
        out.clear();
        for y in rect.y..rect.y + rect.height {
            let start = self.offset(rect.x, y);
            out.extend_from_slice(&self.pixels[start..start + rect.width as usize]);
        }
    }

    /// Inverse of [`BackBuffer::save_rect`].
    pub fn restore_rect(&mut self, rect: Rect, saved: &[u32]) {
        let rect = rect.clip(self.width, self.height);
        if saved.len() < rect.area() {
            return;
        }
        let w = rect.width as usize;
        for (row, y) in (rect.y..rect.y + rect.height).enumerate() {
            let start = self.offset(rect.x, y);
            self.pixels[start..start + w].copy_from_slice(&saved[row * w..(row + 1) * w]);
        }
    }

    /// Mutable row slice starting at `(x, y)`, `len` pixels long (clipped).
    pub fn row_mut(&mut self, x: u32, y: u32, len: u32) -> &mut [u32] {
        if y >= self.height || x >= self.width {
            return &mut [];
        }
        let len = len.min(self.width - x) as usize;
        let start = self.offset(x, y);
        &mut self.pixels[start..start + len]
    }

    /// Compact copy of the top-left `width` x `height` region.
    pub fn copy_region(&self, width: u32, height: u32) -> Vec<u32> {
        let mut out = Vec::with_capacity(width as usize * height as usize);
        self.save_rect(Rect::new(0, 0, width, height), &mut out);
        out
    }
}
