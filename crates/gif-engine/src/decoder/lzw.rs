//! Variable-width LZW decoding of GIF image data.

use crate::error::DecodeError;
use crate::source::SourceReader;

/// Codes never grow past 12 bits.
pub const MAX_CODE_SIZE: u8 = 12;
const TABLE_SIZE: usize = 1 << MAX_CODE_SIZE;

/// Accepted range for the minimum code size byte preceding the image data.
pub const MIN_CODE_SIZE_RANGE: std::ops::RangeInclusive<u8> = 1..=11;

/// Iterates the bytes of a chain of data sub-blocks as one stream,
/// stopping at the zero-length terminator.
pub struct SubBlocks<'a> {
    reader: &'a mut SourceReader,
    block: [u8; 255],
    len: usize,
    pos: usize,
    finished: bool,
}

impl<'a> SubBlocks<'a> {
    pub fn new(reader: &'a mut SourceReader) -> Self {
        Self {
            reader,
            block: [0; 255],
            len: 0,
            pos: 0,
            finished: false,
        }
    }
}

impl Iterator for SubBlocks<'_> {
    type Item = Result<u8, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.pos == self.len {
            if self.finished {
                return None;
            }
            let size = match self.reader.read_u8() {
                Ok(size) => usize::from(size),
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            };
            if size == 0 {
                self.finished = true;
                return None;
            }
            if let Err(e) = self.reader.fill(&mut self.block[..size]) {
                self.finished = true;
                return Some(Err(e));
            }
            self.len = size;
            self.pos = 0;
        }
        let b = self.block[self.pos];
        self.pos += 1;
        Some(Ok(b))
    }
}

/// Dictionary decoder. The tables are allocated once and reused for every frame.
pub struct LzwDecoder {
    prefix: Vec<u16>,
    suffix: Vec<u8>,
    stack: Vec<u8>,
}

impl LzwDecoder {
    pub fn new() -> Self {
        Self {
            prefix: vec![0; TABLE_SIZE],
            suffix: vec![0; TABLE_SIZE],
            stack: Vec::with_capacity(TABLE_SIZE),
        }
    }

    /// Heap bytes held by the code tables.
    pub fn heap_size(&self) -> usize {
        self.prefix.capacity() * 2 + self.suffix.capacity() + self.stack.capacity()
    }

    /// Decode indices into `out` until it is full, the end-of-information
    /// code is read, or the input runs out. Returns the number of indices written.
    pub fn decode<I>(&mut self, min_code_size: u8, input: I, out: &mut [u8]) -> Result<usize, DecodeError>
    where
        I: IntoIterator<Item = Result<u8, DecodeError>>,
    {
        if !MIN_CODE_SIZE_RANGE.contains(&min_code_size) {
            return Err(DecodeError::InvalidBlock(format!(
                "LZW minimum code size {min_code_size} out of range"
            )));
        }

        let clear = 1u16 << min_code_size;
        let end_of_info = clear + 1;
        let mut code_size = min_code_size + 1;
        let mut next_code = clear + 2;
        let mut prev: Option<u16> = None;
        let mut first: u8 = 0;

        let mut bits: u32 = 0;
        let mut bit_count: u8 = 0;
        let mut written = 0usize;
        let mut input = input.into_iter();

        for i in 0..clear {
            self.suffix[usize::from(i)] = i as u8;
        }

        while written < out.len() {
            while bit_count < code_size {
                match input.next() {
                    Some(Ok(byte)) => {
                        bits |= u32::from(byte) << bit_count;
                        bit_count += 8;
                    }
                    Some(Err(e)) => return Err(e),
                    // Missing end-of-information code: keep what was decoded.
                    None => return Ok(written),
                }
            }
            let code = (bits & ((1u32 << code_size) - 1)) as u16;
            bits >>= code_size;
            bit_count -= code_size;

            if code == clear {
                code_size = min_code_size + 1;
                next_code = clear + 2;
                prev = None;
                continue;
            }
            if code == end_of_info {
                break;
            }

            let Some(prev_code) = prev else {
                if code > clear {
                    return Err(DecodeError::CorruptStream(format!(
                        "first code {code} is not a literal"
                    )));
                }
                out[written] = code as u8;
                written += 1;
                first = code as u8;
                prev = Some(code);
                continue;
            };

            if code > next_code {
                return Err(DecodeError::CorruptStream(format!(
                    "code {code} used before definition (next is {next_code})"
                )));
            }

            self.stack.clear();
            let mut cur = if code == next_code {
                self.stack.push(first);
                prev_code
            } else {
                code
            };
            while cur > clear {
                self.stack.push(self.suffix[usize::from(cur)]);
                cur = self.prefix[usize::from(cur)];
                if self.stack.len() > TABLE_SIZE {
                    return Err(DecodeError::CorruptStream("code chain loops".into()));
                }
            }
            first = self.suffix[usize::from(cur)];
            self.stack.push(first);

            while let Some(index) = self.stack.pop() {
                if written == out.len() {
                    break;
                }
                out[written] = index;
                written += 1;
            }

            if usize::from(next_code) < TABLE_SIZE {
                self.prefix[usize::from(next_code)] = prev_code;
                self.suffix[usize::from(next_code)] = first;
                next_code += 1;
                if next_code == 1 << code_size && code_size < MAX_CODE_SIZE {
                    code_size += 1;
                }
            }
            prev = Some(code);
        }

        Ok(written)
    }
}

impl Default for LzwDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Raster row of the `n`-th row stored in an interlaced frame of `height` rows.
pub fn interlaced_row(n: usize, height: usize) -> usize {
    const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
    let mut n = n;
    for (start, step) in PASSES {
        let rows = if height > start {
            (height - start).div_ceil(step)
        } else {
            0
        };
        if n < rows {
            return start + n * step;
        }
        n -= rows;
    }
    height.saturating_sub(1)
}
