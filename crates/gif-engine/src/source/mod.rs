//! Uniform byte access over the places a GIF can come from.
//!
//! Every source is opened into a [`SourceReader`], which reads relative to
//! the position the source had when it was opened and can be rewound to it.

use std::fmt;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{DecodeError, OpenError};

/// A readable, seekable stream. Seeking is what makes a stream "markable":
/// the position at open time is remembered and restored on rewind.
pub trait MarkableStream: Read + Seek + Send {}

impl<T: Read + Seek + Send> MarkableStream for T {}

/// Where the GIF bytes come from.
pub enum Source {
    /// File system path. Length is known.
    Path(PathBuf),
    /// Already-open descriptor, read from its current position. Length is unknown.
    File(File),
    /// Shared immutable buffer. Length is known.
    Buffer(Arc<[u8]>),
    /// Owned byte array. Length is known.
    Bytes(Vec<u8>),
    /// Arbitrary stream, read from its current position. Length is unknown.
    Stream(Box<dyn MarkableStream>),
    /// A region of a file, e.g. an asset packed into a larger archive.
    AssetFd { file: File, start: u64, length: u64 },
}

impl Source {
    pub fn kind(&self) -> &'static str {
        match self {
            Source::Path(_) => "path",
            Source::File(_) => "file",
            Source::Buffer(_) => "buffer",
            Source::Bytes(_) => "bytes",
            Source::Stream(_) => "stream",
            Source::AssetFd { .. } => "asset-fd",
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Path(p) => write!(f, "Source::Path({})", p.display()),
            Source::Buffer(b) => write!(f, "Source::Buffer({} bytes)", b.len()),
            Source::Bytes(b) => write!(f, "Source::Bytes({} bytes)", b.len()),
            Source::AssetFd { start, length, .. } => {
                write!(f, "Source::AssetFd(start={start}, length={length})")
            }
            other => write!(f, "Source::{}", other.kind()),
        }
    }
}

impl From<Vec<u8>> for Source {
    fn from(bytes: Vec<u8>) -> Self {
        Source::Bytes(bytes)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

enum Backing {
    File(File),
    Memory(Arc<[u8]>),
    Stream(Box<dyn MarkableStream>),
}

/// Open handle on a [`Source`].
pub struct SourceReader {
    backing: Backing,
    /// Absolute offset of logical position 0 in the backing.
    start: u64,
    /// Reads never go past this many bytes (asset regions).
    limit: Option<u64>,
    length: Option<u64>,
    pos: u64,
}

impl SourceReader {
    pub fn open(source: Source) -> Result<Self, OpenError> {
        match source {
            Source::Path(path) => {
                let context = path.display().to_string();
                let file = File::open(&path).map_err(|e| OpenError::from_io(e, &context))?;
                let length = file
                    .metadata()
                    .map_err(|e| OpenError::from_io(e, &context))?
                    .len();
                Ok(Self::with_backing(Backing::File(file), 0, None, Some(length)))
            }
            Source::File(mut file) => {
                let start = file
                    .stream_position()
                    .map_err(|e| OpenError::NotMarkable(e.to_string()))?;
                Ok(Self::with_backing(Backing::File(file), start, None, None))
            }
            Source::Buffer(buf) => {
                let length = buf.len() as u64;
                Ok(Self::with_backing(Backing::Memory(buf), 0, None, Some(length)))
            }
            Source::Bytes(bytes) => {
                let length = bytes.len() as u64;
                Ok(Self::with_backing(Backing::Memory(bytes.into()), 0, None, Some(length)))
            }
            Source::Stream(mut stream) => {
                let start = stream
                    .stream_position()
                    .map_err(|e| OpenError::NotMarkable(e.to_string()))?;
                Ok(Self::with_backing(Backing::Stream(stream), start, None, None))
            }
            Source::AssetFd {
                mut file,
                start,
                length,
            } => {
                file.seek(SeekFrom::Start(start))?;
                Ok(Self::with_backing(
                    Backing::File(file),
                    start,
                    Some(length),
                    Some(length),
                ))
            }
        }
    }

    fn with_backing(backing: Backing, start: u64, limit: Option<u64>, length: Option<u64>) -> Self {
        Self {
            backing,
            start,
            limit,
            length,
            pos: 0,
        }
    }

    /// Total length when statically known.
    pub fn len(&self) -> Option<u64> {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == Some(0)
    }

    /// Length in bytes, or -1 when unknown.
    pub fn byte_count(&self) -> i64 {
        self.length.map_or(-1, |l| l as i64)
    }

    /// Current offset relative to where the source was opened.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `buf.len()` bytes. Returns 0 at end of data.
    pub fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = match self.limit {
            Some(limit) => (limit.saturating_sub(self.pos)).min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        if want == 0 {
            return Ok(0);
        }
        let n = match &mut self.backing {
            Backing::File(f) => f.read(&mut buf[..want])?,
            Backing::Stream(s) => s.read(&mut buf[..want])?,
            Backing::Memory(data) => {
                let at = (self.start + self.pos).min(data.len() as u64) as usize;
                let n = want.min(data.len() - at);
                buf[..n].copy_from_slice(&data[at..at + n]);
                n
            }
        };
        self.pos += n as u64;
        Ok(n)
    }

    /// Move to `offset` relative to the source start. On failure the
    /// position is left unchanged.
    pub fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        let absolute = self.start + offset;
        match &mut self.backing {
            Backing::File(f) => {
                f.seek(SeekFrom::Start(absolute))?;
            }
            Backing::Stream(s) => {
                s.seek(SeekFrom::Start(absolute))?;
            }
            Backing::Memory(_) => {}
        }
        self.pos = offset;
        Ok(())
    }

    /// Return to the position the source had when it was opened.
    pub fn rewind(&mut self) -> io::Result<()> {
        self.seek_to(0)
    }

    /// Fill `buf` completely or fail with `TruncatedData`.
    pub fn fill(&mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => return Err(DecodeError::TruncatedData { offset: self.pos }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("Read failed at offset {}: {e}", self.pos);
                    return Err(DecodeError::TruncatedData { offset: self.pos });
                }
            }
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let mut b = [0u8; 1];
        self.fill(&mut b)?;
        Ok(b[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, DecodeError> {
        let mut b = [0u8; 2];
        self.fill(&mut b)?;
        Ok(u16::from_le_bytes(b))
    }

    /// Skip `n` bytes without reading them.
    pub fn skip(&mut self, n: u64) -> Result<(), DecodeError> {
        let target = self.pos + n;
        if let Some(len) = self.length {
            if target > len {
                return Err(DecodeError::TruncatedData { offset: len });
            }
        }
        self.seek_to(target)
            .map_err(|_| DecodeError::TruncatedData { offset: self.pos })
    }
}
