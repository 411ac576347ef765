//! Error types for opening, decoding and driving a GIF.
//!
//! Open-time failures are returned as `Err`. Once an engine is open, decode
//! failures are recorded as a sticky [`ErrorCode`] and never abort playback.

use std::fmt;
use std::io;

use thiserror::Error;

/// Failure to open the byte source.
#[derive(Error, Debug)]
pub enum OpenError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The stream cannot report or restore its position, so it cannot be rewound.
    #[error("stream does not support rewinding: {0}")]
    NotMarkable(String),

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

impl OpenError {
    /// Classify an I/O error by kind, keeping `context` (usually a path) in the message.
    pub fn from_io(err: io::Error, context: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => OpenError::NotFound(context.to_string()),
            io::ErrorKind::PermissionDenied => OpenError::PermissionDenied(context.to_string()),
            _ => OpenError::Io(err),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            OpenError::NotFound(_) => ErrorCode::NotFound,
            OpenError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            OpenError::NotMarkable(_) => ErrorCode::NotMarkable,
            OpenError::Io(_) => ErrorCode::Io,
        }
    }
}

/// Malformed or incomplete GIF data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("invalid GIF header: {0}")]
    InvalidHeader(String),

    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("truncated data at offset {offset}")]
    TruncatedData { offset: u64 },

    #[error("corrupt LZW stream: {0}")]
    CorruptStream(String),

    #[error("GIF contains no frames")]
    NoFrames,
}

impl DecodeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::InvalidHeader(_) => ErrorCode::InvalidHeader,
            DecodeError::InvalidBlock(_) => ErrorCode::InvalidBlock,
            DecodeError::TruncatedData { .. } => ErrorCode::TruncatedData,
            DecodeError::CorruptStream(_) => ErrorCode::CorruptStream,
            DecodeError::NoFrames => ErrorCode::NoFrames,
        }
    }
}

/// Top-level error returned by the public API.
#[derive(Error, Debug)]
pub enum GifError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The engine has already been freed.
    #[error("engine has been recycled")]
    Recycled,
}

impl GifError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GifError::Open(e) => e.code(),
            GifError::Decode(e) => e.code(),
            GifError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            GifError::Recycled => ErrorCode::Recycled,
        }
    }
}

impl From<io::Error> for GifError {
    fn from(err: io::Error) -> Self {
        GifError::Open(OpenError::Io(err))
    }
}

pub type Result<T> = std::result::Result<T, GifError>;

/// Queryable error code, stored atomically on the engine and player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u16)]
pub enum ErrorCode {
    #[default]
    None = 0,
    NotFound = 101,
    PermissionDenied = 102,
    NotMarkable = 103,
    Io = 104,
    InvalidHeader = 201,
    InvalidBlock = 202,
    TruncatedData = 203,
    CorruptStream = 204,
    NoFrames = 205,
    InvalidArgument = 301,
    Recycled = 302,
    Unknown = 999,
}

impl ErrorCode {
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Inverse of [`ErrorCode::code`]. Unrecognised values map to `Unknown`.
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => ErrorCode::None,
            101 => ErrorCode::NotFound,
            102 => ErrorCode::PermissionDenied,
            103 => ErrorCode::NotMarkable,
            104 => ErrorCode::Io,
            201 => ErrorCode::InvalidHeader,
            202 => ErrorCode::InvalidBlock,
            203 => ErrorCode::TruncatedData,
            204 => ErrorCode::CorruptStream,
            205 => ErrorCode::NoFrames,
            301 => ErrorCode::InvalidArgument,
            302 => ErrorCode::Recycled,
            _ => ErrorCode::Unknown,
        }
    }

    pub fn is_error(self) -> bool {
        self != ErrorCode::None
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::None => "No error",
            ErrorCode::NotFound => "Source not found",
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::NotMarkable => "Stream does not support rewinding",
            ErrorCode::Io => "I/O failure",
            ErrorCode::InvalidHeader => "Not a GIF or invalid screen descriptor",
            ErrorCode::InvalidBlock => "Invalid or unexpected block",
            ErrorCode::TruncatedData => "Data ended before the trailer",
            ErrorCode::CorruptStream => "Image data is corrupt",
            ErrorCode::NoFrames => "No frames found",
            ErrorCode::InvalidArgument => "Invalid argument",
            ErrorCode::Recycled => "Engine has been recycled",
            ErrorCode::Unknown => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GIF error {}: {}", self.code(), self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_to_open_errors() {
        let e = OpenError::from_io(io::Error::from(io::ErrorKind::NotFound), "/x.gif");
        assert!(matches!(e, OpenError::NotFound(ref p) if p == "/x.gif"));
        let e = OpenError::from_io(io::Error::from(io::ErrorKind::PermissionDenied), "/x.gif");
        assert_eq!(e.code(), ErrorCode::PermissionDenied);
        let e = OpenError::from_io(io::Error::from(io::ErrorKind::UnexpectedEof), "/x.gif");
        assert_eq!(e.code(), ErrorCode::Io);
    }

    #[test]
    fn error_code_round_trips_known_values() {
        for code in [
            ErrorCode::None,
            ErrorCode::NotMarkable,
            ErrorCode::TruncatedData,
            ErrorCode::CorruptStream,
            ErrorCode::InvalidArgument,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), code);
        }
        assert_eq!(ErrorCode::from_code(4242), ErrorCode::Unknown);
    }

    #[test]
    fn gif_error_codes_follow_inner_kind() {
        let err: GifError = DecodeError::NoFrames.into();
        assert_eq!(err.code(), ErrorCode::NoFrames);
        let err = GifError::InvalidArgument("speed".into());
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.to_string().contains("speed"));
    }

    #[test]
    fn display_includes_code_and_text() {
        let s = ErrorCode::TruncatedData.to_string();
        assert!(s.contains("203"));
        assert!(!ErrorCode::None.is_error());
    }
}
