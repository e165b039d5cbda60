//! Error types for the channel and station.
//!
//! Protocol and transport failures on a single connection are reported as
//! values and handled where they occur; only startup failures are expected
//! to reach `main`.

use std::collections::TryReserveError;
use std::io;

use thiserror::Error;

/// Frame codec errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a header were present
    #[error("truncated frame: need at least {required} bytes, got {actual}")]
    Truncated { required: usize, actual: usize },

    /// Header plus payload exceeds the maximum frame size
    #[error("frame size {size} exceeds maximum {max}")]
    TooLarge { size: usize, max: usize },

    /// A frame size that leaves no room for payload after the header
    #[error("frame size {size} is below the minimum of {min} bytes")]
    FrameSizeTooSmall { size: usize, min: usize },

    /// Header length field disagrees with the payload handed to the encoder
    #[error("payload length mismatch: header says {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Receive buffer errors.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The allocator refused to grow the buffer
    #[error("cannot grow receive buffer to {requested} bytes")]
    Grow {
        requested: usize,
        #[source]
        source: TryReserveError,
    },

    /// Growing would exceed the buffer's configured limit
    #[error("receive buffer limit of {limit} bytes reached, {requested} requested")]
    Limit { requested: usize, limit: usize },
}

/// Errors on a single framed link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// Transport I/O error other than "would block"
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer closed the connection
    #[error("connection closed by peer")]
    Closed,

    /// The link was already released
    #[error("link is disconnected")]
    Disconnected,

    /// Malformed frame on the wire
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// Receive buffer could not grow
    #[error("buffer error: {0}")]
    Buffer(#[from] BufferError),
}

impl LinkError {
    /// Whether the connection must be dropped after this error.
    ///
    /// Frame and buffer errors only cost the offending frame.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LinkError::Io(_) | LinkError::Closed | LinkError::Disconnected
        )
    }
}

/// Reasons a file transfer stops before the last frame.
#[derive(Debug, Error)]
pub enum TransferError {
    /// A frame used up its retry budget
    #[error("frame {sequence} failed after {attempts} attempts")]
    Exhausted { sequence: u32, attempts: u32 },

    /// The link to the channel broke
    #[error("link to channel failed: {0}")]
    Link(#[from] LinkError),

    /// The data could not be cut into frames
    #[error("cannot frame data: {0}")]
    Frame(#[from] FrameError),
}

/// Command line configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Wrong number of arguments
    #[error("usage: {0}")]
    Usage(String),

    /// An argument could not be parsed or is out of range
    #[error("invalid {name} '{value}': {reason}")]
    InvalidArgument {
        name: &'static str,
        value: String,
        reason: String,
    },
}
