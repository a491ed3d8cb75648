//! Framing errors

use std::io;

use thiserror::Error;

/// Errors produced while reading or writing frames
#[derive(Debug, Error)]
pub enum FrameError {
    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The first header byte is not a known frame kind
    #[error("unknown frame kind: 0x{0:02x}")]
    UnknownKind(u8),

    /// Declared payload length exceeds the protocol maximum
    #[error("payload too large: {length} bytes (max {max})")]
    PayloadTooLarge { length: usize, max: usize },

    /// The peer closed the stream in the middle of a frame
    #[error("connection closed mid-frame")]
    ConnectionClosed,

    /// The frame did not complete in time once it started arriving
    #[error("frame timed out")]
    FrameTimeout,
}
