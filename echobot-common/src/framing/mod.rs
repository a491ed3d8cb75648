//! Binary framing for the relay protocol
//!
//! Every message on the wire is carried in a frame:
//!
//! ```text
//! +-----------+------------------------+----------------------+
//! |  Kind (1) |  Payload length (4 BE) |  Payload (variable)  |
//! +-----------+------------------------+----------------------+
//! ```
//!
//! Control frames carry a JSON-encoded protocol message, audio frames carry
//! a binary [`AudioPacket`](crate::voice::AudioPacket).

mod error;
mod reader;
mod writer;

pub use error::FrameError;
pub use reader::{DEFAULT_FRAME_TIMEOUT, FrameReader};
pub use writer::FrameWriter;

/// Size of the frame header (kind + payload length)
pub const FRAME_HEADER_SIZE: usize = 1 + 4;

/// Maximum payload length accepted in a single frame (1 MiB)
pub const MAX_FRAME_PAYLOAD: usize = 1024 * 1024;

/// Frame kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// JSON-encoded control message
    Control = 0x01,
    /// Binary audio packet
    Audio = 0x02,
}

impl FrameKind {
    /// Convert from byte value
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(FrameKind::Control),
            0x02 => Some(FrameKind::Audio),
            _ => None,
        }
    }

    /// Convert to byte value
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// A single frame as read from or written to the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// What the payload contains
    pub kind: FrameKind,
    /// Raw payload bytes
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }

    /// Serialize the frame (header + payload)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(FRAME_HEADER_SIZE + self.payload.len());
        bytes.push(self.kind.to_byte());
        bytes.extend_from_slice(&(self.payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}
