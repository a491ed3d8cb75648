//! Reading frames off a byte stream

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

use super::error::FrameError;
use super::{Frame, FrameKind, MAX_FRAME_PAYLOAD};

/// How long a frame may take to arrive once its first byte is in
pub const DEFAULT_FRAME_TIMEOUT: Duration = Duration::from_secs(30);

/// Pulls whole frames out of an async reader
pub struct FrameReader<R> {
    reader: R,
}

impl<R> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Read the next frame from the stream
    ///
    /// Returns `Ok(None)` if the connection is cleanly closed between frames.
    ///
    /// This is not cancel-safe: run it in a dedicated task rather than inside
    /// `tokio::select!`.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        let first_byte = match self.read_byte_allow_eof().await? {
            Some(b) => b,
            None => return Ok(None),
        };

        self.read_frame_after_first_byte(first_byte).await
    }

    /// Read the next frame, bounding the time between its first and last byte
    ///
    /// Waiting for the first byte is unbounded so idle links are allowed.
    pub async fn read_frame_with_timeout(
        &mut self,
        frame_timeout: Duration,
    ) -> Result<Option<Frame>, FrameError> {
        let first_byte = match self.read_byte_allow_eof().await? {
            Some(b) => b,
            None => return Ok(None),
        };

        match timeout(frame_timeout, self.read_frame_after_first_byte(first_byte)).await {
            Ok(result) => result,
            Err(_) => Err(FrameError::FrameTimeout),
        }
    }

    async fn read_frame_after_first_byte(
        &mut self,
        first_byte: u8,
    ) -> Result<Option<Frame>, FrameError> {
        let kind = FrameKind::from_byte(first_byte).ok_or(FrameError::UnknownKind(first_byte))?;

        let mut length_bytes = [0u8; 4];
        self.read_exact_or_closed(&mut length_bytes).await?;
        let length = u32::from_be_bytes(length_bytes) as usize;

        // Reject before allocating
        if length > MAX_FRAME_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                length,
                max: MAX_FRAME_PAYLOAD,
            });
        }

        let mut payload = vec![0u8; length];
        self.read_exact_or_closed(&mut payload).await?;

        Ok(Some(Frame::new(kind, payload)))
    }

    async fn read_byte_allow_eof(&mut self) -> Result<Option<u8>, FrameError> {
        let mut byte = [0u8; 1];
        match self.reader.read(&mut byte).await? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    async fn read_exact_or_closed(&mut self, buf: &mut [u8]) -> Result<(), FrameError> {
        match self.reader.read_exact(buf).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(FrameError::ConnectionClosed),
            Err(e) => Err(e.into()),
        }
    }
}
