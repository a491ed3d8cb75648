//! Writing frames onto a byte stream

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::error::FrameError;
use super::{Frame, FrameKind, MAX_FRAME_PAYLOAD};

/// Serializes frames onto an async writer
pub struct FrameWriter<W> {
    writer: W,
}

impl<W> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// The wrapped stream, for shutting it down
    pub fn get_mut(&mut self) -> &mut W {
        &mut self.writer
    }
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Write a frame to the stream and flush it
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<(), FrameError> {
        if frame.payload.len() > MAX_FRAME_PAYLOAD {
            return Err(FrameError::PayloadTooLarge {
                length: frame.payload.len(),
                max: MAX_FRAME_PAYLOAD,
            });
        }

        self.writer.write_all(&frame.to_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Build a frame from `kind` and `payload` and write it
    pub async fn write(&mut self, kind: FrameKind, payload: &[u8]) -> Result<(), FrameError> {
        let frame = Frame::new(kind, payload.to_vec());
        self.write_frame(&frame).await
    }
}
