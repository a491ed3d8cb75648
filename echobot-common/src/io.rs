//! I/O utilities for sending and receiving protocol messages
//!
//! This module is the bridge between the message types (`ClientMessage`,
//! `ServerMessage`, `AudioPacket`) and the wire format (framing).

use std::io;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::framing::{DEFAULT_FRAME_TIMEOUT, Frame, FrameError, FrameKind, FrameReader, FrameWriter};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::voice::AudioPacket;

// =============================================================================
// Error Conversion
// =============================================================================

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => e,
            FrameError::ConnectionClosed => {
                io::Error::new(io::ErrorKind::ConnectionReset, "connection closed")
            }
            FrameError::FrameTimeout => io::Error::new(io::ErrorKind::TimedOut, "frame timed out"),
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

// =============================================================================
// Decoded Frames
// =============================================================================

/// A frame received by a client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Control(ServerMessage),
    Audio(AudioPacket),
    /// A well-framed payload that didn't decode; the stream itself is intact
    Malformed(String),
}

/// A frame received by a server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Control(ClientMessage),
    Audio(AudioPacket),
}

// =============================================================================
// Sending
// =============================================================================

/// Send a `ClientMessage` to the server
pub async fn send_client_message<W>(
    writer: &mut FrameWriter<W>,
    message: &ClientMessage,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload =
        serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer
        .write_frame(&Frame::new(FrameKind::Control, payload))
        .await
        .map_err(Into::into)
}

/// Send a `ServerMessage` to a client
pub async fn send_server_message<W>(
    writer: &mut FrameWriter<W>,
    message: &ServerMessage,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload =
        serde_json::to_vec(message).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer
        .write_frame(&Frame::new(FrameKind::Control, payload))
        .await
        .map_err(Into::into)
}

/// Send an audio packet (either direction)
pub async fn send_audio_packet<W>(writer: &mut FrameWriter<W>, packet: &AudioPacket) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_frame(&Frame::new(FrameKind::Audio, packet.to_bytes()))
        .await
        .map_err(Into::into)
}

// =============================================================================
// Receiving
// =============================================================================

/// Read the next frame sent by the server
///
/// Returns `Ok(None)` if the connection was cleanly closed. A frame that
/// starts arriving must complete within [`DEFAULT_FRAME_TIMEOUT`].
///
/// Errors are reserved for a broken stream. A payload that fails to decode
/// comes back as [`ServerFrame::Malformed`] and the next read carries on
/// with the following frame.
pub async fn read_server_frame<R>(reader: &mut FrameReader<R>) -> io::Result<Option<ServerFrame>>
where
    R: AsyncRead + Unpin,
{
    let Some(frame) = reader.read_frame_with_timeout(DEFAULT_FRAME_TIMEOUT).await? else {
        return Ok(None);
    };

    let decoded = match frame.kind {
        FrameKind::Control => match serde_json::from_slice(&frame.payload) {
            Ok(message) => ServerFrame::Control(message),
            Err(e) => ServerFrame::Malformed(format!("control message: {e}")),
        },
        FrameKind::Audio => match parse_audio(&frame.payload) {
            Ok(packet) => ServerFrame::Audio(packet),
            Err(e) => ServerFrame::Malformed(format!("audio packet: {e}")),
        },
    };
    Ok(Some(decoded))
}

/// Read the next frame sent by a client
///
/// Returns `Ok(None)` if the connection was cleanly closed.
pub async fn read_client_frame<R>(reader: &mut FrameReader<R>) -> io::Result<Option<ClientFrame>>
where
    R: AsyncRead + Unpin,
{
    let Some(frame) = reader.read_frame_with_timeout(DEFAULT_FRAME_TIMEOUT).await? else {
        return Ok(None);
    };

    match frame.kind {
        FrameKind::Control => {
            let message = serde_json::from_slice(&frame.payload)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(ClientFrame::Control(message)))
        }
        FrameKind::Audio => {
            let packet = parse_audio(&frame.payload)?;
            Ok(Some(ClientFrame::Audio(packet)))
        }
    }
}

fn parse_audio(payload: &[u8]) -> io::Result<AudioPacket> {
    AudioPacket::from_bytes(payload)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "invalid audio packet"))
}
