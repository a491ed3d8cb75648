//! Audio packet format
//!
//! Audio travels inside [`FrameKind::Audio`](crate::framing::FrameKind) frames.
//! The payload is opaque to the protocol: whatever the sender encoded is what
//! the receivers get.

/// Audio packet header size (session + sequence)
pub const AUDIO_HEADER_SIZE: usize = 4 + 4;

/// Maximum audio payload per packet (8 KiB)
///
/// 20ms of 48kHz 16-bit stereo PCM is 3840 bytes, so this leaves room for
/// uncompressed frames as well as encoded ones.
pub const MAX_AUDIO_PAYLOAD: usize = 8 * 1024;

/// Audio packet
///
/// Wire format (binary, big-endian):
/// ```text
/// +----------------+----------------+----------------------+
/// |  Session (4)   |  Sequence (4)  |  Payload (variable)  |
/// +----------------+----------------+----------------------+
/// ```
///
/// `session` identifies the speaker on server → client packets and is
/// ignored by servers on client → server packets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPacket {
    /// Session ID of the speaker
    pub session: u32,
    /// Sequence number for ordering and loss detection
    pub sequence: u32,
    /// Audio payload
    pub payload: Vec<u8>,
}

impl AudioPacket {
    /// Create a new audio packet
    pub fn new(session: u32, sequence: u32, payload: Vec<u8>) -> Self {
        Self {
            session,
            sequence,
            payload,
        }
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(AUDIO_HEADER_SIZE + self.payload.len());
        bytes.extend_from_slice(&self.session.to_be_bytes());
        bytes.extend_from_slice(&self.sequence.to_be_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Parse a packet from bytes
    ///
    /// Returns `None` if the buffer is shorter than the header or the payload
    /// exceeds [`MAX_AUDIO_PAYLOAD`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < AUDIO_HEADER_SIZE {
            return None;
        }

        let payload = &bytes[AUDIO_HEADER_SIZE..];
        if payload.len() > MAX_AUDIO_PAYLOAD {
            return None;
        }

        let session = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let sequence = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);

        Some(Self {
            session,
            sequence,
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_packet_layout() {
        let packet = AudioPacket::new(7, 0x0102_0304, vec![0xDE, 0xAD]);
        assert_eq!(
            packet.to_bytes(),
            vec![0, 0, 0, 7, 0x01, 0x02, 0x03, 0x04, 0xDE, 0xAD]
        );
    }

    #[test]
    fn test_audio_packet_parse() {
        let bytes = vec![0, 0, 0, 42, 0, 0, 0, 1, 10, 20, 30];
        let packet = AudioPacket::from_bytes(&bytes).unwrap();
        assert_eq!(packet.session, 42);
        assert_eq!(packet.sequence, 1);
        assert_eq!(packet.payload, vec![10, 20, 30]);
    }

    #[test]
    fn test_audio_packet_header_only() {
        let packet = AudioPacket::from_bytes(&[0; AUDIO_HEADER_SIZE]).unwrap();
        assert!(packet.payload.is_empty());
    }

    #[test]
    fn test_audio_packet_too_short() {
        assert!(AudioPacket::from_bytes(&[]).is_none());
        assert!(AudioPacket::from_bytes(&[0; AUDIO_HEADER_SIZE - 1]).is_none());
    }

    #[test]
    fn test_audio_packet_payload_too_large() {
        let bytes = vec![0; AUDIO_HEADER_SIZE + MAX_AUDIO_PAYLOAD + 1];
        assert!(AudioPacket::from_bytes(&bytes).is_none());

        let bytes = vec![0; AUDIO_HEADER_SIZE + MAX_AUDIO_PAYLOAD];
        assert!(AudioPacket::from_bytes(&bytes).is_some());
    }
}
