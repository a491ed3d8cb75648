//! Voice protocol client boundary
//!
//! The session layer only talks to the server through [`VoiceClient`] and
//! [`VoiceConnection`]. A connection reports what happens on the link as
//! [`ClientEvent`]s on the channel handed to [`VoiceClient::connect`]; the
//! session layer owns the receiving end.

mod relay;
mod tls;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::{ConnectError, RelayError};

pub use relay::RelayClient;

/// Sending half of a connection's event channel
pub type EventSender = mpsc::UnboundedSender<ClientEvent>;

/// Receiving half of a connection's event channel
pub type EventReceiver = mpsc::UnboundedReceiver<ClientEvent>;

/// A channel known to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub id: u32,
    pub name: String,
}

/// The user an audio frame came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speaker {
    pub session: u32,
    pub name: String,
}

/// One received audio frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    pub source: Speaker,
    pub samples: Vec<u8>,
}

/// Something that happened on a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The server finished the login handshake; `session` is our own session ID
    Ready { session: u32 },
    /// The server refused the login
    Rejected(String),
    /// A channel became known
    ChannelAdded(Channel),
    /// Audio arrived while receiving was enabled
    AudioReceived(AudioFrame),
    /// The link is gone; no further events follow
    Disconnected(Option<String>),
}

/// Opens connections to a voice server
#[async_trait]
pub trait VoiceClient: Send + Sync {
    /// Open a transport connection and start the login handshake
    ///
    /// Returns as soon as the login has been sent. Readiness is reported
    /// later through `events` and [`VoiceConnection::is_ready`].
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectError>;
}

/// A single open connection
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Login handshake completed
    fn is_ready(&self) -> bool;

    /// Transport is open and the server has been heard from recently
    fn is_alive(&self) -> bool;

    /// Our own session ID, once the server has assigned it
    fn local_session(&self) -> Option<u32>;

    /// Start or stop delivering [`ClientEvent::AudioReceived`]
    fn set_receive_audio(&self, enabled: bool);

    /// Look up a channel by exact name
    fn find_channel(&self, name: &str) -> Option<Channel>;

    /// Move our session into `channel`
    async fn join_channel(&self, channel: &Channel) -> Result<(), ConnectError>;

    /// Queue an audio frame for the channel we're in
    fn send_audio(&self, samples: &[u8]) -> Result<(), RelayError>;

    /// Close the link; idempotent
    async fn close(&self);
}
