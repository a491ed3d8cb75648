//! Control message definitions
//!
//! Control messages are JSON objects tagged by `type`, carried in
//! [`FrameKind::Control`](crate::framing::FrameKind) frames over TLS.
//!
//! A client session goes through:
//! 1. `Version` + `Authenticate` (client → server)
//! 2. `ChannelState` / `UserState` bursts describing the server (server → client)
//! 3. `ServerSync`, which marks the session as ready (server → client)
//!
//! The server answers a failed login with `Reject` and closes the link.

use serde::{Deserialize, Serialize};

/// Client request messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Protocol version announcement, sent first
    Version { version: String },
    /// Login request
    Authenticate { username: String, password: String },
    /// Keepalive
    Ping { timestamp: u64 },
    /// Move this session into a channel
    JoinChannel { channel_id: u32 },
}

/// Server messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Protocol version announcement
    Version { version: String },
    /// Login refused; the server closes the link afterwards
    Reject { reason: String },
    /// Initial state has been sent; `session` is the client's own session ID
    ServerSync {
        session: u32,
        #[serde(default)]
        welcome_text: String,
    },
    /// A channel exists (or changed)
    ChannelState {
        channel_id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent: Option<u32>,
        name: String,
    },
    /// A channel was removed
    ChannelRemove { channel_id: u32 },
    /// A user is connected (or moved)
    UserState {
        session: u32,
        name: String,
        channel_id: u32,
    },
    /// A user disconnected; if `session` is our own we were kicked
    UserRemove {
        session: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    /// Keepalive reply
    Ping { timestamp: u64 },
}
