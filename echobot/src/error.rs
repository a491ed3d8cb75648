//! Error types
//!
//! Provisioning and initial-connect errors are fatal and bubble up to `main`.
//! Everything that happens after the first successful connect is contained
//! by the supervisor or the echo handler and only logged.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Identity provisioning failures
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to generate key pair: {0}")]
    KeyGeneration(#[source] rcgen::Error),

    #[error("failed to build certificate: {0}")]
    Certificate(#[source] rcgen::Error),

    #[error("invalid PEM data in {}: {reason}", .path.display())]
    InvalidPem { path: PathBuf, reason: String },
}

/// Failures while establishing a session
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("connection timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Io(#[from] io::Error),

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("client identity unusable: {0}")]
    Identity(#[from] IdentityError),

    #[error("server rejected login: {0}")]
    AuthenticationRejected(String),

    #[error("server did not finish the handshake within {} seconds", .0.as_secs_f32())]
    NotReady(Duration),

    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("connection closed: {0}")]
    Closed(String),
}

/// Per-frame audio relay failures
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("link is closed")]
    LinkClosed,

    #[error("audio payload too large: {length} bytes (max {max})")]
    PayloadTooLarge { length: usize, max: usize },

    #[error("outbound queue is full")]
    QueueFull,
}

/// Fatal bot errors
#[derive(Debug, Error)]
pub enum BotError {
    #[error("identity provisioning failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("connection failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("gave up after {0} consecutive reconnect attempts")]
    ReconnectExhausted(u32),

    #[error("supervisor task ended unexpectedly: {0}")]
    Supervisor(String),
}
