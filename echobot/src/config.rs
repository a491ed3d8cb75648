//! Runtime configuration
//!
//! Plain values assembled by [`Args`](crate::args::Args) in the binary and
//! directly by tests.

use std::path::PathBuf;
use std::time::Duration;

use echobot_common::DEFAULT_PORT;

use crate::constants::{
    DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_CERT_FILENAME, DEFAULT_CHECK_INTERVAL,
    DEFAULT_INITIAL_BACKOFF, DEFAULT_KEY_FILENAME, DEFAULT_MAX_BACKOFF,
    DEFAULT_READY_POLL_INTERVAL, DEFAULT_READY_TIMEOUT, DEFAULT_SERVER, DEFAULT_USERNAME,
    MIN_READY_POLL_INTERVAL,
};
use crate::identity::Identity;

/// Where and how to connect
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub server_address: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Channel to join after login; empty means stay where the server puts us
    pub channel: String,
    /// Client certificate; `None` connects without one
    pub identity: Option<Identity>,
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
}

impl SessionConfig {
    pub fn new(server_address: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            port,
            username: username.into(),
            password: String::new(),
            channel: String::new(),
            identity: None,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            ready_poll_interval: DEFAULT_READY_POLL_INTERVAL,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn with_identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Clamped to [`MIN_READY_POLL_INTERVAL`]
    pub fn with_ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval.max(MIN_READY_POLL_INTERVAL);
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SERVER, DEFAULT_PORT, DEFAULT_USERNAME)
    }
}

/// Echo behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoConfig {
    /// Echo frames whose speaker is the bot's own session
    pub echo_self: bool,
}

impl Default for EchoConfig {
    fn default() -> Self {
        Self { echo_self: true }
    }
}

/// Liveness checks and reconnect backoff
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub check_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: u32,
    /// Randomize each delay between half and all of its nominal value
    pub jitter: bool,
    /// Consecutive failed attempts before giving up; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            jitter: true,
            max_attempts: None,
        }
    }
}

/// Key and certificate locations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityPaths {
    pub key: PathBuf,
    pub cert: PathBuf,
}

impl Default for IdentityPaths {
    fn default() -> Self {
        Self {
            key: PathBuf::from(DEFAULT_KEY_FILENAME),
            cert: PathBuf::from(DEFAULT_CERT_FILENAME),
        }
    }
}

/// Everything the bot needs to start
#[derive(Debug, Clone, Default)]
pub struct BotOptions {
    pub session: SessionConfig,
    pub echo: EchoConfig,
    pub reconnect: ReconnectPolicy,
    /// `None` skips provisioning and connects without a client certificate
    pub identity: Option<IdentityPaths>,
}
