//! Shared helpers for integration tests
//!
//! [`FakeVoiceClient`] stands in for a voice server: tests pick the channels
//! it knows, how logins go, and then inject audio or drop links on the
//! connections it handed out.

#![allow(dead_code)]

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use echobot::client::{
    AudioFrame, Channel, ClientEvent, EventSender, Speaker, VoiceClient, VoiceConnection,
};
use echobot::config::{EchoConfig, ReconnectPolicy, SessionConfig};
use echobot::echo::EchoHandler;
use echobot::error::{ConnectError, RelayError};
use echobot::session::SessionManager;

/// Session ID the fake server assigns to the bot
pub const BOT_SESSION: u32 = 1;

// ============================================================================
// Fake Client
// ============================================================================

/// How the fake server answers a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    /// Emit `Ready` right away
    Ready,
    /// Become ready without emitting an event; only polling notices
    ReadySilently,
    /// Never finish the handshake
    NeverReady,
    /// Refuse with the given reason, then drop the link
    Reject(String),
}

pub struct FakeVoiceClient {
    channels: Vec<Channel>,
    login: Mutex<Login>,
    connects: AtomicUsize,
    failures_remaining: AtomicUsize,
    fail_always: AtomicBool,
    connections: Mutex<Vec<Arc<FakeConnection>>>,
    identities: Mutex<Vec<Option<String>>>,
}

impl FakeVoiceClient {
    pub fn new(channels: &[(u32, &str)]) -> Arc<Self> {
        Arc::new(Self {
            channels: channels
                .iter()
                .map(|(id, name)| Channel {
                    id: *id,
                    name: name.to_string(),
                })
                .collect(),
            login: Mutex::new(Login::Ready),
            connects: AtomicUsize::new(0),
            failures_remaining: AtomicUsize::new(0),
            fail_always: AtomicBool::new(false),
            connections: Mutex::new(Vec::new()),
            identities: Mutex::new(Vec::new()),
        })
    }

    pub fn set_login(&self, login: Login) {
        *self.login.lock().unwrap() = login;
    }

    /// Refuse the next `count` transport connects
    pub fn fail_next(&self, count: usize) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    /// Refuse every transport connect until turned off
    pub fn fail_always(&self, enabled: bool) {
        self.fail_always.store(enabled, Ordering::SeqCst);
    }

    /// Number of `connect` calls so far, successful or not
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Most recent connection handed out
    pub fn latest(&self) -> Arc<FakeConnection> {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection has been opened")
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Certificate fingerprint presented on each connect (`None` without one)
    pub fn identities(&self) -> Vec<Option<String>> {
        self.identities.lock().unwrap().clone()
    }
}

#[async_trait]
impl VoiceClient for FakeVoiceClient {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.identities.lock().unwrap().push(
            config
                .identity
                .as_ref()
                .map(|identity| identity.fingerprint().to_string()),
        );

        let refuse = self.fail_always.load(Ordering::SeqCst)
            || self
                .failures_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
        if refuse {
            return Err(ConnectError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }

        let connection = Arc::new(FakeConnection::new(self.channels.clone(), events));
        for channel in &self.channels {
            let _ = connection
                .events
                .send(ClientEvent::ChannelAdded(channel.clone()));
        }

        match self.login.lock().unwrap().clone() {
            Login::Ready => {
                connection.ready.store(true, Ordering::SeqCst);
                let _ = connection.events.send(ClientEvent::Ready {
                    session: BOT_SESSION,
                });
            }
            Login::ReadySilently => connection.ready.store(true, Ordering::SeqCst),
            Login::NeverReady => {}
            Login::Reject(reason) => {
                let _ = connection.events.send(ClientEvent::Rejected(reason));
                connection.alive.store(false, Ordering::SeqCst);
                let _ = connection
                    .events
                    .send(ClientEvent::Disconnected(Some("rejected".to_string())));
            }
        }

        self.connections.lock().unwrap().push(connection.clone());
        Ok(connection)
    }
}

// ============================================================================
// Fake Connection
// ============================================================================

pub struct FakeConnection {
    channels: Vec<Channel>,
    events: EventSender,
    ready: AtomicBool,
    alive: AtomicBool,
    closed: AtomicBool,
    receive_audio: AtomicBool,
    fail_sends: AtomicBool,
    joined: Mutex<Vec<Channel>>,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl FakeConnection {
    fn new(channels: Vec<Channel>, events: EventSender) -> Self {
        Self {
            channels,
            events,
            ready: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
            receive_audio: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
            joined: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Deliver a frame as if `name` had spoken
    pub fn deliver_audio(&self, session: u32, name: &str, samples: &[u8]) {
        if !self.receive_audio.load(Ordering::SeqCst) {
            return;
        }
        let _ = self.events.send(ClientEvent::AudioReceived(AudioFrame {
            source: Speaker {
                session,
                name: name.to_string(),
            },
            samples: samples.to_vec(),
        }));
    }

    /// Lose the link and report it
    pub fn drop_link(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let _ = self
            .events
            .send(ClientEvent::Disconnected(Some("link dropped".to_string())));
    }

    /// Lose the link without any event
    pub fn die_silently(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, enabled: bool) {
        self.fail_sends.store(enabled, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn joined(&self) -> Vec<Channel> {
        self.joined.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn receives_audio(&self) -> bool {
        self.receive_audio.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnection for FakeConnection {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst)
    }

    fn local_session(&self) -> Option<u32> {
        self.is_ready().then_some(BOT_SESSION)
    }

    fn set_receive_audio(&self, enabled: bool) {
        self.receive_audio.store(enabled, Ordering::SeqCst);
    }

    fn find_channel(&self, name: &str) -> Option<Channel> {
        self.channels.iter().find(|c| c.name == name).cloned()
    }

    async fn join_channel(&self, channel: &Channel) -> Result<(), ConnectError> {
        self.joined.lock().unwrap().push(channel.clone());
        Ok(())
    }

    fn send_audio(&self, samples: &[u8]) -> Result<(), RelayError> {
        if !self.is_alive() || self.fail_sends.load(Ordering::SeqCst) {
            return Err(RelayError::LinkClosed);
        }
        self.sent.lock().unwrap().push(samples.to_vec());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Session config pointing at the fake server with short timeouts
pub fn test_config(channel: &str) -> SessionConfig {
    SessionConfig::new("localhost", 6969, "EchoBot")
        .with_channel(channel)
        .with_ready_timeout(Duration::from_millis(300))
        .with_ready_poll_interval(Duration::from_millis(20))
}

/// Reconnect policy with millisecond timings and no jitter
pub fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        check_interval: Duration::from_millis(50),
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        multiplier: 2,
        jitter: false,
        max_attempts: None,
    }
}

/// Session manager plus the echo handler it feeds
pub fn manager(
    client: Arc<FakeVoiceClient>,
    config: SessionConfig,
    echo_self: bool,
) -> (Arc<SessionManager>, Arc<EchoHandler>) {
    let echo = Arc::new(EchoHandler::new(EchoConfig { echo_self }));
    let manager = Arc::new(SessionManager::new(client, config, echo.clone()));
    (manager, echo)
}

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
