//! Session lifecycle
//!
//! A [`Session`] is one connection from open to close. The
//! [`SessionManager`] builds sessions (connect, enable audio, wait for the
//! handshake, join the channel) and publishes each one through the shared
//! [`SessionHandle`] only after it is fully `Alive`. Events of a session are
//! pumped by a task bound to that session, so a replaced session can never
//! act through its successor.

use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::client::{Channel, ClientEvent, EventReceiver, VoiceClient, VoiceConnection};
use crate::config::SessionConfig;
use crate::constants::MIN_READY_POLL_INTERVAL;
use crate::echo::EchoHandler;
use crate::error::{ConnectError, RelayError};

// =============================================================================
// Session
// =============================================================================

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    /// Transport opened, waiting for the login handshake
    Connecting = 0,
    /// Handshake done, joining the channel
    Ready = 1,
    /// Fully set up and echoing
    Alive = 2,
    /// Closed or lost; never becomes alive again
    Disconnected = 3,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Ready,
            2 => Self::Alive,
            _ => Self::Disconnected,
        }
    }
}

/// One connection to the server
pub struct Session {
    generation: u64,
    connection: Arc<dyn VoiceConnection>,
    channel: OnceLock<Channel>,
    status: AtomicU8,
}

impl Session {
    fn new(generation: u64, connection: Arc<dyn VoiceConnection>) -> Self {
        Self {
            generation,
            connection,
            channel: OnceLock::new(),
            status: AtomicU8::new(SessionStatus::Connecting as u8),
        }
    }

    /// Sequence number of this session, starting at 1 for the first connect
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current status
    ///
    /// An `Alive` session whose link has silently died reports `Disconnected`.
    pub fn status(&self) -> SessionStatus {
        let status = self.recorded_status();
        if status == SessionStatus::Alive && !self.connection.is_alive() {
            SessionStatus::Disconnected
        } else {
            status
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status() == SessionStatus::Alive
    }

    /// Channel joined during setup, if one was configured
    pub fn channel(&self) -> Option<&Channel> {
        self.channel.get()
    }

    /// Our own session ID on the server
    pub fn local_session(&self) -> Option<u32> {
        self.connection.local_session()
    }

    /// Submit an audio frame on this session's link
    pub fn send_audio(&self, samples: &[u8]) -> Result<(), RelayError> {
        if self.status() == SessionStatus::Disconnected {
            return Err(RelayError::LinkClosed);
        }
        self.connection.send_audio(samples)
    }

    /// Mark disconnected and close the link
    pub async fn close(&self) {
        self.mark_disconnected();
        self.connection.close().await;
    }

    fn recorded_status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    fn set_status(&self, status: SessionStatus) {
        // Disconnected is terminal
        let _ = self
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != SessionStatus::Disconnected as u8).then_some(status as u8)
            });
    }

    fn mark_disconnected(&self) {
        self.status
            .store(SessionStatus::Disconnected as u8, Ordering::Release);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("generation", &self.generation)
            .field("status", &self.status())
            .field("channel", &self.channel.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Session Handle
// =============================================================================

/// Shared slot holding the current session
///
/// Readers always see either nothing or a session that reached `Alive`.
#[derive(Debug, Clone, Default)]
pub struct SessionHandle {
    inner: Arc<RwLock<Option<Arc<Session>>>>,
}

impl SessionHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Arc<Session>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a current session exists and is alive
    pub fn is_alive(&self) -> bool {
        self.current().is_some_and(|session| session.is_alive())
    }

    fn replace(&self, session: Arc<Session>) -> Option<Arc<Session>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(session)
    }

    fn take(&self) -> Option<Arc<Session>> {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

// =============================================================================
// Session Manager
// =============================================================================

/// Handshake progress reported by the event pump
#[derive(Debug, Clone, PartialEq, Eq)]
enum Handshake {
    Pending,
    Ready,
    Rejected(String),
    Closed(Option<String>),
}

/// Builds, publishes and tears down sessions
pub struct SessionManager {
    client: Arc<dyn VoiceClient>,
    config: SessionConfig,
    echo: Arc<EchoHandler>,
    handle: SessionHandle,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(client: Arc<dyn VoiceClient>, config: SessionConfig, echo: Arc<EchoHandler>) -> Self {
        Self {
            client,
            config,
            echo,
            handle: SessionHandle::new(),
            generation: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared view of the current session
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Whether the current session is alive
    pub fn is_alive(&self) -> bool {
        self.handle.is_alive()
    }

    /// Build a new session and publish it
    ///
    /// On failure nothing is published and the half-built connection is
    /// closed. Any previously published session is left untouched; use
    /// [`reconnect`](Self::reconnect) to replace it.
    pub async fn connect(&self) -> Result<Arc<Session>, ConnectError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            server = %self.config.server_address,
            port = self.config.port,
            username = %self.config.username,
            generation,
            "Connecting"
        );

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let connection = self.client.connect(&self.config, event_tx).await?;
        let session = Arc::new(Session::new(generation, connection));
        let guard = SetupGuard(Some(session.clone()));

        // Audio handling is in place before the server can send any
        session.connection.set_receive_audio(true);
        let (handshake_tx, handshake_rx) = watch::channel(Handshake::Pending);
        tokio::spawn(pump_events(
            session.clone(),
            event_rx,
            self.echo.clone(),
            handshake_tx,
        ));

        if let Err(e) = self.finish_setup(&session, handshake_rx).await {
            warn!(generation, error = %e, "Session setup failed");
            session.close().await;
            guard.disarm();
            return Err(e);
        }

        session.set_status(SessionStatus::Alive);
        let previous = self.handle.replace(session.clone());
        guard.disarm();
        if let Some(previous) = previous {
            previous.close().await;
        }

        info!(
            server = %self.config.server_address,
            channel = session.channel().map_or("<none>", |c| c.name.as_str()),
            generation,
            "Connected"
        );
        Ok(session)
    }

    /// Tear down the current session and build a fresh one
    pub async fn reconnect(&self) -> Result<Arc<Session>, ConnectError> {
        if let Some(previous) = self.handle.take() {
            debug!(generation = previous.generation(), "Closing previous session");
            previous.close().await;
        }
        self.connect().await
    }

    /// Close and unpublish the current session
    pub async fn close(&self) {
        if let Some(session) = self.handle.take() {
            info!(generation = session.generation(), "Closing session");
            session.close().await;
        }
    }

    async fn finish_setup(
        &self,
        session: &Session,
        handshake: watch::Receiver<Handshake>,
    ) -> Result<(), ConnectError> {
        self.wait_until_ready(session, handshake).await?;
        session.set_status(SessionStatus::Ready);

        if self.config.channel.is_empty() {
            return Ok(());
        }

        let channel = session
            .connection
            .find_channel(&self.config.channel)
            .ok_or_else(|| ConnectError::ChannelNotFound(self.config.channel.clone()))?;
        session.connection.join_channel(&channel).await?;
        debug!(channel = %channel.name, id = channel.id, "Joined channel");
        let _ = session.channel.set(channel);
        Ok(())
    }

    /// Wait for the login handshake, a rejection, or the ready timeout
    async fn wait_until_ready(
        &self,
        session: &Session,
        mut handshake: watch::Receiver<Handshake>,
    ) -> Result<(), ConnectError> {
        let timeout = self.config.ready_timeout;
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        // interval() panics on zero
        let poll_every = self.config.ready_poll_interval.max(MIN_READY_POLL_INTERVAL);
        let mut poll = tokio::time::interval(poll_every);

        loop {
            let state = handshake.borrow_and_update().clone();
            match state {
                Handshake::Ready => return Ok(()),
                Handshake::Rejected(reason) => {
                    return Err(ConnectError::AuthenticationRejected(reason));
                }
                Handshake::Closed(reason) => {
                    return Err(ConnectError::Closed(
                        reason.unwrap_or_else(|| "link closed during login".to_string()),
                    ));
                }
                Handshake::Pending => {}
            }
            if session.connection.is_ready() {
                return Ok(());
            }

            tokio::select! {
                changed = handshake.changed() => {
                    if changed.is_err() {
                        return Err(ConnectError::Closed("event stream ended".to_string()));
                    }
                }
                _ = poll.tick() => {}
                _ = &mut deadline => return Err(ConnectError::NotReady(timeout)),
            }
        }
    }
}

/// Closes a session whose setup was abandoned before it got published
///
/// Covers the connecting future being dropped mid-setup, e.g. when the
/// supervisor is cancelled during a reconnect.
struct SetupGuard(Option<Arc<Session>>);

impl SetupGuard {
    fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        let Some(session) = self.0.take() else {
            return;
        };
        session.mark_disconnected();
        debug!(generation = session.generation(), "Closing abandoned session");
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move { session.close().await });
        }
    }
}

/// Dispatch one session's events until its link goes away
async fn pump_events(
    session: Arc<Session>,
    mut events: EventReceiver,
    echo: Arc<EchoHandler>,
    handshake: watch::Sender<Handshake>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Ready { session: id } => {
                debug!(generation = session.generation(), session_id = id, "Server ready");
                handshake.send_replace(Handshake::Ready);
            }
            ClientEvent::Rejected(reason) => {
                warn!(%reason, "Login rejected");
                handshake.send_replace(Handshake::Rejected(reason));
            }
            ClientEvent::ChannelAdded(channel) => {
                debug!(channel = %channel.name, id = channel.id, "Channel known");
            }
            ClientEvent::AudioReceived(frame) => {
                if let Err(e) = echo.on_audio_received(&session, &frame) {
                    warn!(user = %frame.source.name, error = %e, "Echo failed");
                }
            }
            ClientEvent::Disconnected(reason) => {
                if session.recorded_status() == SessionStatus::Alive {
                    warn!(
                        generation = session.generation(),
                        reason = reason.as_deref().unwrap_or("unknown"),
                        "Connection lost"
                    );
                }
                session.mark_disconnected();
                settle_handshake(&handshake, reason);
                return;
            }
        }
    }

    session.mark_disconnected();
    settle_handshake(&handshake, None);
}

/// Report a closed link unless the handshake already has an outcome
fn settle_handshake(handshake: &watch::Sender<Handshake>, reason: Option<String>) {
    handshake.send_if_modified(|state| {
        if *state == Handshake::Pending {
            *state = Handshake::Closed(reason);
            true
        } else {
            false
        }
    });
}
