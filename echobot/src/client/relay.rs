//! Relay protocol client
//!
//! Speaks the framed control/audio protocol from `echobot-common` over TLS.
//! Each connection runs a reader task and a writer task:
//! - The reader never sits inside `select!`, so frames are never cut in half
//! - The writer multiplexes outbound commands with the keepalive timer
//! - Both share a `closed` flag to tell each other to stop

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use echobot_common::framing::{FrameReader, FrameWriter};
use echobot_common::io::{
    ServerFrame, read_server_frame, send_audio_packet, send_client_message,
};
use echobot_common::protocol::{ClientMessage, ServerMessage};
use echobot_common::voice::{AudioPacket, MAX_AUDIO_PAYLOAD};
use echobot_common::{KEEPALIVE_INTERVAL_SECS, LINK_TIMEOUT_SECS, PROTOCOL_VERSION};
use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::tls::{TlsStream, establish_connection};
use super::{
    AudioFrame, Channel, ClientEvent, EventSender, Speaker, VoiceClient, VoiceConnection,
};
use crate::config::SessionConfig;
use crate::constants::{OUTBOUND_QUEUE_CAPACITY, UNKNOWN_SPEAKER};
use crate::error::{ConnectError, RelayError};

type Reader = FrameReader<BufReader<ReadHalf<TlsStream>>>;
type Writer = FrameWriter<WriteHalf<TlsStream>>;

// =============================================================================
// Client
// =============================================================================

/// [`VoiceClient`] for relay servers
#[derive(Debug, Clone)]
pub struct RelayClient {
    keepalive_interval: Duration,
    link_timeout: Duration,
}

impl RelayClient {
    pub fn new() -> Self {
        Self {
            keepalive_interval: Duration::from_secs(KEEPALIVE_INTERVAL_SECS),
            link_timeout: Duration::from_secs(LINK_TIMEOUT_SECS),
        }
    }

    /// Override keepalive timing
    ///
    /// A link counts as dead once nothing has been received for `link_timeout`.
    pub fn with_timings(keepalive_interval: Duration, link_timeout: Duration) -> Self {
        Self {
            keepalive_interval,
            link_timeout,
        }
    }
}

impl Default for RelayClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VoiceClient for RelayClient {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSender,
    ) -> Result<Arc<dyn VoiceConnection>, ConnectError> {
        let (tls_stream, fingerprint) = establish_connection(
            &config.server_address,
            config.port,
            config.identity.as_ref(),
        )
        .await?;
        info!(
            server = %config.server_address,
            port = config.port,
            %fingerprint,
            "TLS link established"
        );

        let (read_half, write_half) = tokio::io::split(tls_stream);
        let reader = FrameReader::new(BufReader::new(read_half));
        let mut writer = FrameWriter::new(write_half);

        send_client_message(
            &mut writer,
            &ClientMessage::Version {
                version: PROTOCOL_VERSION.to_string(),
            },
        )
        .await?;
        send_client_message(
            &mut writer,
            &ClientMessage::Authenticate {
                username: config.username.clone(),
                password: config.password.clone(),
            },
        )
        .await?;

        let link = Arc::new(LinkState::new());
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

        let reader_task = tokio::spawn(run_reader(reader, link.clone(), events));
        tokio::spawn(run_writer(
            writer,
            outbound_rx,
            link.clone(),
            self.keepalive_interval,
        ));

        Ok(Arc::new(RelayConnection {
            link,
            outbound: outbound_tx,
            reader_task: reader_task.abort_handle(),
            link_timeout: self.link_timeout,
        }))
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Commands for the writer task
enum Outbound {
    Control(ClientMessage),
    Audio(Vec<u8>),
    Close,
}

/// What the server has told us so far
#[derive(Debug, Default)]
struct Roster {
    session: Option<u32>,
    channels: HashMap<u32, String>,
    users: HashMap<u32, String>,
}

/// State shared by the connection handle and its tasks
struct LinkState {
    closed: AtomicBool,
    ready: AtomicBool,
    receive_audio: AtomicBool,
    last_seen: Mutex<Instant>,
    roster: Mutex<Roster>,
}

/// Result of applying one server frame to the link state
enum Applied {
    Event(ClientEvent),
    Kicked(Option<String>),
    Nothing,
}

impl LinkState {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            receive_audio: AtomicBool::new(false),
            last_seen: Mutex::new(Instant::now()),
            roster: Mutex::new(Roster::default()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn silence(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    fn roster(&self) -> std::sync::MutexGuard<'_, Roster> {
        self.roster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn apply(&self, frame: ServerFrame) -> Applied {
        match frame {
            ServerFrame::Audio(packet) => {
                if !self.receive_audio.load(Ordering::Relaxed) {
                    return Applied::Nothing;
                }
                let name = self
                    .roster()
                    .users
                    .get(&packet.session)
                    .cloned()
                    .unwrap_or_else(|| UNKNOWN_SPEAKER.to_string());
                Applied::Event(ClientEvent::AudioReceived(AudioFrame {
                    source: Speaker {
                        session: packet.session,
                        name,
                    },
                    samples: packet.payload,
                }))
            }
            ServerFrame::Control(message) => self.apply_control(message),
            ServerFrame::Malformed(reason) => {
                warn!(%reason, "Skipping malformed frame from server");
                Applied::Nothing
            }
        }
    }

    fn apply_control(&self, message: ServerMessage) -> Applied {
        match message {
            ServerMessage::Version { version } => {
                debug!(%version, "Server protocol version");
                Applied::Nothing
            }
            ServerMessage::Reject { reason } => Applied::Event(ClientEvent::Rejected(reason)),
            ServerMessage::ServerSync {
                session,
                welcome_text,
            } => {
                self.roster().session = Some(session);
                self.ready.store(true, Ordering::Release);
                if !welcome_text.is_empty() {
                    info!(welcome = %welcome_text, "Server welcome");
                }
                Applied::Event(ClientEvent::Ready { session })
            }
            ServerMessage::ChannelState {
                channel_id, name, ..
            } => {
                self.roster().channels.insert(channel_id, name.clone());
                Applied::Event(ClientEvent::ChannelAdded(Channel {
                    id: channel_id,
                    name,
                }))
            }
            ServerMessage::ChannelRemove { channel_id } => {
                self.roster().channels.remove(&channel_id);
                Applied::Nothing
            }
            ServerMessage::UserState { session, name, .. } => {
                self.roster().users.insert(session, name);
                Applied::Nothing
            }
            ServerMessage::UserRemove { session, reason } => {
                let mut roster = self.roster();
                roster.users.remove(&session);
                if roster.session == Some(session) {
                    Applied::Kicked(reason)
                } else {
                    Applied::Nothing
                }
            }
            ServerMessage::Ping { .. } => Applied::Nothing,
        }
    }
}

/// Open relay connection
pub struct RelayConnection {
    link: Arc<LinkState>,
    outbound: mpsc::Sender<Outbound>,
    reader_task: AbortHandle,
    link_timeout: Duration,
}

#[async_trait]
impl VoiceConnection for RelayConnection {
    fn is_ready(&self) -> bool {
        self.link.ready.load(Ordering::Acquire)
    }

    fn is_alive(&self) -> bool {
        !self.link.is_closed() && self.link.silence() < self.link_timeout
    }

    fn local_session(&self) -> Option<u32> {
        self.link.roster().session
    }

    fn set_receive_audio(&self, enabled: bool) {
        self.link.receive_audio.store(enabled, Ordering::Relaxed);
    }

    fn find_channel(&self, name: &str) -> Option<Channel> {
        self.link
            .roster()
            .channels
            .iter()
            .filter(|(_, channel_name)| channel_name.as_str() == name)
            .min_by_key(|(id, _)| **id)
            .map(|(id, channel_name)| Channel {
                id: *id,
                name: channel_name.clone(),
            })
    }

    async fn join_channel(&self, channel: &Channel) -> Result<(), ConnectError> {
        if self.link.is_closed() {
            return Err(ConnectError::Closed("link closed before join".to_string()));
        }
        self.outbound
            .send(Outbound::Control(ClientMessage::JoinChannel {
                channel_id: channel.id,
            }))
            .await
            .map_err(|_| ConnectError::Closed("writer stopped".to_string()))
    }

    fn send_audio(&self, samples: &[u8]) -> Result<(), RelayError> {
        if samples.len() > MAX_AUDIO_PAYLOAD {
            return Err(RelayError::PayloadTooLarge {
                length: samples.len(),
                max: MAX_AUDIO_PAYLOAD,
            });
        }
        if self.link.is_closed() {
            return Err(RelayError::LinkClosed);
        }
        match self.outbound.try_send(Outbound::Audio(samples.to_vec())) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(RelayError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(RelayError::LinkClosed),
        }
    }

    async fn close(&self) {
        self.link.mark_closed();
        // A full queue still stops the writer: it checks the flag after every command
        let _ = self.outbound.try_send(Outbound::Close);
        self.reader_task.abort();
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Read frames until the link goes away, then report why
async fn run_reader(mut reader: Reader, link: Arc<LinkState>, events: EventSender) {
    let reason = loop {
        if link.is_closed() {
            break None;
        }

        match read_server_frame(&mut reader).await {
            Ok(Some(frame)) => {
                link.touch();
                match link.apply(frame) {
                    Applied::Event(event) => {
                        if events.send(event).is_err() {
                            break None;
                        }
                    }
                    Applied::Kicked(reason) => {
                        break Some(reason.unwrap_or_else(|| "removed by server".to_string()));
                    }
                    Applied::Nothing => {}
                }
            }
            Ok(None) => break Some("server closed the connection".to_string()),
            Err(e) => break Some(e.to_string()),
        }
    };

    link.mark_closed();
    debug!(reason = reason.as_deref().unwrap_or("closed locally"), "Reader stopped");
    let _ = events.send(ClientEvent::Disconnected(reason));
}

/// Send queued commands and keepalives until told to stop
async fn run_writer(
    mut writer: Writer,
    mut outbound: mpsc::Receiver<Outbound>,
    link: Arc<LinkState>,
    keepalive_interval: Duration,
) {
    let mut keepalive = tokio::time::interval(keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: u32 = 0;

    loop {
        if link.is_closed() {
            break;
        }

        let result = tokio::select! {
            command = outbound.recv() => match command {
                Some(Outbound::Control(message)) => send_client_message(&mut writer, &message).await,
                Some(Outbound::Audio(payload)) => {
                    let packet = AudioPacket::new(0, sequence, payload);
                    sequence = sequence.wrapping_add(1);
                    send_audio_packet(&mut writer, &packet).await
                }
                Some(Outbound::Close) | None => break,
            },
            _ = keepalive.tick() => {
                send_client_message(&mut writer, &ClientMessage::Ping { timestamp: unix_millis() }).await
            }
        };

        if let Err(e) = result {
            warn!(error = %e, "Write to server failed");
            break;
        }
    }

    link.mark_closed();
    // Gracefully close the TLS connection
    let _ = writer.get_mut().shutdown().await;
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
