//! Echo handler
//!
//! Every received audio frame is sent straight back into the channel it came
//! from, unchanged and without buffering.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::client::AudioFrame;
use crate::config::EchoConfig;
use crate::error::RelayError;
use crate::session::Session;

/// Relays received audio back out on the same session
#[derive(Debug, Default)]
pub struct EchoHandler {
    config: EchoConfig,
    echoed: AtomicU64,
}

impl EchoHandler {
    pub fn new(config: EchoConfig) -> Self {
        Self {
            config,
            echoed: AtomicU64::new(0),
        }
    }

    /// Echo one frame on `session`
    ///
    /// Returns `Ok(false)` when the frame is skipped because it's our own
    /// voice and self-echo is off.
    pub fn on_audio_received(
        &self,
        session: &Session,
        frame: &AudioFrame,
    ) -> Result<bool, RelayError> {
        if !self.config.echo_self && session.local_session() == Some(frame.source.session) {
            debug!(user = %frame.source.name, "Skipping own audio");
            return Ok(false);
        }

        info!(user = %frame.source.name, bytes = frame.samples.len(), "Voice received");
        session.send_audio(&frame.samples)?;
        self.echoed.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    /// Number of frames echoed so far
    pub fn echoed_frames(&self) -> u64 {
        self.echoed.load(Ordering::Relaxed)
    }
}
