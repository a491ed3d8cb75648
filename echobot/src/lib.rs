//! Echo Bot Library
//!
//! A voice bot that joins a channel and plays every received audio frame
//! straight back. The library is split so the pieces can be driven with a
//! fake [`client::VoiceClient`] in tests:
//!
//! - [`identity`]: persistent self-signed client certificate
//! - [`session`]: connect, wait for the handshake, join, publish
//! - [`echo`]: per-frame relay
//! - [`supervisor`]: liveness polling and reconnect with backoff
//! - [`bot`]: startup and shutdown orchestration

pub mod args;
pub mod bot;
pub mod client;
pub mod config;
pub mod constants;
pub mod echo;
pub mod error;
pub mod identity;
pub mod session;
pub mod supervisor;
