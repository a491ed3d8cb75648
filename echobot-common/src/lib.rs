//! Echo Bot Common Library
//!
//! Wire framing, control messages and audio packets shared by the echo bot
//! and the servers it talks to.

pub mod framing;
pub mod io;
pub mod protocol;
pub mod voice;

/// Version string announced in the `Version` handshake message
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Default server port
pub const DEFAULT_PORT: u16 = 64738;

/// Interval between client keepalive pings (5 seconds)
pub const KEEPALIVE_INTERVAL_SECS: u64 = 5;

/// A link with no inbound traffic for this long is considered dead (30 seconds)
pub const LINK_TIMEOUT_SECS: u64 = 30;
