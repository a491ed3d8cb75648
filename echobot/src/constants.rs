//! Constants for the echo bot

use std::time::Duration;

// =============================================================================
// Identity
// =============================================================================

/// Default private key file (relative to the working directory)
pub const DEFAULT_KEY_FILENAME: &str = "echo-bot_key.pem";

/// Default certificate file (relative to the working directory)
pub const DEFAULT_CERT_FILENAME: &str = "echo-bot_cert.pem";

/// Certificate subject: country
pub const CERT_COUNTRY: &str = "US";

/// Certificate subject: state or province
pub const CERT_STATE: &str = "California";

/// Certificate subject: locality
pub const CERT_LOCALITY: &str = "Los Angeles";

/// Certificate subject: organization
pub const CERT_ORGANIZATION: &str = "EchoBot";

/// Certificate subject: organizational unit
pub const CERT_ORGANIZATIONAL_UNIT: &str = "IT";

/// Certificate subject: common name
pub const CERT_COMMON_NAME: &str = "echo-bot";

/// Serial number of generated certificates
pub const CERT_SERIAL_NUMBER: u64 = 1001;

/// Validity of generated certificates (10 years of 365 days)
pub const CERT_VALIDITY_DAYS: i64 = 10 * 365;

// =============================================================================
// Session
// =============================================================================

/// Default login name
pub const DEFAULT_USERNAME: &str = "EchoBot";

/// Default server address
pub const DEFAULT_SERVER: &str = "localhost";

/// How long to wait for the server handshake to complete
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(30);

/// How often readiness is re-checked while waiting for the handshake
pub const DEFAULT_READY_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Floor for the ready poll interval
pub const MIN_READY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// TCP connect timeout
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Display name used for speakers the roster doesn't know yet
pub const UNKNOWN_SPEAKER: &str = "<unknown>";

/// Commands a connection may queue for its writer before audio is dropped
pub const OUTBOUND_QUEUE_CAPACITY: usize = 64;

// =============================================================================
// Reconnect Policy
// =============================================================================

/// Interval between liveness checks
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Delay after the first failed reconnect attempt
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound for the delay between reconnect attempts
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Growth factor of the backoff delay per failed attempt
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Exponent cap so the multiplication can't overflow before the max is applied
pub const MAX_BACKOFF_EXPONENT: u32 = 16;
