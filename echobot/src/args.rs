//! Command-line argument parsing

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use echobot_common::DEFAULT_PORT;

use crate::config::{BotOptions, EchoConfig, IdentityPaths, ReconnectPolicy, SessionConfig};
use crate::constants::{DEFAULT_CERT_FILENAME, DEFAULT_KEY_FILENAME, DEFAULT_SERVER, DEFAULT_USERNAME};

/// Voice channel echo bot
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Server hostname or IP address
    #[arg(short, long, env = "ECHOBOT_SERVER", default_value = DEFAULT_SERVER)]
    pub server: String,

    /// Server port
    #[arg(short, long, env = "ECHOBOT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Login name
    #[arg(short, long, env = "ECHOBOT_USERNAME", default_value = DEFAULT_USERNAME)]
    pub username: String,

    /// Server password
    #[arg(long, env = "ECHOBOT_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Channel to join after login (empty stays in the default channel)
    #[arg(short, long, env = "ECHOBOT_CHANNEL", default_value = "")]
    pub channel: String,

    /// Certificate file (generated if missing)
    #[arg(long, env = "ECHOBOT_CERT", default_value = DEFAULT_CERT_FILENAME)]
    pub cert: PathBuf,

    /// Private key file (generated if missing)
    #[arg(long, env = "ECHOBOT_KEY", default_value = DEFAULT_KEY_FILENAME)]
    pub key: PathBuf,

    /// Connect without a client certificate
    #[arg(long, default_value = "false")]
    pub no_client_cert: bool,

    /// Echo audio that originated from the bot itself
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub echo_self: bool,

    /// Seconds between connection liveness checks
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub check_interval: u64,

    /// Seconds to wait for the server to finish the login handshake
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub ready_timeout: u64,

    /// Give up after this many consecutive failed reconnects (default: never)
    #[arg(long)]
    pub max_reconnect_attempts: Option<u32>,

    /// Upper bound in seconds for the delay between reconnect attempts
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
    pub max_backoff: u64,

    /// Use exact backoff delays instead of randomized ones
    #[arg(long, default_value = "false")]
    pub no_jitter: bool,

    /// Enable debug logging
    #[arg(long, default_value = "false")]
    pub debug: bool,
}

impl Args {
    /// Turn parsed arguments into bot options
    pub fn into_options(self) -> BotOptions {
        let session = SessionConfig::new(self.server, self.port, self.username)
            .with_password(self.password)
            .with_channel(self.channel)
            .with_ready_timeout(Duration::from_secs(self.ready_timeout));

        let defaults = ReconnectPolicy::default();
        let max_backoff = Duration::from_secs(self.max_backoff);
        let reconnect = ReconnectPolicy {
            check_interval: Duration::from_secs(self.check_interval),
            initial_backoff: defaults.initial_backoff.min(max_backoff),
            max_backoff,
            jitter: !self.no_jitter,
            max_attempts: self.max_reconnect_attempts,
            ..defaults
        };

        let identity = (!self.no_client_cert).then_some(IdentityPaths {
            key: self.key,
            cert: self.cert,
        });

        BotOptions {
            session,
            echo: EchoConfig {
                echo_self: self.echo_self,
            },
            reconnect,
            identity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let options = Args::try_parse_from(["echobot"]).unwrap().into_options();

        assert_eq!(options.session.server_address, "localhost");
        assert_eq!(options.session.port, 64738);
        assert_eq!(options.session.username, "EchoBot");
        assert!(options.session.channel.is_empty());
        assert!(options.echo.echo_self);
        assert_eq!(options.reconnect, ReconnectPolicy::default());
        assert_eq!(options.identity, Some(IdentityPaths::default()));
    }

    #[test]
    fn test_scenario_flags() {
        let options = Args::try_parse_from([
            "echobot",
            "--server",
            "voice.example.com",
            "-p",
            "6969",
            "--channel",
            "echotest",
            "--password",
            "hunter2",
            "--echo-self",
            "false",
            "--max-reconnect-attempts",
            "3",
            "--no-jitter",
        ])
        .unwrap()
        .into_options();

        assert_eq!(options.session.server_address, "voice.example.com");
        assert_eq!(options.session.port, 6969);
        assert_eq!(options.session.channel, "echotest");
        assert_eq!(options.session.password, "hunter2");
        assert!(!options.echo.echo_self);
        assert_eq!(options.reconnect.max_attempts, Some(3));
        assert!(!options.reconnect.jitter);
    }

    #[test]
    fn test_no_client_cert_skips_identity() {
        let options = Args::try_parse_from(["echobot", "--no-client-cert"])
            .unwrap()
            .into_options();
        assert!(options.identity.is_none());
    }

    #[test]
    fn test_custom_identity_paths() {
        let options = Args::try_parse_from(["echobot", "--cert", "/tmp/c.pem", "--key", "/tmp/k.pem"])
            .unwrap()
            .into_options();
        assert_eq!(
            options.identity,
            Some(IdentityPaths {
                key: PathBuf::from("/tmp/k.pem"),
                cert: PathBuf::from("/tmp/c.pem"),
            })
        );
    }

    #[test]
    fn test_zero_check_interval_rejected() {
        assert!(Args::try_parse_from(["echobot", "--check-interval", "0"]).is_err());
    }

    #[test]
    fn test_initial_backoff_never_exceeds_max() {
        let options = Args::try_parse_from(["echobot", "--max-backoff", "1"])
            .unwrap()
            .into_options();
        assert!(options.reconnect.initial_backoff <= options.reconnect.max_backoff);
    }
}
