//! Reconnect supervisor
//!
//! Polls the current session every `check_interval`. When it's gone or no
//! longer alive, the session is torn down and rebuilt from scratch. Failed
//! attempts are retried with exponential backoff until one succeeds, the
//! attempt limit is reached, or shutdown is requested.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ReconnectPolicy;
use crate::constants::MAX_BACKOFF_EXPONENT;
use crate::error::BotError;
use crate::session::SessionManager;

pub struct ReconnectSupervisor {
    manager: Arc<SessionManager>,
    policy: ReconnectPolicy,
}

impl ReconnectSupervisor {
    pub fn new(manager: Arc<SessionManager>, policy: ReconnectPolicy) -> Self {
        Self { manager, policy }
    }

    /// Run on a background task
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<Result<(), BotError>> {
        tokio::spawn(self.run(cancel))
    }

    /// Watch the session until `cancel` fires
    ///
    /// Only returns an error when `max_attempts` consecutive reconnects fail.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), BotError> {
        let handle = self.manager.handle();
        let mut failures: u32 = 0;

        loop {
            let wait = if failures == 0 {
                self.policy.check_interval
            } else {
                let delay = backoff_delay(&self.policy, failures);
                if self.policy.jitter {
                    with_jitter(delay)
                } else {
                    delay
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Supervisor stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if failures == 0 {
                if handle.is_alive() {
                    continue;
                }
                warn!("Connection lost, reconnecting");
            }

            let attempt = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Supervisor stopping during reconnect");
                    return Ok(());
                }
                result = self.manager.reconnect() => result,
            };

            match attempt {
                Ok(session) => {
                    info!(
                        generation = session.generation(),
                        after_failures = failures,
                        "Reconnected"
                    );
                    failures = 0;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    warn!(attempt = failures, error = %e, "Reconnect failed");

                    if let Some(max) = self.policy.max_attempts
                        && failures >= max
                    {
                        error!(attempts = failures, "Giving up on reconnecting");
                        return Err(BotError::ReconnectExhausted(failures));
                    }
                }
            }
        }
    }
}

/// Nominal delay before the next attempt after `failures` consecutive failures
///
/// `initial_backoff * multiplier^(failures - 1)`, capped at `max_backoff`.
pub fn backoff_delay(policy: &ReconnectPolicy, failures: u32) -> Duration {
    let exponent = failures.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
    policy
        .initial_backoff
        .saturating_mul(policy.multiplier.saturating_pow(exponent))
        .min(policy.max_backoff)
}

/// Pick a delay uniformly between half and all of `delay`
fn with_jitter(delay: Duration) -> Duration {
    use rand::RngExt;
    let fraction: f64 = rand::rng().random();
    let half = delay / 2;
    half + half.mul_f64(fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy {
            check_interval: Duration::from_secs(5),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            multiplier: 2,
            jitter: false,
            max_attempts: None,
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = policy();
        assert_eq!(backoff_delay(&policy, 1), Duration::from_secs(1));
        assert_eq!(backoff_delay(&policy, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(&policy, 3), Duration::from_secs(4));
        assert_eq!(backoff_delay(&policy, 6), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = policy();
        assert_eq!(backoff_delay(&policy, 7), Duration::from_secs(60));
        assert_eq!(backoff_delay(&policy, 1000), Duration::from_secs(60));
        assert_eq!(backoff_delay(&policy, u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_backoff_with_multiplier_one_is_constant() {
        let policy = ReconnectPolicy {
            multiplier: 1,
            ..policy()
        };
        for failures in 1..10 {
            assert_eq!(backoff_delay(&policy, failures), Duration::from_secs(1));
        }
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let delay = Duration::from_secs(8);
        for _ in 0..100 {
            let jittered = with_jitter(delay);
            assert!(jittered >= Duration::from_secs(4));
            assert!(jittered <= delay);
        }
    }
}
