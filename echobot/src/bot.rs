//! Bot orchestration
//!
//! Wires the pieces together: provision the identity, connect once (fatal
//! on failure), then keep the session alive until shutdown is requested.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::VoiceClient;
use crate::config::{BotOptions, ReconnectPolicy};
use crate::echo::EchoHandler;
use crate::error::BotError;
use crate::identity::{Identity, ensure_identity};
use crate::session::{Session, SessionHandle, SessionManager};
use crate::supervisor::ReconnectSupervisor;

pub struct EchoBot {
    manager: Arc<SessionManager>,
    echo: Arc<EchoHandler>,
    policy: ReconnectPolicy,
    identity: Option<Identity>,
}

impl EchoBot {
    /// Provision the identity (if configured) and prepare the session manager
    pub fn new(client: Arc<dyn VoiceClient>, options: BotOptions) -> Result<Self, BotError> {
        let BotOptions {
            mut session,
            echo,
            reconnect,
            identity,
        } = options;

        let identity = match identity {
            Some(paths) => {
                let identity = ensure_identity(&paths.key, &paths.cert)?;
                session.identity = Some(identity.clone());
                Some(identity)
            }
            None => {
                info!("Connecting without a client certificate");
                None
            }
        };

        let echo = Arc::new(EchoHandler::new(echo));
        let manager = Arc::new(SessionManager::new(client, session, echo.clone()));

        Ok(Self {
            manager,
            echo,
            policy: reconnect,
            identity,
        })
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn handle(&self) -> SessionHandle {
        self.manager.handle()
    }

    pub fn echo(&self) -> &EchoHandler {
        &self.echo
    }

    /// Establish the first session
    pub async fn start(&self) -> Result<Arc<Session>, BotError> {
        Ok(self.manager.connect().await?)
    }

    /// Connect, then supervise until `shutdown` completes
    ///
    /// Returns an error if the first connect fails or the supervisor gives
    /// up. The session is closed before returning either way.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), BotError>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;

        let cancel = CancellationToken::new();
        let mut supervisor =
            ReconnectSupervisor::new(self.manager.clone(), self.policy.clone()).spawn(cancel.clone());

        let finished = tokio::select! {
            _ = shutdown => {
                info!("Shutdown requested");
                None
            }
            outcome = &mut supervisor => Some(outcome),
        };

        let outcome = match finished {
            Some(outcome) => outcome,
            None => {
                cancel.cancel();
                supervisor.await
            }
        };
        let result = outcome.unwrap_or_else(|e| Err(BotError::Supervisor(e.to_string())));

        if let Err(e) = &result {
            error!(error = %e, "Stopping");
        }

        self.manager.close().await;
        info!(echoed_frames = self.echo.echoed_frames(), "Stopped");
        result
    }
}
