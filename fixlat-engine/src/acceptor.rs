//! Passive side: listen, accept Logon, drive the session.

use crate::application::Application;
use crate::connection::{self, Role};
use crate::error::EngineError;
use crate::handle::EngineHandle;
use crate::session::SessionRegistry;
use crate::settings::SessionSettings;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Accepts inbound connections for one configured session.
pub struct Acceptor<A> {
    app: Arc<A>,
    settings: Arc<SessionSettings>,
    registry: SessionRegistry,
}

impl<A: Application> Acceptor<A> {
    pub fn new(app: Arc<A>, settings: SessionSettings, registry: SessionRegistry) -> Self {
        Self {
            app,
            settings: Arc::new(settings),
            registry,
        }
    }

    /// Bind the listen socket and start accepting in the background.
    ///
    /// Fails fast if the settings are invalid or the address cannot be bound.
    pub async fn start(self) -> Result<EngineHandle, EngineError> {
        let addr = self.settings.accept_address()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EngineError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        self.app.on_create(&self.settings.session_id());
        info!(session = %self.settings.session_id(), %local_addr, "acceptor listening");

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.accept_loop(listener, shutdown_rx));
        Ok(EngineHandle::new(Some(local_addr), shutdown_tx, task))
    }

    async fn accept_loop(self, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!(%peer, "accepted connection");
                        let app = Arc::clone(&self.app);
                        let settings = Arc::clone(&self.settings);
                        let registry = self.registry.clone();
                        let session_shutdown = shutdown.clone();
                        sessions.spawn(async move {
                            let result = connection::establish(
                                stream,
                                Role::Acceptor,
                                &settings,
                                app,
                                registry,
                                session_shutdown,
                            )
                            .await;
                            if let Err(err) = result {
                                warn!(%peer, error = %err, "session ended with error");
                            }
                        });
                    }
                    Err(err) => warn!(error = %err, "accept failed"),
                },
                Some(_) = sessions.join_next(), if !sessions.is_empty() => {}
                _ = shutdown.changed() => break,
            }
        }

        drop(listener);
        while sessions.join_next().await.is_some() {}
    }
}
