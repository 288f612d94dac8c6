//! Active side: connect, send Logon, drive the session, reconnect.

use crate::application::Application;
use crate::connection::{self, Role};
use crate::error::EngineError;
use crate::handle::EngineHandle;
use crate::session::SessionRegistry;
use crate::settings::SessionSettings;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{info, warn};

/// Connects to the counterparty for one configured session.
pub struct Initiator<A> {
    app: Arc<A>,
    settings: SessionSettings,
    registry: SessionRegistry,
}

impl<A: Application> Initiator<A> {
    pub fn new(app: Arc<A>, settings: SessionSettings, registry: SessionRegistry) -> Self {
        Self {
            app,
            settings,
            registry,
        }
    }

    /// Validate settings and start connecting in the background.
    pub fn start(self) -> Result<EngineHandle, EngineError> {
        self.settings.connect_address()?;
        self.app.on_create(&self.settings.session_id());

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.connect_loop(shutdown_rx));
        Ok(EngineHandle::new(None, shutdown_tx, task))
    }

    async fn connect_loop(self, mut shutdown: watch::Receiver<bool>) {
        let Some(addr) = self.settings.socket_connect_address.clone() else {
            return;
        };
        let id = self.settings.session_id();

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                connected = TcpStream::connect(addr.as_str()) => match connected {
                    Ok(stream) => {
                        info!(session = %id, %addr, "connected");
                        let result = connection::establish(
                            stream,
                            Role::Initiator,
                            &self.settings,
                            Arc::clone(&self.app),
                            self.registry.clone(),
                            shutdown.clone(),
                        )
                        .await;
                        if let Err(err) = result {
                            warn!(session = %id, error = %err, "session ended with error");
                        }
                    }
                    Err(err) => warn!(session = %id, %addr, error = %err, "connect failed"),
                },
                _ = shutdown.changed() => break,
            }

            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.settings.reconnect_interval) => {}
                _ = shutdown.changed() => break,
            }
        }
    }
}
