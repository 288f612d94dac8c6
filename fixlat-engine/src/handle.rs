//! Handle for a running acceptor or initiator.

use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Upper bound on how long [`EngineHandle::stop`] waits for sessions to log out.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Owns the background task driving an acceptor or initiator.
///
/// Dropping the handle without calling [`EngineHandle::stop`] also asks the
/// sessions to log out, but nothing waits for them to finish.
pub struct EngineHandle {
    local_addr: Option<SocketAddr>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EngineHandle {
    pub(crate) fn new(
        local_addr: Option<SocketAddr>,
        shutdown: watch::Sender<bool>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            local_addr,
            shutdown,
            task,
        }
    }

    /// Address the acceptor is listening on (`None` for initiators).
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Log out every session and wait for the engine task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let mut task = self.task;
        match tokio::time::timeout(STOP_GRACE, &mut task).await {
            Ok(_) => debug!("engine stopped"),
            Err(_) => {
                warn!("engine did not stop within {:?}, aborting", STOP_GRACE);
                task.abort();
            }
        }
    }
}
