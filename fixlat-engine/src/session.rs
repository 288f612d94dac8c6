//! Session identity and the registry of logged-on sessions.

use crate::error::{EngineError, SendError};
use crate::message::Message;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;

/// Identifies one logical connection between two named parties.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId {
    pub begin_string: String,
    pub sender_comp_id: String,
    pub target_comp_id: String,
}

impl SessionId {
    pub fn new(
        begin_string: impl Into<String>,
        sender_comp_id: impl Into<String>,
        target_comp_id: impl Into<String>,
    ) -> Self {
        Self {
            begin_string: begin_string.into(),
            sender_comp_id: sender_comp_id.into(),
            target_comp_id: target_comp_id.into(),
        }
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}",
            self.begin_string, self.sender_comp_id, self.target_comp_id
        )
    }
}

/// Work items for a session's writer task.
#[derive(Debug)]
pub(crate) enum Outbound {
    Message(Message),
    Close,
}

/// Routes outbound messages to logged-on sessions.
///
/// Cloning is cheap; all clones share the same table. A session is present
/// from the moment its Logon is accepted until it disconnects.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionId, mpsc::UnboundedSender<Outbound>>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `message` for delivery on `session_id`.
    ///
    /// The writer task stamps the standard header (CompIDs, MsgSeqNum,
    /// SendingTime), so callers only fill in MsgType and body fields.
    pub fn send_to_target(&self, message: Message, session_id: &SessionId) -> Result<(), SendError> {
        let sessions = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let sender = sessions
            .get(session_id)
            .ok_or_else(|| SendError::UnknownSession(session_id.clone()))?;
        sender
            .send(Outbound::Message(message))
            .map_err(|_| SendError::Disconnected(session_id.clone()))
    }

    /// Whether `session_id` is currently logged on.
    pub fn is_logged_on(&self, session_id: &SessionId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(session_id)
    }

    /// Number of logged-on sessions.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn register(
        &self,
        session_id: &SessionId,
        sender: mpsc::UnboundedSender<Outbound>,
    ) -> Result<(), EngineError> {
        let mut sessions = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.get(session_id).is_some_and(|s| !s.is_closed()) {
            return Err(EngineError::DuplicateSession(session_id.clone()));
        }
        sessions.insert(session_id.clone(), sender);
        Ok(())
    }

    pub(crate) fn unregister(&self, session_id: &SessionId) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(session_id);
    }
}
