//! The callback contract between the engine and an application.

use crate::message::Message;
use crate::session::SessionId;
use crate::tags;
use thiserror::Error;

/// SessionRejectReason (373) values the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    RequiredTagMissing,
    ValueIsIncorrect,
    IncorrectDataFormat,
    InvalidMsgType,
    Other,
}

impl RejectReason {
    /// Wire value for SessionRejectReason.
    pub fn code(self) -> u32 {
        match self {
            Self::RequiredTagMissing => 1,
            Self::ValueIsIncorrect => 5,
            Self::IncorrectDataFormat => 6,
            Self::InvalidMsgType => 11,
            Self::Other => 99,
        }
    }
}

/// Outcome returned by an application callback that refuses a message.
///
/// The engine answers the offending message with a session-level Reject and
/// carries on; a reject never tears the session down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{text}")]
pub struct MessageReject {
    pub reason: RejectReason,
    pub text: String,
    pub ref_tag: Option<u32>,
}

impl MessageReject {
    /// A generic reject carrying free text.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            reason: RejectReason::Other,
            text: text.into(),
            ref_tag: None,
        }
    }

    pub fn unsupported_message_type(msg_type: &str) -> Self {
        Self {
            reason: RejectReason::InvalidMsgType,
            text: format!("Unsupported Message Type {msg_type}"),
            ref_tag: Some(tags::MSG_TYPE),
        }
    }

    pub fn required_tag_missing(tag: u32) -> Self {
        Self {
            reason: RejectReason::RequiredTagMissing,
            text: "Required tag missing".to_string(),
            ref_tag: Some(tag),
        }
    }

    pub fn incorrect_data_format(tag: u32) -> Self {
        Self {
            reason: RejectReason::IncorrectDataFormat,
            text: "Incorrect data format for value".to_string(),
            ref_tag: Some(tag),
        }
    }

    pub fn value_is_incorrect(tag: u32) -> Self {
        Self {
            reason: RejectReason::ValueIsIncorrect,
            text: "Value is incorrect (out of range) for this tag".to_string(),
            ref_tag: Some(tag),
        }
    }

    /// Build the session-level Reject (35=3) answering `refused`.
    pub fn to_message(&self, refused: &Message) -> Message {
        let mut reject = Message::new(tags::msg_type::REJECT)
            .with_field(tags::TEXT, &self.text)
            .with_field(tags::SESSION_REJECT_REASON, self.reason.code())
            .with_field(tags::REF_MSG_TYPE, refused.msg_type());
        if let Some(seq) = refused.seq_num() {
            reject.set_field(tags::REF_SEQ_NUM, seq);
        }
        if let Some(tag) = self.ref_tag {
            reject.set_field(tags::REF_TAG_ID, tag);
        }
        reject
    }
}

/// Session event callbacks.
///
/// The engine invokes every callback for a given session from that session's
/// task, one at a time and in wire order. Implementations must not block.
pub trait Application: Send + Sync + 'static {
    /// The engine created the session (before any connection exists).
    fn on_create(&self, session_id: &SessionId);

    /// Logon completed in both directions.
    fn on_logon(&self, session_id: &SessionId);

    /// The session ended, cleanly or not.
    fn on_logout(&self, session_id: &SessionId);

    /// A session-level message arrived.
    fn from_admin(&self, _message: &Message, _session_id: &SessionId) -> Result<(), MessageReject> {
        Ok(())
    }

    /// An application-level message arrived.
    fn from_app(&self, message: &Message, session_id: &SessionId) -> Result<(), MessageReject>;
}
