//! Error types for the session engine.

use crate::session::SessionId;
use std::net::SocketAddr;
use thiserror::Error;

/// Errors produced while framing or parsing a raw FIX message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("message does not start with BeginString (8=)")]
    MissingBeginString,

    #[error("BodyLength (9) must be the second field")]
    MissingBodyLength,

    #[error("invalid BodyLength value: {0}")]
    InvalidBodyLength(String),

    #[error("BodyLength mismatch: declared {declared}, actual {actual}")]
    BodyLengthMismatch { declared: usize, actual: usize },

    #[error("CheckSum (10) missing or not the final field")]
    MissingCheckSum,

    #[error("CheckSum mismatch: declared {declared:03}, computed {computed:03}")]
    CheckSumMismatch { declared: u32, computed: u32 },

    #[error("MsgType (35) must be the third field")]
    MissingMsgType,

    #[error("malformed field at byte {offset}")]
    MalformedField { offset: usize },

    #[error("field {tag} is not valid UTF-8")]
    InvalidUtf8 { tag: u32 },

    #[error("frame header exceeds {0} bytes without a delimiter")]
    HeaderTooLong(usize),
}

/// Errors that terminate a connection or prevent the engine from starting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to bind acceptor on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("garbled frame: {0}")]
    Frame(#[from] ParseError),

    #[error("logon rejected: {0}")]
    Logon(String),

    #[error("timed out waiting for logon after {0:?}")]
    LogonTimeout(std::time::Duration),

    #[error("MsgSeqNum too low: expected {expected}, received {received}")]
    SeqNumTooLow { expected: u64, received: u64 },

    #[error("session {0} is already logged on")]
    DuplicateSession(SessionId),

    #[error("invalid settings: {0}")]
    Settings(#[from] crate::settings::SettingsError),
}

/// Errors returned by [`crate::SessionRegistry::send_to_target`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("session {0} not found")]
    UnknownSession(SessionId),

    #[error("session {0} is disconnected")]
    Disconnected(SessionId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mismatch_pads_to_three_digits() {
        let err = ParseError::CheckSumMismatch {
            declared: 7,
            computed: 42,
        };
        assert_eq!(
            err.to_string(),
            "CheckSum mismatch: declared 007, computed 042"
        );
    }

    #[test]
    fn send_error_names_session() {
        let id = SessionId::new("FIX.4.2", "A", "B");
        let err = SendError::UnknownSession(id);
        assert_eq!(err.to_string(), "session FIX.4.2:A->B not found");
    }

    #[test]
    fn parse_error_converts_into_engine_error() {
        let err: EngineError = ParseError::MissingCheckSum.into();
        assert!(matches!(err, EngineError::Frame(ParseError::MissingCheckSum)));
    }
}
