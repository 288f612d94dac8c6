//! Minimal FIX 4.2 session engine.
//!
//! Provides just enough of the session layer for the latency harness:
//! tag=value framing with BodyLength/CheckSum validation, Logon/Logout,
//! Heartbeat/TestRequest, sequence numbering, a send registry and a typed
//! message router. Resend requests, gap fill and persistent message stores
//! are intentionally absent.
//!
//! Every inbound message carries the [`std::time::Instant`] at which its
//! frame was fully read ([`Message::receive_time`]), taken before any
//! application callback runs.

#![forbid(unsafe_code)]

pub mod acceptor;
pub mod application;
pub mod codec;
mod connection;
pub mod error;
pub mod fix42;
mod handle;
pub mod initiator;
pub mod message;
pub mod router;
pub mod session;
pub mod settings;
pub mod tags;

pub use acceptor::Acceptor;
pub use application::{Application, MessageReject, RejectReason};
pub use error::{EngineError, ParseError, SendError};
pub use handle::EngineHandle;
pub use initiator::Initiator;
pub use message::{Field, Message, SOH};
pub use router::{MessageRouter, Route};
pub use session::{SessionId, SessionRegistry};
pub use settings::{SessionSettings, SettingsError};
