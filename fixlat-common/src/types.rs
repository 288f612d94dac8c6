//! Shared types used by both endpoints and the binaries.

use crate::stats::Summary;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the session an endpoint plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Acceptor,
    Initiator,
}

impl Role {
    /// Banner label used in the statistics report.
    pub fn banner(self) -> &'static str {
        match self {
            Self::Acceptor => "ACCEPTOR",
            Self::Initiator => "INITIATOR",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Acceptor => f.write_str("acceptor"),
            Self::Initiator => f.write_str("initiator"),
        }
    }
}

/// How an endpoint decides that its sample is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionRule {
    /// The processed-message counter reached the sample size.
    Count,
    /// An inbound message carried MsgSeqNum equal to the sample size.
    Marker,
}

impl CompletionRule {
    /// Default rule for each role.
    pub fn default_for(role: Role) -> Self {
        match role {
            Role::Acceptor => Self::Count,
            Role::Initiator => Self::Marker,
        }
    }
}

impl fmt::Display for CompletionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count => f.write_str("count"),
            Self::Marker => f.write_str("marker"),
        }
    }
}

/// Result of one harness run.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    pub role: Role,
    /// `false` when a deadline expired before the sample completed.
    pub completed: bool,
    pub summary: Summary,
}

impl RunOutcome {
    /// Process exit status for this outcome.
    pub fn exit_code(&self) -> u8 {
        if self.completed { 0 } else { 2 }
    }
}
