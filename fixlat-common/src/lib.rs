//! Latency sampling harness for FIX sessions.
//!
//! This crate holds everything the `fixlat-acceptor` and `fixlat-initiator`
//! binaries share: the per-endpoint sample buffer, one-shot signals, the
//! statistics reducer, the message renderer, both endpoints, configuration,
//! logging setup, CPU profiling and the optional diagnostics listener.

#![forbid(unsafe_code)]

pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod endpoint;
pub mod logging;
pub mod profiling;
pub mod render;
pub mod sampling;
pub mod signal;
pub mod stats;
pub mod types;

pub use config::{ConfigError, HarnessConfig, Overrides, SamplingConfig};
pub use diagnostics::{Progress, ProgressSnapshot};
pub use endpoint::{
    AcceptorEndpoint, AcceptorRun, BurstReport, InitiatorEndpoint, run_acceptor, run_initiator,
    send_burst,
};
pub use logging::{LogConfig, LogFormat, LoggingGuards, init_logging};
pub use profiling::{CpuProfiler, ProfileError};
pub use render::{RenderError, Renderable, render};
pub use sampling::{SampleBuffer, SampleError};
pub use signal::{Trigger, WaitError, Waiter};
pub use stats::{LatencyStats, RunContext, Summary, log_report, reduce};
pub use types::{CompletionRule, Role, RunOutcome};
