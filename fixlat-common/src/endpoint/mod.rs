//! Acceptor and initiator endpoints.
//!
//! Each endpoint is an [`Application`](fixlat_engine::Application) that
//! captures dispatch latency for every inbound application message and fires
//! a one-shot completion signal once its sample is complete. The coordinating
//! flow (`run`) waits for that signal, lets in-flight traffic settle, and
//! reduces the sample.

pub mod acceptor;
pub mod initiator;

pub use acceptor::{AcceptorEndpoint, AcceptorRun, run_acceptor};
pub use initiator::{BurstReport, InitiatorEndpoint, run_initiator, send_burst};

use crate::config::SamplingConfig;
use crate::diagnostics::{HttpState, Progress, start_server};
use crate::render::render;
use crate::sampling::{SampleBuffer, SampleError};
use crate::signal::Waiter;
use crate::stats::{Summary, reduce};
use crate::types::{CompletionRule, Role, RunOutcome};
use fixlat_engine::{Message, SessionId};
use memchr::memmem;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{Level, debug, info, trace, warn};

struct SampleState {
    buffer: SampleBuffer,
    processed: u64,
    started_at: Option<Instant>,
}

/// Latency capture shared by both endpoints.
///
/// Session callbacks arrive one at a time per session; the mutex covers the
/// case of a reconnect overlapping a session that is still shutting down.
pub(crate) struct Sampler {
    state: Mutex<SampleState>,
    progress: Arc<Progress>,
}

impl Sampler {
    pub(crate) fn new(capacity: usize, progress: Arc<Progress>) -> Self {
        Self {
            state: Mutex::new(SampleState {
                buffer: SampleBuffer::with_capacity(capacity),
                processed: 0,
                started_at: None,
            }),
            progress,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SampleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record `t0` at the first logon; later logons keep the original.
    pub(crate) fn mark_started(&self) {
        self.lock().started_at.get_or_insert_with(Instant::now);
    }

    /// Record the dispatch latency of `message`.
    pub(crate) fn capture(&self, message: &Message) -> Result<usize, SampleError> {
        let receipt = message.receive_time().unwrap_or_else(Instant::now);
        let mut state = self.lock();
        let index = state.buffer.record_since(receipt)?;
        self.progress.set_captured(state.buffer.len());
        Ok(index)
    }

    /// Count one processed message and return the new total.
    pub(crate) fn count_processed(&self) -> u64 {
        let mut state = self.lock();
        state.processed += 1;
        self.progress.set_processed(state.processed);
        state.processed
    }

    pub(crate) fn mark_complete(&self) {
        self.progress.mark_complete();
    }

    /// Elapsed time since `t0` and the processed count, as of `now`.
    pub(crate) fn checkpoint(&self, now: Instant) -> Checkpoint {
        let state = self.lock();
        Checkpoint {
            elapsed: state
                .started_at
                .map(|t0| now.saturating_duration_since(t0))
                .unwrap_or_default(),
            processed: state.processed,
        }
    }

    /// Reduce every latency captured so far, with throughput taken from
    /// `checkpoint`.
    pub(crate) fn summarize_at(&self, checkpoint: Checkpoint) -> Summary {
        let state = self.lock();
        reduce(state.buffer.as_slice(), checkpoint.elapsed, checkpoint.processed)
    }

    /// Reduce what has been captured so far, timing from `t0` to `now`.
    pub(crate) fn summarize(&self, now: Instant) -> Summary {
        self.summarize_at(self.checkpoint(now))
    }
}

/// Throughput inputs frozen at one instant.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    elapsed: Duration,
    processed: u64,
}

/// Decides whether a processed message completes the sample.
pub(crate) enum CompletionCheck {
    Count(u64),
    Marker(memmem::Finder<'static>),
}

impl CompletionCheck {
    pub(crate) fn new(rule: CompletionRule, sample_size: usize) -> Self {
        match rule {
            CompletionRule::Count => Self::Count(sample_size as u64),
            CompletionRule::Marker => {
                let marker = seq_num_marker(sample_size as u64);
                Self::Marker(memmem::Finder::new(&marker).into_owned())
            }
        }
    }

    pub(crate) fn is_complete(&self, message: &Message, processed: u64) -> bool {
        match self {
            Self::Count(target) => processed >= *target,
            Self::Marker(finder) => message
                .bytes()
                .is_some_and(|raw| finder.find(raw).is_some()),
        }
    }
}

/// `<SOH>34=<seq><SOH>`, the MsgSeqNum field as it appears mid-frame.
pub fn seq_num_marker(seq: u64) -> Vec<u8> {
    format!("\x0134={seq}\x01").into_bytes()
}

/// Log an inbound message at trace level, after latency has been captured.
pub(crate) fn trace_inbound(message: &Message, session_id: &SessionId) {
    if !tracing::enabled!(Level::TRACE) {
        return;
    }
    match render(message) {
        Ok(text) => trace!(session = %session_id, message = %text, "inbound"),
        Err(e) => trace!(session = %session_id, error = %e, "inbound (unrenderable)"),
    }
}

/// Wait for completion, settle, and reduce.
///
/// The acceptor times its throughput through the settle delay; the initiator
/// stops the clock at completion. Latencies captured while settling are
/// reduced on both sides.
pub(crate) async fn collect(
    role: Role,
    sampler: &Sampler,
    done: Waiter<()>,
    config: &SamplingConfig,
) -> RunOutcome {
    if let Err(e) = done.wait(config.completion_timeout).await {
        warn!(error = %e, "sample incomplete, reporting partial result");
        return partial_or_final(role, sampler, false);
    }

    let at_completion = sampler.checkpoint(Instant::now());
    debug!(
        settle = %humantime::format_duration(config.settle_delay),
        "sample complete, settling"
    );
    tokio::time::sleep(config.settle_delay).await;

    let checkpoint = match role {
        Role::Acceptor => sampler.checkpoint(Instant::now()),
        Role::Initiator => at_completion,
    };
    RunOutcome {
        role,
        completed: true,
        summary: sampler.summarize_at(checkpoint),
    }
}

pub(crate) fn partial_or_final(role: Role, sampler: &Sampler, completed: bool) -> RunOutcome {
    RunOutcome {
        role,
        completed,
        summary: sampler.summarize(Instant::now()),
    }
}

/// Start the diagnostics listener if one is configured.
pub(crate) async fn maybe_start_diagnostics(
    listen: Option<SocketAddr>,
    progress: &Arc<Progress>,
) -> std::io::Result<Option<JoinHandle<()>>> {
    let Some(addr) = listen else {
        return Ok(None);
    };
    let state = HttpState {
        progress: Arc::clone(progress),
        started_at: Instant::now(),
    };
    let (local, task) = start_server(addr, state).await?;
    info!(addr = %local, "progress available at /debug/progress");
    Ok(Some(task))
}
