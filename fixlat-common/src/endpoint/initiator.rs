//! Active endpoint: log on, send a burst, watch for the closing marker.

use super::{
    CompletionCheck, Sampler, collect, maybe_start_diagnostics, partial_or_final, trace_inbound,
};
use crate::config::{HarnessConfig, SamplingConfig};
use crate::diagnostics::Progress;
use crate::domain;
use crate::signal::{self, Trigger, Waiter};
use crate::types::{Role, RunOutcome};
use anyhow::Context;
use fixlat_engine::{
    Application, Initiator, Message, MessageReject, SessionId, SessionRegistry,
};
use serde::Serialize;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Session callbacks for the initiator role.
pub struct InitiatorEndpoint {
    sampler: Sampler,
    session: OnceLock<SessionId>,
    ready: Trigger<SessionId>,
    done: Trigger<()>,
    check: CompletionCheck,
}

impl InitiatorEndpoint {
    /// Build the endpoint plus waiters for "ready to send" and completion.
    pub fn new(
        config: &SamplingConfig,
        progress: Arc<Progress>,
    ) -> (Self, Waiter<SessionId>, Waiter<()>) {
        let (ready, ready_waiter) = signal::oneshot();
        let (done, done_waiter) = signal::oneshot();
        let endpoint = Self {
            sampler: Sampler::new(config.sample_size, progress),
            session: OnceLock::new(),
            ready,
            done,
            check: CompletionCheck::new(config.rule_for(Role::Initiator), config.sample_size),
        };
        if config.sample_size == 0 {
            endpoint.complete(0);
        }
        (endpoint, ready_waiter, done_waiter)
    }

    /// The session captured at the first logon.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.get()
    }

    fn complete(&self, processed: u64) {
        if self.done.fire(()) {
            self.sampler.mark_complete();
            info!(processed, "initiator sample complete");
        }
    }
}

impl Application for InitiatorEndpoint {
    fn on_create(&self, session_id: &SessionId) {
        debug!(session = %session_id, "session created");
    }

    fn on_logon(&self, session_id: &SessionId) {
        if self.session.set(session_id.clone()).is_err() {
            info!(session = %session_id, "logged on again");
            return;
        }
        self.sampler.mark_started();
        self.ready.fire(session_id.clone());
        info!(session = %session_id, "logged on, ready to send");
    }

    fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "logged out");
    }

    fn from_app(&self, message: &Message, session_id: &SessionId) -> Result<(), MessageReject> {
        if let Err(e) = self.sampler.capture(message) {
            warn!(session = %session_id, error = %e, "latency not recorded");
        }
        trace_inbound(message, session_id);

        let processed = self.sampler.count_processed();
        if self.check.is_complete(message, processed) {
            self.complete(processed);
        }
        Ok(())
    }
}

/// Counts from [`send_burst`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BurstReport {
    pub attempted: usize,
    pub failed: usize,
}

/// Send `template` `count` times. Failures are logged and counted; the burst
/// never stops early.
pub fn send_burst(
    registry: &SessionRegistry,
    session_id: &SessionId,
    template: &Message,
    count: usize,
) -> BurstReport {
    let mut report = BurstReport::default();
    for _ in 0..count {
        report.attempted += 1;
        if let Err(e) = registry.send_to_target(template.clone(), session_id) {
            report.failed += 1;
            if report.failed == 1 {
                warn!(session = %session_id, error = %e, "send failed");
            } else {
                debug!(session = %session_id, error = %e, "send failed");
            }
        }
    }
    report
}

/// Run the initiator to completion.
///
/// The completion deadline, if any, bounds the wait for logon and then,
/// separately, the wait for the closing marker.
pub async fn run_initiator(config: &HarnessConfig) -> anyhow::Result<RunOutcome> {
    config.validate(Role::Initiator)?;
    let sampling = config.harness.clone();
    let progress = Arc::new(Progress::new(Role::Initiator, sampling.sample_size));
    let registry = SessionRegistry::new();

    let (endpoint, ready, done) = InitiatorEndpoint::new(&sampling, Arc::clone(&progress));
    let endpoint = Arc::new(endpoint);
    let engine = Initiator::new(Arc::clone(&endpoint), config.session.clone(), registry.clone())
        .start()
        .context("failed to start initiator")?;

    let diagnostics = match maybe_start_diagnostics(config.diagnostics.listen, &progress).await {
        Ok(task) => task,
        Err(e) => {
            engine.stop().await;
            return Err(e).context("failed to start diagnostics listener");
        }
    };

    info!(
        sample_size = sampling.sample_size,
        rule = %sampling.rule_for(Role::Initiator),
        "initiator connecting"
    );

    let outcome = if sampling.sample_size == 0 {
        collect(Role::Initiator, &endpoint.sampler, done, &sampling).await
    } else {
        match ready.wait(sampling.completion_timeout).await {
            Ok(session_id) => {
                let template = domain::fill_report().to_message();
                let burst = send_burst(&registry, &session_id, &template, sampling.sample_size);
                info!(attempted = burst.attempted, failed = burst.failed, "burst sent");
                collect(Role::Initiator, &endpoint.sampler, done, &sampling).await
            }
            Err(e) => {
                warn!(error = %e, "never logged on");
                partial_or_final(Role::Initiator, &endpoint.sampler, false)
            }
        }
    };

    engine.stop().await;
    if let Some(task) = diagnostics {
        task.abort();
    }
    Ok(outcome)
}
