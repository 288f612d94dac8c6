//! Passive endpoint: answer every Execution Report with a fill.

use super::{CompletionCheck, Sampler, collect, maybe_start_diagnostics, trace_inbound};
use crate::config::{HarnessConfig, SamplingConfig};
use crate::diagnostics::Progress;
use crate::domain;
use crate::signal::{self, Trigger, Waiter};
use crate::types::{Role, RunOutcome};
use anyhow::Context;
use fixlat_engine::fix42::ExecutionReport;
use fixlat_engine::{
    Acceptor, Application, EngineHandle, Message, MessageReject, MessageRouter, SessionId,
    SessionRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Session callbacks for the acceptor role.
pub struct AcceptorEndpoint {
    sampler: Sampler,
    router: MessageRouter,
    check: CompletionCheck,
    done: Trigger<()>,
}

impl AcceptorEndpoint {
    /// Build the endpoint and the waiter for its completion signal.
    ///
    /// With a sample size of zero the signal has already fired on return.
    pub fn new(
        config: &SamplingConfig,
        registry: SessionRegistry,
        progress: Arc<Progress>,
    ) -> (Self, Waiter<()>) {
        let (done, waiter) = signal::oneshot();

        let mut router = MessageRouter::new();
        router.add_route(ExecutionReport::route(move |_report, session_id| {
            reply_with_fill(&registry, session_id)
        }));

        let endpoint = Self {
            sampler: Sampler::new(config.sample_size, progress),
            router,
            check: CompletionCheck::new(config.rule_for(Role::Acceptor), config.sample_size),
            done,
        };
        if config.sample_size == 0 {
            endpoint.complete(0);
        }
        (endpoint, waiter)
    }

    fn complete(&self, processed: u64) {
        if self.done.fire(()) {
            self.sampler.mark_complete();
            info!(processed, "acceptor sample complete");
        }
    }
}

/// Send one freshly built fill back on `session_id`.
fn reply_with_fill(registry: &SessionRegistry, session_id: &SessionId) -> Result<(), MessageReject> {
    registry
        .send_to_target(domain::fill_report().to_message(), session_id)
        .map_err(|e| MessageReject::new(e.to_string()))
}

impl Application for AcceptorEndpoint {
    fn on_create(&self, session_id: &SessionId) {
        debug!(session = %session_id, "session created");
    }

    fn on_logon(&self, session_id: &SessionId) {
        self.sampler.mark_started();
        info!(session = %session_id, "logged on");
    }

    fn on_logout(&self, session_id: &SessionId) {
        info!(session = %session_id, "logged out");
    }

    fn from_app(&self, message: &Message, session_id: &SessionId) -> Result<(), MessageReject> {
        if let Err(e) = self.sampler.capture(message) {
            warn!(session = %session_id, error = %e, "latency not recorded");
        }
        trace_inbound(message, session_id);

        let routed = self.router.route(message, session_id);
        let processed = self.sampler.count_processed();
        if self.check.is_complete(message, processed) {
            self.complete(processed);
        }
        if let Err(reject) = &routed {
            debug!(session = %session_id, reason = %reject, "rejecting message");
        }
        routed
    }
}

/// A started acceptor waiting for its sample.
pub struct AcceptorRun {
    endpoint: Arc<AcceptorEndpoint>,
    engine: EngineHandle,
    done: Waiter<()>,
    sampling: SamplingConfig,
    diagnostics: Option<JoinHandle<()>>,
}

impl AcceptorRun {
    /// Validate `config`, bind the listener and start accepting.
    pub async fn start(config: &HarnessConfig) -> anyhow::Result<Self> {
        config.validate(Role::Acceptor)?;
        let sampling = config.harness.clone();
        let progress = Arc::new(Progress::new(Role::Acceptor, sampling.sample_size));
        let registry = SessionRegistry::new();

        let (endpoint, done) =
            AcceptorEndpoint::new(&sampling, registry.clone(), Arc::clone(&progress));
        let endpoint = Arc::new(endpoint);
        let engine = Acceptor::new(Arc::clone(&endpoint), config.session.clone(), registry)
            .start()
            .await
            .context("failed to start acceptor")?;

        let diagnostics = match maybe_start_diagnostics(config.diagnostics.listen, &progress).await
        {
            Ok(task) => task,
            Err(e) => {
                engine.stop().await;
                return Err(e).context("failed to start diagnostics listener");
            }
        };

        info!(
            sample_size = sampling.sample_size,
            rule = %sampling.rule_for(Role::Acceptor),
            "acceptor waiting for sample"
        );
        Ok(Self {
            endpoint,
            engine,
            done,
            sampling,
            diagnostics,
        })
    }

    /// Address the acceptor is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.engine.local_addr()
    }

    /// Wait for the sample, reduce it and stop the engine.
    pub async fn finish(self) -> RunOutcome {
        let outcome = collect(Role::Acceptor, &self.endpoint.sampler, self.done, &self.sampling).await;
        self.engine.stop().await;
        if let Some(task) = self.diagnostics {
            task.abort();
        }
        outcome
    }
}

/// Run the acceptor to completion.
pub async fn run_acceptor(config: &HarnessConfig) -> anyhow::Result<RunOutcome> {
    Ok(AcceptorRun::start(config).await?.finish().await)
}
