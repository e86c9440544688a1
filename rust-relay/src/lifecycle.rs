//! Lifecycle controller: owns the run loop and graceful shutdown.
//!
//! ```text
//! Starting → Running → Draining → Stopped
//! ```
//!
//! `Relay::new` covers `Starting`. `Relay::run` polls until the cancellation
//! token fires, then waits up to the drain deadline for dispatched pipelines
//! and aborts whatever is still running.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RelayConfig;
use crate::context::RelayContext;
use crate::error::ConfigError;
use crate::forward::LocalTarget;
use crate::pipeline::PipelineReport;
use crate::poller::{self, log_finished};
use crate::queue::QueueClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Running,
    Draining,
    Stopped,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Draining => "draining",
            LifecycleState::Stopped => "stopped",
        }
    }
}

/// Totals for one run of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub polls: u64,
    pub poll_errors: u64,
    pub dispatched: u64,
    pub completed: u64,
    /// Pipelines still running at the drain deadline
    pub abandoned: u64,
    pub released: u64,
}

impl RunReport {
    pub fn drained_cleanly(&self) -> bool {
        self.abandoned == 0
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.drained_cleanly() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

pub struct Relay {
    ctx: Arc<RelayContext>,
    state: watch::Sender<LifecycleState>,
}

impl Relay {
    /// Validate `config` and assemble the runtime context.
    pub fn new(
        config: RelayConfig,
        queue: Arc<dyn QueueClient>,
        target: Arc<dyn LocalTarget>,
    ) -> Result<Self, ConfigError> {
        let (state, _) = watch::channel(LifecycleState::Starting);
        config.validate()?;

        info!(
            queue_url = %config.queue_url,
            local_url = %config.local_url,
            max_in_flight = config.max_in_flight,
            max_attempts = config.max_attempts,
            visibility_timeout_secs = config.visibility_timeout.as_secs(),
            drain_timeout_secs = config.drain_timeout.as_secs(),
            header_mappings = config.header_attributes.len(),
            "relay_config_loaded"
        );

        Ok(Self {
            ctx: Arc::new(RelayContext::new(config, queue, target)),
            state,
        })
    }

    /// Token that moves the relay to `Draining` when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancel.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    fn transition(&self, next: LifecycleState) {
        let previous = self.state.send_replace(next);
        info!(from = previous.as_str(), to = next.as_str(), "relay_state_changed");
    }

    pub async fn run(self) -> RunReport {
        self.transition(LifecycleState::Running);

        let mut tasks: JoinSet<PipelineReport> = JoinSet::new();
        let stats = poller::run(&self.ctx, &mut tasks).await;

        self.transition(LifecycleState::Draining);
        let drain_timeout = self.ctx.config.drain_timeout;
        info!(
            in_flight = tasks.len(),
            drain_timeout_secs = drain_timeout.as_secs(),
            "relay_draining"
        );

        let mut completed = stats.finished;
        let drained = tokio::time::timeout(drain_timeout, async {
            while let Some(result) = tasks.join_next().await {
                log_finished(result);
                completed += 1;
            }
        })
        .await;

        let mut abandoned = 0;
        if drained.is_err() {
            abandoned = tasks.len() as u64;
            warn!(
                abandoned = abandoned,
                drain_timeout_secs = drain_timeout.as_secs(),
                "relay_drain_timeout"
            );
            tasks.shutdown().await;
        }

        let report = RunReport {
            polls: stats.polls,
            poll_errors: stats.poll_errors,
            dispatched: stats.dispatched,
            completed,
            abandoned,
            released: stats.released,
        };

        self.transition(LifecycleState::Stopped);
        info!(
            polls = report.polls,
            dispatched = report.dispatched,
            completed = report.completed,
            abandoned = report.abandoned,
            released = report.released,
            "relay_stopped"
        );
        report
    }
}
