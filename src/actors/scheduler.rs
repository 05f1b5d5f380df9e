//! CheckerActor - Runs one protocol checker against every target of its method
//!
//! One actor exists per monitoring method. Each round it asks the state actor
//! for the current targets of its method, so targets added or deleted between
//! rounds are picked up without restarting anything.
//!
//! ## Message Flow
//!
//! ```text
//! start delay → tick → TargetsOfKind → probe (bounded concurrency) → ApplyProbe → StateActor
//!                ↑
//!                └─── Commands (CheckNow, Shutdown)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use futures::stream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tracing::{debug, error, instrument, trace, warn};

use crate::checkers::Checker;
use crate::config::CheckSchedule;
use crate::model::MethodKind;

use super::messages::CheckerCommand;
use super::state::StateHandle;

/// Slack added to a checker's own timeout before a probe is abandoned
const PROBE_GRACE: Duration = Duration::from_secs(1);

pub struct CheckerActor {
    checker: Arc<dyn Checker>,

    schedule: CheckSchedule,

    /// Probes in flight at once within a round
    max_concurrent: usize,

    state: StateHandle,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<CheckerCommand>,
}

impl CheckerActor {
    pub fn new(
        checker: Arc<dyn Checker>,
        schedule: CheckSchedule,
        max_concurrent: usize,
        state: StateHandle,
        command_rx: mpsc::Receiver<CheckerCommand>,
    ) -> Self {
        Self {
            checker,
            schedule,
            max_concurrent: max_concurrent.max(1),
            state,
            command_rx,
        }
    }

    /// Run the actor's main loop
    ///
    /// The first round starts after the schedule's start delay. A round that
    /// overruns the interval delays the next one instead of bursting.
    #[instrument(skip(self), fields(method = %self.checker.kind()))]
    pub async fn run(mut self) {
        debug!(
            "starting checker actor (every {:?}, first in {:?})",
            self.schedule.interval(),
            self.schedule.start_delay()
        );

        let mut ticker = interval_at(
            Instant::now() + self.schedule.start_delay(),
            self.schedule.interval(),
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_round().await {
                        error!("check round failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        CheckerCommand::CheckNow { respond_to } => {
                            debug!("received CheckNow command");
                            let probed = match self.run_round().await {
                                Ok(probed) => probed,
                                Err(e) => {
                                    error!("check round failed: {:#}", e);
                                    0
                                }
                            };
                            let _ = respond_to.send(probed);
                        }

                        CheckerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("checker actor stopped");
    }

    /// Probe every target of this checker's method once
    ///
    /// Results are handed to the state actor as soon as each probe finishes.
    /// Returns the number of targets probed.
    async fn run_round(&self) -> Result<usize> {
        let targets = self
            .state
            .targets_of_kind(self.checker.kind())
            .await
            .context("failed to fetch targets")?;

        if targets.is_empty() {
            trace!("no targets to check");
            return Ok(0);
        }

        let deadline = self.checker.timeout() + PROBE_GRACE;
        let checker = &self.checker;

        let mut results = stream::iter(targets)
            .map(|target| async move {
                let started = Instant::now();
                let result = match timeout(deadline, checker.probe(&target)).await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("probe of {} abandoned after {:?}", target.hostname, deadline);
                        checker.timed_out(&target, started.elapsed())
                    }
                };
                (target.id, result)
            })
            .buffer_unordered(self.max_concurrent);

        let mut probed = 0;
        while let Some((target_id, result)) = results.next().await {
            self.state
                .apply_probe(target_id, result)
                .await
                .context("failed to submit probe result")?;
            probed += 1;
        }

        debug!("checked {probed} targets");
        Ok(probed)
    }
}

/// Handle for controlling a CheckerActor
#[derive(Clone)]
pub struct CheckerHandle {
    sender: mpsc::Sender<CheckerCommand>,

    pub kind: MethodKind,
}

impl CheckerHandle {
    /// Spawn a new checker actor
    pub fn spawn(
        checker: Arc<dyn Checker>,
        schedule: CheckSchedule,
        max_concurrent: usize,
        state: StateHandle,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let kind = checker.kind();

        let actor = CheckerActor::new(checker, schedule, max_concurrent, state, cmd_rx);

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            kind,
        }
    }

    /// Run a round immediately, bypassing the interval timer
    ///
    /// Resolves once every result was submitted to the state actor.
    pub async fn check_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(CheckerCommand::CheckNow { respond_to: tx })
            .await
            .context("failed to send CheckNow command")?;

        rx.await.context("failed to receive response")
    }

    /// Gracefully shut down the checker
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(CheckerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
