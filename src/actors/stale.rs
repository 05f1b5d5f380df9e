//! StaleDetectorActor - Marks silent agents offline
//!
//! Agents push reports, so a crashed agent produces no failed sample at all.
//! This actor periodically asks the state actor to sweep agents whose last
//! report is older than the configured threshold.

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, instrument, warn};

use crate::config::StaleConfig;

use super::messages::StaleCommand;
use super::state::StateHandle;

pub struct StaleDetectorActor {
    config: StaleConfig,
    state: StateHandle,
    command_rx: mpsc::Receiver<StaleCommand>,
}

impl StaleDetectorActor {
    pub fn new(
        config: StaleConfig,
        state: StateHandle,
        command_rx: mpsc::Receiver<StaleCommand>,
    ) -> Self {
        Self {
            config,
            state,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(threshold = self.config.threshold))]
    pub async fn run(mut self) {
        debug!("starting stale detector actor");

        let period = self.config.interval();
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!("stale sweep failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        StaleCommand::SweepNow { respond_to } => {
                            debug!("received SweepNow command");
                            let swept = match self.sweep().await {
                                Ok(swept) => swept,
                                Err(e) => {
                                    error!("stale sweep failed: {:#}", e);
                                    0
                                }
                            };
                            let _ = respond_to.send(swept);
                        }

                        StaleCommand::Shutdown => {
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

        debug!("stale detector actor stopped");
    }

    async fn sweep(&self) -> Result<usize> {
        let swept = self
            .state
            .sweep_stale(Utc::now(), self.config.threshold())
            .await
            .context("failed to sweep stale agents")?;

        if swept > 0 {
            info!("marked {swept} silent agents offline");
        }
        Ok(swept)
    }
}

/// Handle for controlling the StaleDetectorActor
#[derive(Clone)]
pub struct StaleDetectorHandle {
    sender: mpsc::Sender<StaleCommand>,
}

impl StaleDetectorHandle {
    pub fn spawn(config: StaleConfig, state: StateHandle) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = StaleDetectorActor::new(config, state, cmd_rx);

        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Sweep immediately, returning how many agents went offline
    pub async fn sweep_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(StaleCommand::SweepNow { respond_to: tx })
            .await
            .context("failed to send SweepNow command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(StaleCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
