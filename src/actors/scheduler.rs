//! SchedulerActor - runs a job on a fixed interval
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Job::run() → log outcome
//!     ↑
//!     └─── Commands (TickNow, Shutdown)
//! ```
//!
//! Ticks run inline in the actor task, so at most one tick is ever in flight.
//! Ticks that come due while a previous one is still running are skipped,
//! not queued. The first tick fires one full interval after start.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, warn};

use super::messages::{SchedulerCommand, SchedulerState};

/// Work executed on every tick
#[async_trait]
pub trait Job: Send + Sync + 'static {
    async fn run(&self) -> Result<()>;
}

pub struct SchedulerActor {
    /// Work to run on each tick
    job: Arc<dyn Job>,

    /// Time between ticks
    period: Duration,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// Publishes lifecycle changes to handles
    state_tx: watch::Sender<SchedulerState>,
}

impl SchedulerActor {
    pub fn new(
        job: Arc<dyn Job>,
        period: Duration,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        state_tx: watch::Sender<SchedulerState>,
    ) -> Self {
        state_tx.send_replace(SchedulerState::Created);
        Self {
            job,
            period,
            command_rx,
            state_tx,
        }
    }

    /// Run the actor's main loop
    ///
    /// This is the entry point for the actor. It runs until:
    /// - A Shutdown command is received
    /// - The command channel is closed
    #[instrument(skip(self), fields(period = ?self.period))]
    pub async fn run(mut self) {
        debug!("starting scheduler");
        self.state_tx.send_replace(SchedulerState::Started);

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.state_tx.send_replace(SchedulerState::Running);
                    if let Err(e) = self.job.run().await {
                        debug!("tick failed: {:#}", e);
                    }
                }

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::TickNow { respond_to }) => {
                            debug!("received TickNow command");
                            let result = self.job.run().await;
                            let _ = respond_to.send(result);
                        }

                        Some(SchedulerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("all scheduler handles dropped, shutting down");
                            break;
                        }
                    }
                }
            }
        }

        self.state_tx.send_replace(SchedulerState::Stopped);
        debug!("scheduler stopped");
    }
}

/// Handle for controlling a SchedulerActor
///
/// Cloneable; every clone controls the same actor.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    state_rx: watch::Receiver<SchedulerState>,
}

impl SchedulerHandle {
    /// Spawn a scheduler running `job` every `period`
    pub fn spawn(job: Arc<dyn Job>, period: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (state_tx, state_rx) = watch::channel(SchedulerState::Created);

        let actor = SchedulerActor::new(job, period, cmd_rx, state_tx);

        tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            state_rx,
        }
    }

    /// Run the job now and return its result
    pub async fn tick_now(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive response")??;
        Ok(())
    }

    /// Ask the scheduler to stop after any in-flight tick
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }

    pub fn state(&self) -> SchedulerState {
        *self.state_rx.borrow()
    }

    /// Resolves once the scheduler has reached [`SchedulerState::Stopped`]
    pub async fn stopped(&self) {
        let mut state_rx = self.state_rx.clone();
        let _ = state_rx
            .wait_for(|state| *state == SchedulerState::Stopped)
            .await;
    }
}
