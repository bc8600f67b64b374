//! MonitorActor - checks a single endpoint on its own interval
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick ─▶ Probe ─▶ StatusTracker ─▶ store / notifier
//!     ↑                        │
//!     │                        └─▶ scheduler registry (status, cooldown)
//!     └─── Commands (CheckNow), cancellation
//! ```
//!
//! The first tick fires immediately, so a freshly spawned actor checks its
//! endpoint right away. Ticks missed while a slow probe is running are
//! delayed, never bunched up, so checks of one monitor never overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, instrument, trace};

use crate::monitors::probe::{Probe, ProbeTarget};
use crate::monitors::tracker::{Cooldown, Evaluation, StatusTracker};
use crate::scheduler::Registry;
use crate::storage::schema::{Monitor, MonitorId};

use super::messages::MonitorCommand;

/// Actor that checks a single monitor
pub struct MonitorActor {
    monitor: Monitor,

    target: ProbeTarget,

    /// Normalized tick period
    period: Duration,

    /// Distinguishes this task from earlier tasks of the same monitor
    generation: u64,

    /// Down-notification gate, handed back when the actor exits
    cooldown: Cooldown,

    probe: Arc<dyn Probe>,
    tracker: Arc<StatusTracker>,
    registry: Arc<Registry>,

    command_rx: mpsc::Receiver<MonitorCommand>,
    cancel: CancellationToken,
}

/// Everything needed to spawn a monitor actor
pub struct TaskSetup {
    pub monitor: Monitor,
    pub target: ProbeTarget,
    pub period: Duration,
    pub generation: u64,
    pub cooldown: Cooldown,
}

impl MonitorActor {
    fn new(
        setup: TaskSetup,
        probe: Arc<dyn Probe>,
        tracker: Arc<StatusTracker>,
        registry: Arc<Registry>,
        command_rx: mpsc::Receiver<MonitorCommand>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            monitor: setup.monitor,
            target: setup.target,
            period: setup.period,
            generation: setup.generation,
            cooldown: setup.cooldown,
            probe,
            tracker,
            registry,
            command_rx,
            cancel,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until the cancellation token fires. A check that is already in
    /// flight is finished first. Returns the cooldown so a replacement task
    /// can continue with it.
    #[instrument(skip(self), fields(monitor = self.monitor.id))]
    pub async fn run(mut self) -> Cooldown {
        debug!("starting monitor actor for {} every {:?}", self.monitor.url, self.period);

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!("cancelled");
                    break;
                }

                _ = ticker.tick() => {
                    self.perform_check().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        MonitorCommand::CheckNow { respond_to } => {
                            debug!("received CheckNow command");
                            let evaluation = self.perform_check().await;
                            let _ = respond_to.send(evaluation);
                        }
                    }
                }
            }
        }

        debug!("monitor actor stopped");
        self.cooldown
    }

    async fn perform_check(&mut self) -> Evaluation {
        trace!("checking {}", self.target.url);

        let outcome = self.probe.execute(&self.target).await;
        let evaluation = self
            .tracker
            .evaluate(&mut self.monitor, &outcome, Utc::now(), &mut self.cooldown)
            .await;

        self.registry
            .record(self.monitor.id, self.generation, self.monitor.status, self.cooldown)
            .await;

        evaluation
    }
}

/// Handle for controlling a MonitorActor
pub struct MonitorHandle {
    id: MonitorId,
    sender: mpsc::Sender<MonitorCommand>,
    cancel: CancellationToken,
    join: JoinHandle<Cooldown>,
}

impl MonitorHandle {
    /// Spawn a new monitor actor
    ///
    /// `cancel` is usually a child of the scheduler's shutdown token, and
    /// `tasks` the scheduler's tracker so shutdown can wait for the actor.
    pub(crate) fn spawn(
        setup: TaskSetup,
        probe: Arc<dyn Probe>,
        tracker: Arc<StatusTracker>,
        registry: Arc<Registry>,
        tasks: &TaskTracker,
        cancel: CancellationToken,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let id = setup.monitor.id;

        let actor = MonitorActor::new(setup, probe, tracker, registry, cmd_rx, cancel.clone());
        let join = tasks.spawn(actor.run());

        Self {
            id,
            sender: cmd_tx,
            cancel,
            join,
        }
    }

    pub fn id(&self) -> MonitorId {
        self.id
    }

    /// Sender for commands, usable without holding on to the handle
    pub fn commands(&self) -> mpsc::Sender<MonitorCommand> {
        self.sender.clone()
    }

    /// Trigger an immediate check; `None` if the actor is gone
    pub async fn check_now(&self) -> Option<Evaluation> {
        request_check(&self.sender).await
    }

    /// Signal the actor to stop without waiting for it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the actor to exit, returning its final cooldown
    pub async fn join(self) -> Option<Cooldown> {
        self.join.await.ok()
    }

    /// Cancel the actor and wait until it has exited
    pub async fn shutdown(self) -> Option<Cooldown> {
        self.cancel();
        self.join().await
    }
}

/// Send `CheckNow` through `sender` and wait for the evaluation
pub async fn request_check(sender: &mpsc::Sender<MonitorCommand>) -> Option<Evaluation> {
    let (tx, rx) = oneshot::channel();
    sender
        .send(MonitorCommand::CheckNow { respond_to: tx })
        .await
        .ok()?;
    rx.await.ok()
}
