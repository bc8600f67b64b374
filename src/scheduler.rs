//! Scheduler - one supervised task per enabled monitor
//!
//! The scheduler owns the map from monitor id to running task. The map and
//! the per-monitor status and cooldown kept next to each task are private and
//! only reachable through [`Scheduler`]'s operations.
//!
//! ```text
//!                 ┌──────────────────────────┐
//!   add/remove ──▶│        Scheduler         │◀── status_snapshot
//!   update/stop   │  Registry (RwLock map)   │
//!                 └────────────┬─────────────┘
//!                              │ spawns (child cancellation token each)
//!              ┌───────────────┼────────────────┐
//!        ┌─────▼─────┐   ┌─────▼─────┐    ┌─────▼─────┐
//!        │ Monitor 1 │   │ Monitor 2 │    │ Monitor N │
//!        └───────────┘   └───────────┘    └───────────┘
//! ```
//!
//! `stop` cancels the shared parent token and waits for every task ever
//! spawned, including ones a concurrent `remove` is still shutting down, so no
//! check is recorded once it returns. Notifications go through an alert actor
//! and never hold up a check.
//!
//! `sync` reconciles the running tasks with the store, which is how a daemon
//! picks up monitors edited by another process.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, instrument, warn};

use crate::actors::alert::AlertHandle;
use crate::actors::messages::MonitorCommand;
use crate::actors::monitor::{MonitorHandle, TaskSetup, request_check};
use crate::alerts::Notifier;
use crate::config::EngineConfig;
use crate::monitors::probe::{HttpProbe, Probe, ProbeTarget};
use crate::monitors::status::MonitorStatus;
use crate::monitors::tracker::{Cooldown, Evaluation, StatusTracker};
use crate::storage::schema::{Monitor, MonitorId};
use crate::storage::{RecordStore, StorageError};

/// Errors returned by scheduler operations
#[derive(Debug)]
pub enum SchedulerError {
    /// The enabled monitors could not be loaded at startup
    Startup(StorageError),

    /// The monitors could not be reloaded for reconciliation
    Sync(StorageError),

    /// The scheduler has been stopped
    Stopped,

    AlreadyStarted,

    /// No task is running for this monitor
    NotTracked(MonitorId),

    /// The monitor's task exited before answering
    TaskGone(MonitorId),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Startup(err) => write!(f, "failed to load monitors: {}", err),
            SchedulerError::Sync(err) => write!(f, "failed to reload monitors: {}", err),
            SchedulerError::Stopped => write!(f, "scheduler is stopped"),
            SchedulerError::AlreadyStarted => write!(f, "scheduler is already started"),
            SchedulerError::NotTracked(id) => write!(f, "monitor {} is not scheduled", id),
            SchedulerError::TaskGone(id) => write!(f, "task of monitor {} has exited", id),
        }
    }
}

impl std::error::Error for SchedulerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchedulerError::Startup(err) | SchedulerError::Sync(err) => Some(err),
            _ => None,
        }
    }
}

/// What a call to [`Scheduler::sync`] changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.updated == 0 && self.removed == 0
    }
}

struct MonitorSlot {
    handle: MonitorHandle,
    /// Settings the task was started with
    monitor: Monitor,
    generation: u64,
    status: MonitorStatus,
    cooldown: Cooldown,
}

/// Running tasks keyed by monitor id
///
/// All access goes through these methods; none of them holds the lock
/// across an await on a monitor task.
#[derive(Default)]
pub(crate) struct Registry {
    slots: RwLock<HashMap<MonitorId, MonitorSlot>>,
}

impl Registry {
    async fn insert(&self, id: MonitorId, slot: MonitorSlot) -> Option<MonitorSlot> {
        self.slots.write().await.insert(id, slot)
    }

    async fn take(&self, id: MonitorId) -> Option<MonitorSlot> {
        self.slots.write().await.remove(&id)
    }

    async fn drain(&self) -> Vec<MonitorSlot> {
        self.slots.write().await.drain().map(|(_, slot)| slot).collect()
    }

    async fn snapshot(&self) -> HashMap<MonitorId, MonitorStatus> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, slot.status))
            .collect()
    }

    async fn settings(&self) -> HashMap<MonitorId, Monitor> {
        self.slots
            .read()
            .await
            .iter()
            .map(|(id, slot)| (*id, slot.monitor.clone()))
            .collect()
    }

    async fn contains(&self, id: MonitorId) -> bool {
        self.slots.read().await.contains_key(&id)
    }

    async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    async fn last_notified(&self, id: MonitorId) -> Option<DateTime<Utc>> {
        self.slots
            .read()
            .await
            .get(&id)
            .and_then(|slot| slot.cooldown.last_notified())
    }

    async fn commands(&self, id: MonitorId) -> Option<mpsc::Sender<MonitorCommand>> {
        self.slots.read().await.get(&id).map(|slot| slot.handle.commands())
    }

    /// Store the state reported by a task, ignored for replaced tasks
    pub(crate) async fn record(
        &self,
        id: MonitorId,
        generation: u64,
        status: MonitorStatus,
        cooldown: Cooldown,
    ) {
        if let Some(slot) = self
            .slots
            .write()
            .await
            .get_mut(&id)
            .filter(|slot| slot.generation == generation)
        {
            slot.status = status;
            slot.cooldown = cooldown;
        }
    }
}

/// Runs the periodic checks of every enabled monitor
pub struct Scheduler {
    store: Arc<dyn RecordStore>,
    probe: Arc<dyn Probe>,
    tracker: Arc<StatusTracker>,
    engine: EngineConfig,
    registry: Arc<Registry>,
    shutdown: CancellationToken,
    /// Every monitor task, also the ones already taken out of the registry
    tasks: TaskTracker,
    started: AtomicBool,
    generation: AtomicU64,
}

impl Scheduler {
    /// Scheduler probing over HTTP with the engine's user agent
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        engine: EngineConfig,
    ) -> Result<Self, reqwest::Error> {
        let probe = HttpProbe::new(&engine.user_agent)?;
        Ok(Self::with_probe(store, Arc::new(probe), notifier, engine))
    }

    /// Scheduler with a custom probe
    ///
    /// Spawns the alert actor delivering to `notifier`, so this must be
    /// called within a tokio runtime.
    pub fn with_probe(
        store: Arc<dyn RecordStore>,
        probe: Arc<dyn Probe>,
        notifier: Arc<dyn Notifier>,
        engine: EngineConfig,
    ) -> Self {
        let alerts = Arc::new(AlertHandle::spawn(notifier));
        let tracker = Arc::new(StatusTracker::new(store.clone(), alerts, &engine));

        Self {
            store,
            probe,
            tracker,
            engine,
            registry: Arc::new(Registry::default()),
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            started: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }

    /// Load every enabled monitor from the store and start its task
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyStarted);
        }

        let monitors = match self.store.list_enabled_monitors().await {
            Ok(monitors) => monitors,
            Err(e) => {
                self.started.store(false, Ordering::SeqCst);
                return Err(SchedulerError::Startup(e));
            }
        };

        info!("starting {} monitors", monitors.len());
        for monitor in monitors {
            self.add(monitor).await?;
        }
        Ok(())
    }

    /// Cancel every task and wait until all of them have exited
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.shutdown.cancel();
        self.tasks.close();

        let slots = self.registry.drain().await;
        info!("stopping {} monitors", slots.len());

        join_all(slots.into_iter().map(|slot| slot.handle.join())).await;

        // tasks a concurrent remove or update took out of the registry
        self.tasks.wait().await;
        debug!("all monitor tasks exited");
    }

    /// Start checking `monitor`, replacing any task already running for it
    ///
    /// The first check runs immediately. Disabled monitors are only removed.
    #[instrument(skip(self, monitor), fields(monitor = monitor.id))]
    pub async fn add(&self, monitor: Monitor) -> Result<(), SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }

        let cooldown = self.detach(monitor.id).await;
        if !monitor.enabled {
            debug!("monitor {} is disabled, not scheduling", monitor.id);
            return Ok(());
        }

        self.spawn(monitor, cooldown.unwrap_or_default()).await
    }

    /// Stop checking a monitor; returns false if it was not scheduled
    ///
    /// Once this returns, no further check result is recorded for `id`.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: MonitorId) -> bool {
        self.detach(id).await.is_some()
    }

    /// Apply a changed monitor: remove then add, keeping the cooldown
    #[instrument(skip(self, monitor), fields(monitor = monitor.id))]
    pub async fn update(&self, monitor: Monitor) -> Result<(), SchedulerError> {
        self.add(monitor).await
    }

    /// Bring the running tasks in line with the monitors in the store
    ///
    /// New enabled monitors are added, edited ones restarted with their
    /// cooldown, and disabled or deleted ones removed. Monitors that were
    /// added without being stored are removed as well.
    #[instrument(skip(self))]
    pub async fn sync(&self) -> Result<SyncReport, SchedulerError> {
        if self.shutdown.is_cancelled() {
            return Err(SchedulerError::Stopped);
        }

        let monitors = self.store.list_monitors().await.map_err(SchedulerError::Sync)?;
        let scheduled = self.registry.settings().await;
        let mut report = SyncReport::default();
        let mut stored = HashSet::with_capacity(monitors.len());

        for monitor in monitors {
            stored.insert(monitor.id);
            match scheduled.get(&monitor.id) {
                None if monitor.enabled => {
                    self.add(monitor).await?;
                    report.added += 1;
                }
                None => {}
                Some(_) if !monitor.enabled => {
                    if self.remove(monitor.id).await {
                        report.removed += 1;
                    }
                }
                Some(running) if !running.same_settings(&monitor) => {
                    self.update(monitor).await?;
                    report.updated += 1;
                }
                Some(_) => {}
            }
        }

        for id in scheduled.keys().filter(|id| !stored.contains(*id)) {
            if self.remove(*id).await {
                report.removed += 1;
            }
        }

        if !report.is_empty() {
            info!(
                "synced monitors: {} added, {} updated, {} removed",
                report.added, report.updated, report.removed
            );
        }
        Ok(report)
    }

    /// Current status of every scheduled monitor
    pub async fn status_snapshot(&self) -> HashMap<MonitorId, MonitorStatus> {
        self.registry.snapshot().await
    }

    /// Run a check of `id` now, in line with its scheduled checks
    pub async fn check_now(&self, id: MonitorId) -> Result<Evaluation, SchedulerError> {
        let sender = self
            .registry
            .commands(id)
            .await
            .ok_or(SchedulerError::NotTracked(id))?;

        request_check(&sender)
            .await
            .ok_or(SchedulerError::TaskGone(id))
    }

    pub async fn is_scheduled(&self, id: MonitorId) -> bool {
        self.registry.contains(id).await
    }

    pub async fn scheduled_count(&self) -> usize {
        self.registry.len().await
    }

    /// When the last down notification for `id` went out
    pub async fn last_notified(&self, id: MonitorId) -> Option<DateTime<Utc>> {
        self.registry.last_notified(id).await
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Take a task out of the registry and wait for it to exit
    async fn detach(&self, id: MonitorId) -> Option<Cooldown> {
        let slot = self.registry.take(id).await?;
        let fallback = slot.cooldown;

        debug!("stopping task of monitor {id}");
        Some(slot.handle.shutdown().await.unwrap_or(fallback))
    }

    async fn spawn(&self, monitor: Monitor, cooldown: Cooldown) -> Result<(), SchedulerError> {
        let id = monitor.id;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst);
        let status = monitor.status;

        let setup = TaskSetup {
            target: ProbeTarget::from_monitor(&monitor, &self.engine),
            period: self.engine.check_interval(monitor.check_interval),
            monitor: monitor.clone(),
            generation,
            cooldown,
        };

        let handle = MonitorHandle::spawn(
            setup,
            self.probe.clone(),
            self.tracker.clone(),
            self.registry.clone(),
            &self.tasks,
            self.shutdown.child_token(),
        );

        let slot = MonitorSlot {
            handle,
            monitor,
            generation,
            status,
            cooldown,
        };

        if let Some(previous) = self.registry.insert(id, slot).await {
            warn!("monitor {id} was scheduled concurrently, stopping the older task");
            previous.handle.shutdown().await;
        }

        // lost a race with stop(); the task's token is already cancelled
        if self.shutdown.is_cancelled() {
            if let Some(slot) = self.registry.take(id).await {
                slot.handle.join().await;
            }
            return Err(SchedulerError::Stopped);
        }

        Ok(())
    }
}
