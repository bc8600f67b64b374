//! Status tracker - turns probe outcomes into monitor state
//!
//! Applies the failure-threshold hysteresis over `unknown → up → down`,
//! opens and resolves incidents, and decides when notifications go out.
//!
//! ```text
//!            success                      fails ≥ threshold
//! unknown ──────────────▶ up ───────────────────────────────▶ down
//!    │                    ▲                                    │
//!    └── fails ≥ threshold┼──────────────▶ down                │
//!                         └──────────── success ───────────────┘
//! ```
//!
//! Persistence is best-effort: store errors are logged and the in-memory
//! monitor still advances, so a failing store never stops future checks.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info, instrument, warn};

use crate::alerts::Notifier;
use crate::config::EngineConfig;
use crate::storage::schema::{CheckResult, Monitor};
use crate::storage::RecordStore;

use super::probe::ProbeOutcome;
use super::status::MonitorStatus;

/// Per-monitor gate for down notifications
///
/// Owned by the scheduler so it outlives a single monitor task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cooldown {
    last_notified: Option<DateTime<Utc>>,
}

impl Cooldown {
    pub fn last_notified(&self) -> Option<DateTime<Utc>> {
        self.last_notified
    }

    /// Take the gate if at least `window` passed since the last notification.
    pub fn try_acquire(&mut self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_notified {
            Some(last) if now - last < window => false,
            _ => {
                self.last_notified = Some(now);
                true
            }
        }
    }
}

/// What happened to the monitor's incidents during one evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentEffect {
    None,
    Opened(i64),
    /// Error text of the active incident was replaced
    Refreshed(i64),
    Resolved(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEffect {
    None,
    DownSent,
    /// A down notification was due but the cooldown was still running
    DownSuppressed,
    RecoverySent,
}

/// Result of evaluating one probe outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub previous: MonitorStatus,
    pub current: MonitorStatus,
    pub consecutive_fails: u32,
    pub incident: IncidentEffect,
    pub notification: NotificationEffect,
}

impl Evaluation {
    pub fn status_changed(&self) -> bool {
        self.previous != self.current
    }
}

pub struct StatusTracker {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn Notifier>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl StatusTracker {
    pub fn new(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        engine: &EngineConfig,
    ) -> Self {
        Self::with_policy(
            store,
            notifier,
            engine.failure_threshold(),
            engine.notification_cooldown(),
        )
    }

    pub fn with_policy(
        store: Arc<dyn RecordStore>,
        notifier: Arc<dyn Notifier>,
        failure_threshold: u32,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Apply `outcome` to `monitor` and persist every resulting change
    ///
    /// `cooldown` is the monitor's down-notification gate; recovery
    /// notifications never consult it.
    #[instrument(skip_all, fields(monitor = monitor.id, success = outcome.is_success()))]
    pub async fn evaluate(
        &self,
        monitor: &mut Monitor,
        outcome: &ProbeOutcome,
        now: DateTime<Utc>,
        cooldown: &mut Cooldown,
    ) -> Evaluation {
        let previous = monitor.status;

        let result = CheckResult {
            id: 0,
            monitor_id: monitor.id,
            created_at: now,
            status_code: outcome.status_code(),
            response_time_ms: outcome.latency_ms(),
            success: outcome.is_success(),
            error_message: outcome.error_text(),
        };
        if let Err(e) = self.store.insert_check_result(&result).await {
            error!("failed to record check result for monitor {}: {e}", monitor.id);
        }

        monitor.last_check_at = Some(now);

        let (incident, notification) = if outcome.is_success() {
            self.on_success(monitor, now).await
        } else {
            self.on_failure(monitor, &result.error_message, now, cooldown)
                .await
        };

        if let Err(e) = self.store.record_monitor_state(monitor).await {
            error!("failed to persist state of monitor {}: {e}", monitor.id);
        }

        let evaluation = Evaluation {
            previous,
            current: monitor.status,
            consecutive_fails: monitor.consecutive_fails,
            incident,
            notification,
        };
        if evaluation.status_changed() {
            info!(
                "monitor {} ({}) changed from {} to {}",
                monitor.id, monitor.name, previous, monitor.status
            );
        }
        evaluation
    }

    async fn on_success(
        &self,
        monitor: &mut Monitor,
        now: DateTime<Utc>,
    ) -> (IncidentEffect, NotificationEffect) {
        let was_down = monitor.status == MonitorStatus::Down;
        monitor.status = MonitorStatus::Up;
        monitor.consecutive_fails = 0;

        if !was_down {
            return (IncidentEffect::None, NotificationEffect::None);
        }

        let mut incident = match self.store.active_incident(monitor.id).await {
            Ok(Some(incident)) => incident,
            Ok(None) => {
                warn!("monitor {} recovered without an active incident", monitor.id);
                return (IncidentEffect::None, NotificationEffect::None);
            }
            Err(e) => {
                error!("failed to load active incident of monitor {}: {e}", monitor.id);
                return (IncidentEffect::None, NotificationEffect::None);
            }
        };

        if let Err(e) = self.store.resolve_incident(incident.id, now).await {
            error!("failed to resolve incident {}: {e}", incident.id);
        }
        incident.resolved_at = Some(now);
        info!("incident {} of monitor {} resolved", incident.id, monitor.id);

        if incident.recovery_notified {
            return (IncidentEffect::Resolved(incident.id), NotificationEffect::None);
        }

        self.notifier
            .notify_recovery(&monitor.name, &monitor.url)
            .await;
        incident.recovery_notified = true;
        if let Err(e) = self.store.update_incident(&incident).await {
            error!("failed to flag recovery of incident {}: {e}", incident.id);
        }

        (
            IncidentEffect::Resolved(incident.id),
            NotificationEffect::RecoverySent,
        )
    }

    async fn on_failure(
        &self,
        monitor: &mut Monitor,
        error_text: &str,
        now: DateTime<Utc>,
        cooldown: &mut Cooldown,
    ) -> (IncidentEffect, NotificationEffect) {
        monitor.consecutive_fails = monitor.consecutive_fails.saturating_add(1);

        if monitor.consecutive_fails < self.failure_threshold {
            debug!(
                "monitor {} failed {}/{} checks: {error_text}",
                monitor.id, monitor.consecutive_fails, self.failure_threshold
            );
            return (IncidentEffect::None, NotificationEffect::None);
        }

        let was_down = monitor.status == MonitorStatus::Down;
        monitor.status = MonitorStatus::Down;

        let (effect, mut incident) = if was_down {
            match self.store.active_incident(monitor.id).await {
                Ok(Some(mut incident)) => {
                    incident.error_message = error_text.to_string();
                    if let Err(e) = self.store.update_incident(&incident).await {
                        error!("failed to refresh incident {}: {e}", incident.id);
                    }
                    (IncidentEffect::Refreshed(incident.id), Some(incident))
                }
                Ok(None) => {
                    warn!("monitor {} is down without an active incident, opening one", monitor.id);
                    self.open_incident(monitor, error_text, now).await
                }
                Err(e) => {
                    error!("failed to load active incident of monitor {}: {e}", monitor.id);
                    (IncidentEffect::None, None)
                }
            }
        } else {
            self.open_incident(monitor, error_text, now).await
        };

        if !cooldown.try_acquire(now, self.cooldown) {
            debug!("down notification for monitor {} suppressed by cooldown", monitor.id);
            return (effect, NotificationEffect::DownSuppressed);
        }

        self.notifier
            .notify_down(&monitor.name, &monitor.url, error_text)
            .await;

        if let Some(incident) = incident.as_mut().filter(|incident| !incident.notified) {
            incident.notified = true;
            if let Err(e) = self.store.update_incident(incident).await {
                error!("failed to flag notification of incident {}: {e}", incident.id);
            }
        }

        (effect, NotificationEffect::DownSent)
    }

    async fn open_incident(
        &self,
        monitor: &Monitor,
        error_text: &str,
        now: DateTime<Utc>,
    ) -> (IncidentEffect, Option<crate::storage::Incident>) {
        match self.store.create_incident(monitor.id, now, error_text).await {
            Ok(incident) => {
                info!(
                    "monitor {} ({}) is down, opened incident {}: {error_text}",
                    monitor.id, monitor.name, incident.id
                );
                (IncidentEffect::Opened(incident.id), Some(incident))
            }
            Err(e) => {
                error!("failed to open incident for monitor {}: {e}", monitor.id);
                (IncidentEffect::None, None)
            }
        }
    }
}
