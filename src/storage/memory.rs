//! In-memory record store (no persistence)
//!
//! This backend keeps every record in process memory. It's useful for:
//! - Testing without database dependencies
//! - Running with `"storage": { "backend": "none" }`
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Unbounded**: check results are never evicted

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::RecordStore;
use super::error::{StorageError, StorageResult};
use super::schema::{CheckResult, CheckStats, Incident, Monitor, MonitorId, NewMonitor};

#[derive(Debug, Default)]
struct MemoryState {
    monitors: BTreeMap<MonitorId, Monitor>,
    check_results: Vec<CheckResult>,
    incidents: Vec<Incident>,
    next_monitor_id: i64,
    next_check_id: i64,
    next_incident_id: i64,
}

/// In-memory record store
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored check results across all monitors
    pub async fn check_result_count(&self) -> usize {
        self.state.read().await.check_results.len()
    }
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[async_trait]
impl RecordStore for MemoryBackend {
    async fn create_monitor(&self, monitor: NewMonitor) -> StorageResult<Monitor> {
        let mut state = self.state.write().await;

        if state.monitors.values().any(|m| m.url == monitor.url) {
            return Err(StorageError::Conflict(format!(
                "monitor with url {} already exists",
                monitor.url
            )));
        }

        let id = next_id(&mut state.next_monitor_id);
        let monitor = monitor.into_monitor(id, Utc::now());
        state.monitors.insert(id, monitor.clone());

        debug!("in-memory backend: created monitor {id}");
        Ok(monitor)
    }

    async fn get_monitor(&self, id: MonitorId) -> StorageResult<Option<Monitor>> {
        Ok(self.state.read().await.monitors.get(&id).cloned())
    }

    async fn get_monitor_by_url(&self, url: &str) -> StorageResult<Option<Monitor>> {
        Ok(self
            .state
            .read()
            .await
            .monitors
            .values()
            .find(|m| m.url == url)
            .cloned())
    }

    async fn list_monitors(&self) -> StorageResult<Vec<Monitor>> {
        Ok(self.state.read().await.monitors.values().cloned().collect())
    }

    async fn list_enabled_monitors(&self) -> StorageResult<Vec<Monitor>> {
        Ok(self
            .state
            .read()
            .await
            .monitors
            .values()
            .filter(|m| m.enabled)
            .cloned()
            .collect())
    }

    async fn update_monitor(&self, monitor: &Monitor) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.monitors.get_mut(&monitor.id) else {
            return Err(StorageError::NotFound(format!("monitor {}", monitor.id)));
        };

        *stored = monitor.clone();
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn record_monitor_state(&self, monitor: &Monitor) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.monitors.get_mut(&monitor.id) else {
            return Err(StorageError::NotFound(format!("monitor {}", monitor.id)));
        };

        stored.status = monitor.status;
        stored.consecutive_fails = monitor.consecutive_fails;
        stored.last_check_at = monitor.last_check_at;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.monitors.get_mut(&id) else {
            return Err(StorageError::NotFound(format!("monitor {id}")));
        };

        stored.enabled = enabled;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_monitor(&self, id: MonitorId) -> StorageResult<()> {
        let mut state = self.state.write().await;
        state.check_results.retain(|c| c.monitor_id != id);
        state.incidents.retain(|i| i.monitor_id != id);

        match state.monitors.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(format!("monitor {id}"))),
        }
    }

    async fn insert_check_result(&self, result: &CheckResult) -> StorageResult<i64> {
        let mut state = self.state.write().await;
        let id = next_id(&mut state.next_check_id);
        state.check_results.push(CheckResult {
            id,
            ..result.clone()
        });
        Ok(id)
    }

    async fn recent_check_results(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<CheckResult>> {
        Ok(self
            .state
            .read()
            .await
            .check_results
            .iter()
            .rev()
            .filter(|c| c.monitor_id == monitor_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn check_results_since(
        &self,
        monitor_id: MonitorId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>> {
        Ok(self
            .state
            .read()
            .await
            .check_results
            .iter()
            .filter(|c| c.monitor_id == monitor_id && c.created_at >= since)
            .cloned()
            .collect())
    }

    async fn check_stats(
        &self,
        monitor_id: MonitorId,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckStats> {
        let state = self.state.read().await;
        let window: Vec<&CheckResult> = state
            .check_results
            .iter()
            .filter(|c| c.monitor_id == monitor_id && c.created_at >= since)
            .collect();

        let successful: Vec<&&CheckResult> = window.iter().filter(|c| c.success).collect();
        let avg_response_ms = if successful.is_empty() {
            0.0
        } else {
            successful
                .iter()
                .map(|c| c.response_time_ms as f64)
                .sum::<f64>()
                / successful.len() as f64
        };

        Ok(CheckStats {
            total: window.len() as u64,
            successful: successful.len() as u64,
            avg_response_ms,
        })
    }

    async fn create_incident(
        &self,
        monitor_id: MonitorId,
        started_at: DateTime<Utc>,
        error_message: &str,
    ) -> StorageResult<Incident> {
        let mut state = self.state.write().await;
        if state
            .incidents
            .iter()
            .any(|i| i.monitor_id == monitor_id && i.resolved_at.is_none())
        {
            return Err(StorageError::Conflict(format!(
                "monitor {monitor_id} already has an active incident"
            )));
        }

        let id = next_id(&mut state.next_incident_id);
        let now = Utc::now();
        let incident = Incident {
            id,
            monitor_id,
            started_at,
            resolved_at: None,
            error_message: error_message.to_string(),
            notified: false,
            recovery_notified: false,
            created_at: now,
            updated_at: now,
        };
        state.incidents.push(incident.clone());
        Ok(incident)
    }

    async fn active_incident(&self, monitor_id: MonitorId) -> StorageResult<Option<Incident>> {
        Ok(self
            .state
            .read()
            .await
            .incidents
            .iter()
            .find(|i| i.monitor_id == monitor_id && i.resolved_at.is_none())
            .cloned())
    }

    async fn resolve_incident(&self, id: i64, resolved_at: DateTime<Utc>) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.incidents.iter_mut().find(|i| i.id == id) else {
            return Err(StorageError::NotFound(format!("incident {id}")));
        };

        stored.resolved_at = Some(resolved_at);
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn update_incident(&self, incident: &Incident) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.incidents.iter_mut().find(|i| i.id == incident.id) else {
            return Err(StorageError::NotFound(format!("incident {}", incident.id)));
        };

        stored.resolved_at = incident.resolved_at;
        stored.error_message = incident.error_message.clone();
        stored.notified = incident.notified;
        stored.recovery_notified = incident.recovery_notified;
        stored.updated_at = Utc::now();
        Ok(())
    }

    async fn recent_incidents(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<Incident>> {
        let state = self.state.read().await;
        let mut incidents: Vec<Incident> = state
            .incidents
            .iter()
            .filter(|i| i.monitor_id == monitor_id)
            .cloned()
            .collect();
        incidents.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        incidents.truncate(limit);
        Ok(incidents)
    }

    async fn all_recent_incidents(&self, limit: usize) -> StorageResult<Vec<Incident>> {
        let state = self.state.read().await;
        let mut incidents = state.incidents.clone();
        incidents.sort_by(|a, b| b.started_at.cmp(&a.started_at).then(b.id.cmp(&a.id)));
        incidents.truncate(limit);
        Ok(incidents)
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}
