//! Record store trait definition
//!
//! This module defines the `RecordStore` trait that all storage
//! implementations must implement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::StorageResult;
use super::schema::{CheckResult, CheckStats, Incident, Monitor, MonitorId, NewMonitor};

/// Trait for record stores backing the check engine
///
/// The store owns three kinds of records:
///
/// - **Monitors**: full CRUD, deleting a monitor cascades to its check
///   results and incidents
/// - **Check results**: append-only, queried by recency or time window
/// - **Incidents**: opened, updated in place while active, resolved once
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; every monitor task talks to the
/// same store concurrently. No cross-monitor transactions are required.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Lookups that find nothing return
/// `Ok(None)`; updates of records that do not exist return
/// `StorageError::NotFound`.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ========================================================================
    // Monitors
    // ========================================================================

    /// Insert a monitor and return the stored record (with its id)
    async fn create_monitor(&self, monitor: NewMonitor) -> StorageResult<Monitor>;

    async fn get_monitor(&self, id: MonitorId) -> StorageResult<Option<Monitor>>;

    async fn get_monitor_by_url(&self, url: &str) -> StorageResult<Option<Monitor>>;

    /// All monitors ordered by id
    async fn list_monitors(&self) -> StorageResult<Vec<Monitor>>;

    /// Enabled monitors ordered by id
    async fn list_enabled_monitors(&self) -> StorageResult<Vec<Monitor>>;

    /// Overwrite every field of the stored monitor with `monitor`
    async fn update_monitor(&self, monitor: &Monitor) -> StorageResult<()>;

    /// Write only the check-derived fields: status, consecutive failures
    /// and last check time. Configuration edits made elsewhere are kept.
    async fn record_monitor_state(&self, monitor: &Monitor) -> StorageResult<()>;

    async fn set_monitor_enabled(&self, id: MonitorId, enabled: bool) -> StorageResult<()>;

    /// Delete a monitor together with its check results and incidents
    async fn delete_monitor(&self, id: MonitorId) -> StorageResult<()>;

    // ========================================================================
    // Check results
    // ========================================================================

    /// Append a check result, returning the id assigned to it
    async fn insert_check_result(&self, result: &CheckResult) -> StorageResult<i64>;

    /// The `limit` most recent check results, newest first
    async fn recent_check_results(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<CheckResult>>;

    /// Every check result created at or after `since`, oldest first
    async fn check_results_since(
        &self,
        monitor_id: MonitorId,
        since: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>>;

    /// Count and average latency of the check results since `since`
    async fn check_stats(
        &self,
        monitor_id: MonitorId,
        since: DateTime<Utc>,
    ) -> StorageResult<CheckStats>;

    // ========================================================================
    // Incidents
    // ========================================================================

    /// Open a new incident for a monitor
    async fn create_incident(
        &self,
        monitor_id: MonitorId,
        started_at: DateTime<Utc>,
        error_message: &str,
    ) -> StorageResult<Incident>;

    /// The unresolved incident of a monitor, if any
    async fn active_incident(&self, monitor_id: MonitorId) -> StorageResult<Option<Incident>>;

    /// Set the resolution timestamp of an incident
    async fn resolve_incident(&self, id: i64, resolved_at: DateTime<Utc>) -> StorageResult<()>;

    /// Overwrite the mutable fields (error text, flags, resolution) of an incident
    async fn update_incident(&self, incident: &Incident) -> StorageResult<()>;

    /// The `limit` most recent incidents of a monitor, newest first
    async fn recent_incidents(
        &self,
        monitor_id: MonitorId,
        limit: usize,
    ) -> StorageResult<Vec<Incident>>;

    /// The `limit` most recent incidents across all monitors, newest first
    async fn all_recent_incidents(&self, limit: usize) -> StorageResult<Vec<Incident>>;

    /// Close the store and release resources
    async fn close(&self) -> StorageResult<()>;
}
