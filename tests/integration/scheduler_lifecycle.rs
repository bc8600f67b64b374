//! Integration tests for the scheduler
//!
//! These tests verify that:
//! - Monitors are checked against real HTTP endpoints on their own interval
//! - Removing a monitor stops its checks once `remove` returns
//! - `stop` waits for every task, after which nothing is recorded
//! - A failing store at startup aborts `start`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use uptime_monitoring::config::EngineConfig;
use uptime_monitoring::monitors::status::MonitorStatus;
use uptime_monitoring::scheduler::{Scheduler, SchedulerError};
use uptime_monitoring::storage::{
    CheckResult, CheckStats, Incident, MemoryBackend, Monitor, MonitorId, NewMonitor, RecordStore,
    StorageError, StorageResult,
};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::{RecordingNotifier, ScriptedProbe, create_monitor, down, up, wait_until};

async fn healthy_server() -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_monitor_checked_on_interval() {
    let mock_server = healthy_server().await;
    let store = Arc::new(MemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let monitor = store
        .create_monitor(NewMonitor::new(mock_server.uri()).check_interval(1))
        .await
        .unwrap();

    let scheduler = Scheduler::new(store.clone(), notifier, EngineConfig::default()).unwrap();
    scheduler.start().await.unwrap();

    // immediate first check, then one per second
    wait_until(Duration::from_secs(5), || async {
        store.check_result_count().await >= 2
    })
    .await;

    assert_eq!(
        scheduler.status_snapshot().await.get(&monitor.id),
        Some(&MonitorStatus::Up)
    );
    let stored = store.get_monitor(monitor.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MonitorStatus::Up);
    assert!(stored.last_check_at.is_some());

    scheduler.stop().await;
}

#[tokio::test]
async fn test_removed_monitor_records_nothing_more() {
    let mock_server = healthy_server().await;
    let store = Arc::new(MemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = Scheduler::new(store.clone(), notifier, EngineConfig::default()).unwrap();

    let monitor = store
        .create_monitor(NewMonitor::new(mock_server.uri()).check_interval(1))
        .await
        .unwrap();
    scheduler.add(monitor.clone()).await.unwrap();

    wait_until(Duration::from_secs(5), || async {
        store.check_result_count().await >= 1
    })
    .await;

    assert!(scheduler.remove(monitor.id).await);
    let after_remove = store.check_result_count().await;
    assert!(scheduler.status_snapshot().await.is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.check_result_count().await, after_remove);
}

#[tokio::test]
async fn test_stop_is_a_barrier() {
    let store = Arc::new(MemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let probe = Arc::new(ScriptedProbe::new(up()));
    let scheduler = Scheduler::with_probe(
        store.clone(),
        probe,
        notifier,
        EngineConfig::default(),
    );

    for i in 0..5 {
        let monitor = store
            .create_monitor(NewMonitor::new(format!("https://{i}.test")).check_interval(1))
            .await
            .unwrap();
        scheduler.add(monitor).await.unwrap();
    }

    wait_until(Duration::from_secs(5), || async {
        store.check_result_count().await >= 5
    })
    .await;

    scheduler.stop().await;
    let after_stop = store.check_result_count().await;
    assert_eq!(scheduler.scheduled_count().await, 0);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(store.check_result_count().await, after_stop);
}

#[tokio::test]
async fn test_check_now_through_scheduler() {
    let store = Arc::new(MemoryBackend::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let probe = Arc::new(ScriptedProbe::new(up()));
    let scheduler = Scheduler::with_probe(
        store.clone(),
        probe.clone(),
        notifier.clone(),
        EngineConfig::default(),
    );

    let monitor = create_monitor(store.as_ref(), "https://a.test").await;
    scheduler.add(monitor.clone()).await.unwrap();

    for _ in 0..3 {
        probe.push(down());
    }
    // the immediate check may or may not have consumed a scripted failure,
    // so keep checking until the monitor is down
    let mut status = MonitorStatus::Unknown;
    for _ in 0..4 {
        status = scheduler.check_now(monitor.id).await.unwrap().current;
        if status == MonitorStatus::Down {
            break;
        }
    }
    assert_eq!(status, MonitorStatus::Down);

    let eval = scheduler.check_now(monitor.id).await.unwrap();
    assert_eq!(eval.current, MonitorStatus::Up);

    // delivery happens on the alert actor, after check_now returned
    wait_until(Duration::from_secs(2), || async { notifier.recoveries() == 1 }).await;
    assert_eq!(notifier.downs(), 1);

    scheduler.stop().await;
}

/// Store whose monitor listing always fails
struct BrokenStore;

#[async_trait]
impl RecordStore for BrokenStore {
    async fn create_monitor(&self, _monitor: NewMonitor) -> StorageResult<Monitor> {
        Err(StorageError::ConnectionFailed("offline".to_string()))
    }
    async fn get_monitor(&self, _id: MonitorId) -> StorageResult<Option<Monitor>> {
        Ok(None)
    }
    async fn get_monitor_by_url(&self, _url: &str) -> StorageResult<Option<Monitor>> {
        Ok(None)
    }
    async fn list_monitors(&self) -> StorageResult<Vec<Monitor>> {
        Err(StorageError::ConnectionFailed("offline".to_string()))
    }
    async fn list_enabled_monitors(&self) -> StorageResult<Vec<Monitor>> {
        Err(StorageError::ConnectionFailed("offline".to_string()))
    }
    async fn update_monitor(&self, _monitor: &Monitor) -> StorageResult<()> {
        Ok(())
    }
    async fn record_monitor_state(&self, _monitor: &Monitor) -> StorageResult<()> {
        Err(StorageError::QueryFailed("offline".to_string()))
    }
    async fn set_monitor_enabled(&self, _id: MonitorId, _enabled: bool) -> StorageResult<()> {
        Ok(())
    }
    async fn delete_monitor(&self, _id: MonitorId) -> StorageResult<()> {
        Ok(())
    }
    async fn insert_check_result(&self, _result: &CheckResult) -> StorageResult<i64> {
        Ok(0)
    }
    async fn recent_check_results(
        &self,
        _monitor_id: MonitorId,
        _limit: usize,
    ) -> StorageResult<Vec<CheckResult>> {
        Ok(Vec::new())
    }
    async fn check_results_since(
        &self,
        _monitor_id: MonitorId,
        _since: DateTime<Utc>,
    ) -> StorageResult<Vec<CheckResult>> {
        Ok(Vec::new())
    }
    async fn check_stats(
        &self,
        _monitor_id: MonitorId,
        _since: DateTime<Utc>,
    ) -> StorageResult<CheckStats> {
        Ok(CheckStats::default())
    }
    async fn create_incident(
        &self,
        _monitor_id: MonitorId,
        _started_at: DateTime<Utc>,
        _error_message: &str,
    ) -> StorageResult<Incident> {
        Err(StorageError::QueryFailed("offline".to_string()))
    }
    async fn active_incident(&self, _monitor_id: MonitorId) -> StorageResult<Option<Incident>> {
        Ok(None)
    }
    async fn resolve_incident(&self, _id: i64, _resolved_at: DateTime<Utc>) -> StorageResult<()> {
        Ok(())
    }
    async fn update_incident(&self, _incident: &Incident) -> StorageResult<()> {
        Ok(())
    }
    async fn recent_incidents(
        &self,
        _monitor_id: MonitorId,
        _limit: usize,
    ) -> StorageResult<Vec<Incident>> {
        Ok(Vec::new())
    }
    async fn all_recent_incidents(&self, _limit: usize) -> StorageResult<Vec<Incident>> {
        Ok(Vec::new())
    }
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_start_fails_when_monitors_cannot_be_loaded() {
    let notifier = Arc::new(RecordingNotifier::default());
    let scheduler = Scheduler::with_probe(
        Arc::new(BrokenStore),
        Arc::new(ScriptedProbe::new(up())),
        notifier,
        EngineConfig::default(),
    );

    let result = scheduler.start().await;
    assert_matches!(result, Err(SchedulerError::Startup(StorageError::ConnectionFailed(_))));
    assert_eq!(scheduler.scheduled_count().await, 0);
}

#[tokio::test]
async fn test_persistence_errors_do_not_stop_checks() {
    let notifier = Arc::new(RecordingNotifier::default());
    let probe = Arc::new(ScriptedProbe::new(down()));
    let scheduler = Scheduler::with_probe(
        Arc::new(BrokenStore),
        probe,
        notifier.clone(),
        EngineConfig::default(),
    );

    let monitor = NewMonitor::new("https://a.test").into_monitor(1, Utc::now());
    scheduler.add(monitor).await.unwrap();

    let mut last = None;
    for _ in 0..3 {
        last = Some(scheduler.check_now(1).await.unwrap());
    }

    // no incident could be stored, but the state machine still advanced
    assert_eq!(last.unwrap().current, MonitorStatus::Down);
    wait_until(Duration::from_secs(2), || async { notifier.downs() == 1 }).await;

    scheduler.stop().await;
}
