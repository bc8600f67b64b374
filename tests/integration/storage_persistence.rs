//! Integration tests for SQLite persistence
//!
//! These tests verify that:
//! - Tracker results survive a reopen of the database
//! - Incidents and flags are persisted
//! - The scheduler picks up enabled monitors from a reopened database
//! - Edits made through a second connection reach a running scheduler

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tempfile::TempDir;
use uptime_monitoring::config::EngineConfig;
use uptime_monitoring::monitors::status::MonitorStatus;
use uptime_monitoring::monitors::tracker::{Cooldown, StatusTracker};
use uptime_monitoring::scheduler::Scheduler;
use uptime_monitoring::storage::sqlite::SqliteBackend;
use uptime_monitoring::storage::{NewMonitor, RecordStore};

use crate::helpers::{RecordingNotifier, ScriptedProbe, down, up, wait_until};

#[tokio::test]
async fn test_incident_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("uptime.db");
    let notifier = Arc::new(RecordingNotifier::default());

    let monitor_id = {
        let store = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let tracker = StatusTracker::new(store.clone(), notifier.clone(), &EngineConfig::default());

        let mut monitor = store
            .create_monitor(NewMonitor::new("https://a.test").name("A"))
            .await
            .unwrap();
        let mut cooldown = Cooldown::default();
        for _ in 0..3 {
            tracker
                .evaluate(&mut monitor, &down(), Utc::now(), &mut cooldown)
                .await;
        }

        store.close().await.unwrap();
        monitor.id
    };

    let store = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let mut monitor = store.get_monitor(monitor_id).await.unwrap().unwrap();
    assert_eq!(monitor.status, MonitorStatus::Down);
    assert_eq!(monitor.consecutive_fails, 3);

    let incident = store.active_incident(monitor_id).await.unwrap().unwrap();
    assert!(incident.notified);
    assert_eq!(incident.error_message, "request failed: connection refused");
    assert_eq!(store.recent_check_results(monitor_id, 10).await.unwrap().len(), 3);

    // a fresh process recovers the incident it did not open
    let tracker = StatusTracker::new(store.clone(), notifier.clone(), &EngineConfig::default());
    tracker
        .evaluate(&mut monitor, &up(), Utc::now(), &mut Cooldown::default())
        .await;

    let incidents = store.recent_incidents(monitor_id, 10).await.unwrap();
    assert_eq!(incidents.len(), 1);
    assert!(incidents[0].is_resolved());
    assert!(incidents[0].recovery_notified);
    assert_eq!(notifier.recoveries(), 1);
}

#[tokio::test]
async fn test_scheduler_over_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(SqliteBackend::new(temp_dir.path().join("uptime.db")).await.unwrap());
    let notifier = Arc::new(RecordingNotifier::default());

    let enabled = store
        .create_monitor(NewMonitor::new("https://a.test").check_interval(1))
        .await
        .unwrap();
    let disabled = store
        .create_monitor(NewMonitor::new("https://b.test").enabled(false))
        .await
        .unwrap();

    let scheduler = Scheduler::with_probe(
        store.clone(),
        Arc::new(ScriptedProbe::new(up())),
        notifier,
        EngineConfig::default(),
    );
    scheduler.start().await.unwrap();

    wait_until(Duration::from_secs(5), || async {
        !store.recent_check_results(enabled.id, 1).await.unwrap().is_empty()
    })
    .await;
    scheduler.stop().await;

    let stats = store
        .check_stats(enabled.id, Utc::now() - chrono::Duration::hours(1))
        .await
        .unwrap();
    assert!(stats.total >= 1);
    assert_eq!(stats.uptime_percent(), 100.0);
    assert!(store.recent_check_results(disabled.id, 1).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_edits_from_another_connection_reach_scheduler() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("uptime.db");
    let daemon_store = Arc::new(SqliteBackend::new(&db_path).await.unwrap());

    let kept = daemon_store
        .create_monitor(NewMonitor::new("https://a.test").check_interval(1))
        .await
        .unwrap();

    let scheduler = Scheduler::with_probe(
        daemon_store.clone(),
        Arc::new(ScriptedProbe::new(up())),
        Arc::new(RecordingNotifier::default()),
        EngineConfig::default(),
    );
    scheduler.start().await.unwrap();

    // a second process adds one monitor and disables the other
    let cli_store = SqliteBackend::new(&db_path).await.unwrap();
    let added = cli_store
        .create_monitor(NewMonitor::new("https://b.test").check_interval(1))
        .await
        .unwrap();
    cli_store.set_monitor_enabled(kept.id, false).await.unwrap();

    let report = scheduler.sync().await.unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.removed, 1);
    assert!(scheduler.is_scheduled(added.id).await);
    assert!(!scheduler.is_scheduled(kept.id).await);

    // the disable survives the running checks
    wait_until(Duration::from_secs(5), || async {
        !cli_store.recent_check_results(added.id, 1).await.unwrap().is_empty()
    })
    .await;
    let stored = cli_store.get_monitor(kept.id).await.unwrap().unwrap();
    assert!(!stored.enabled);

    cli_store.delete_monitor(added.id).await.unwrap();
    assert_eq!(scheduler.sync().await.unwrap().removed, 1);
    assert_eq!(scheduler.scheduled_count().await, 0);

    scheduler.stop().await;
}
