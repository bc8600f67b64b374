//! Helper functions for integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use uptime_monitoring::alerts::Notifier;
use uptime_monitoring::monitors::probe::{Probe, ProbeFailure, ProbeOutcome, ProbeTarget};
use uptime_monitoring::storage::{Monitor, NewMonitor, RecordStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Down {
        name: String,
        url: String,
        error: String,
    },
    Recovery {
        name: String,
        url: String,
    },
}

/// Notifier that records every call
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn downs(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Down { .. }))
            .count()
    }

    pub fn recoveries(&self) -> usize {
        self.sent()
            .iter()
            .filter(|s| matches!(s, Sent::Recovery { .. }))
            .count()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_down(&self, name: &str, url: &str, error: &str) {
        self.sent.lock().unwrap().push(Sent::Down {
            name: name.to_string(),
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    async fn notify_recovery(&self, name: &str, url: &str) {
        self.sent.lock().unwrap().push(Sent::Recovery {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
}

/// Probe that replays queued outcomes, then keeps answering with a fallback
pub struct ScriptedProbe {
    queue: Mutex<VecDeque<ProbeOutcome>>,
    fallback: ProbeOutcome,
}

impl ScriptedProbe {
    pub fn new(fallback: ProbeOutcome) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
        }
    }

    pub fn push(&self, outcome: ProbeOutcome) {
        self.queue.lock().unwrap().push_back(outcome);
    }
}

#[async_trait]
impl Probe for ScriptedProbe {
    async fn execute(&self, _target: &ProbeTarget) -> ProbeOutcome {
        self.queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

pub fn up() -> ProbeOutcome {
    ProbeOutcome::Success {
        status_code: 200,
        latency_ms: 20,
    }
}

pub fn down() -> ProbeOutcome {
    ProbeOutcome::Failure {
        status_code: 0,
        reason: ProbeFailure::Connection("connection refused".to_string()),
    }
}

pub async fn create_monitor(store: &dyn RecordStore, url: &str) -> Monitor {
    store
        .create_monitor(NewMonitor::new(url).name(format!("test {url}")))
        .await
        .unwrap()
}

/// Poll `condition` every 10ms until it holds, panicking after `timeout`
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within {timeout:?}");
}
