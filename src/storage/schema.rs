//! Records kept by the record store
//!
//! - [`Monitor`]: a configured endpoint plus its derived state
//! - [`CheckResult`]: one row per executed probe, append-only
//! - [`Incident`]: one row per down period, resolved exactly once
//!
//! Timestamps are always UTC. The SQLite backend stores them as Unix
//! milliseconds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitors::criteria::{ExpectedCodes, Keywords};
use crate::monitors::status::MonitorStatus;

/// Identifier assigned by the store
pub type MonitorId = i64;

/// A monitored endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: MonitorId,
    pub name: String,
    pub url: String,

    /// Seconds between checks as configured (normalized when scheduled)
    pub check_interval: i64,

    /// Request timeout in seconds as configured (normalized when probing)
    pub timeout: i64,

    pub expected_codes: ExpectedCodes,
    pub keywords: Keywords,
    pub enabled: bool,

    // === Derived state, written back after every evaluation ===
    pub status: MonitorStatus,
    pub consecutive_fails: u32,
    pub last_check_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Whether both records configure the same check, ignoring derived state
    pub fn same_settings(&self, other: &Monitor) -> bool {
        self.name == other.name
            && self.url == other.url
            && self.check_interval == other.check_interval
            && self.timeout == other.timeout
            && self.expected_codes == other.expected_codes
            && self.keywords == other.keywords
            && self.enabled == other.enabled
    }
}

/// Payload for creating a monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMonitor {
    pub name: String,
    pub url: String,
    pub check_interval: i64,
    pub timeout: i64,
    pub expected_codes: ExpectedCodes,
    pub keywords: Keywords,
    pub enabled: bool,
}

impl NewMonitor {
    /// Enabled monitor with default interval, timeout and criteria
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            name: url.clone(),
            url,
            check_interval: crate::config::DEFAULT_CHECK_INTERVAL as i64,
            timeout: crate::config::DEFAULT_TIMEOUT as i64,
            expected_codes: ExpectedCodes::default(),
            keywords: Keywords::default(),
            enabled: true,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.name = name;
        }
        self
    }

    pub fn check_interval(mut self, secs: i64) -> Self {
        self.check_interval = secs;
        self
    }

    pub fn timeout(mut self, secs: i64) -> Self {
        self.timeout = secs;
        self
    }

    pub fn expected_codes(mut self, codes: ExpectedCodes) -> Self {
        self.expected_codes = codes;
        self
    }

    pub fn keywords(mut self, keywords: Keywords) -> Self {
        self.keywords = keywords;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Materialize the record the store will hold under `id`
    pub fn into_monitor(self, id: MonitorId, now: DateTime<Utc>) -> Monitor {
        let name = if self.name.trim().is_empty() {
            self.url.clone()
        } else {
            self.name
        };

        Monitor {
            id,
            name,
            url: self.url,
            check_interval: self.check_interval,
            timeout: self.timeout,
            expected_codes: self.expected_codes,
            keywords: self.keywords,
            enabled: self.enabled,
            status: MonitorStatus::Unknown,
            consecutive_fails: 0,
            last_check_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of one executed probe, never mutated after insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Assigned by the store; zero before insertion
    pub id: i64,
    pub monitor_id: MonitorId,
    pub created_at: DateTime<Utc>,

    /// HTTP status code, 0 when no response was received
    pub status_code: u16,

    /// Response latency, 0 for failed checks
    pub response_time_ms: u64,

    pub success: bool,

    /// Diagnostic text, empty for successful checks
    pub error_message: String,
}

/// A recorded downtime interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub monitor_id: MonitorId,
    pub started_at: DateTime<Utc>,

    /// `None` while the incident is active
    pub resolved_at: Option<DateTime<Utc>>,

    /// Latest diagnostic seen during the incident
    pub error_message: String,

    /// A down notification was delivered for this incident
    pub notified: bool,

    /// The recovery notification was delivered (at most once per incident)
    pub recovery_notified: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Incident {
    pub fn is_resolved(&self) -> bool {
        self.resolved_at.is_some()
    }

    /// Length of the incident; active incidents are measured up to `now`
    pub fn duration(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.resolved_at.unwrap_or(now) - self.started_at
    }
}

/// Aggregate over the check results of one monitor in a time window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckStats {
    pub total: u64,
    pub successful: u64,

    /// Average latency of successful checks in milliseconds
    pub avg_response_ms: f64,
}

impl CheckStats {
    /// Uptime % = (successful checks / total checks) × 100
    pub fn uptime_percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successful as f64 / self.total as f64 * 100.0
        }
    }
}
