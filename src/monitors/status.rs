use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::storage::schema::CheckResult;

/// Latency above which a successful check is shown as slow
pub const SLOW_RESPONSE_MS: u64 = 1000;

/// Derived availability of a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// No check has completed yet
    #[default]
    Unknown,
    Up,
    Down,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Unknown => "unknown",
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown monitor status '{}'", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for MonitorStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(MonitorStatus::Unknown),
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Display-only classification layered on top of [`MonitorStatus`].
///
/// `Slow` is a rendering hint for front-ends and is never stored; the state
/// machine only knows about unknown/up/down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Up,
    Slow,
    Down,
}

impl Availability {
    pub fn classify(status: MonitorStatus, latest: Option<&CheckResult>) -> Self {
        match status {
            MonitorStatus::Unknown => Availability::Unknown,
            MonitorStatus::Down => Availability::Down,
            MonitorStatus::Up => match latest {
                Some(check) if check.success && check.response_time_ms > SLOW_RESPONSE_MS => {
                    Availability::Slow
                }
                _ => Availability::Up,
            },
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Availability::Unknown => "?",
            Availability::Up => "✓",
            Availability::Slow => "◐",
            Availability::Down => "✗",
        }
    }
}
