//! Probe executor - one HTTP health check against one endpoint
//!
//! A probe is stateless: it takes a [`ProbeTarget`] and produces a
//! [`ProbeOutcome`]. Every failure mode (transport, timeout, body read,
//! unexpected status, missing keyword) becomes a structured outcome with a
//! diagnostic text that can be persisted as-is. Nothing is returned as an error.
//!
//! ```text
//! GET url ─▶ response? ─▶ latency ─▶ read body ─▶ status ∈ expected? ─▶ keywords? ─▶ Success
//!              │                        │              │                  │
//!              └──────── Failure ◀──────┴──────────────┴──────────────────┘
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use tracing::{instrument, trace};

use crate::config::EngineConfig;
use crate::storage::schema::Monitor;

use super::criteria::{ExpectedCodes, Keywords};

/// Everything a probe needs to know about an endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTarget {
    pub url: String,
    pub timeout: Duration,
    pub expected_codes: ExpectedCodes,
    pub keywords: Keywords,
}

impl ProbeTarget {
    /// Build the target for `monitor`, normalizing its timeout with the engine defaults
    pub fn from_monitor(monitor: &Monitor, engine: &EngineConfig) -> Self {
        Self {
            url: monitor.url.clone(),
            timeout: engine.request_timeout(monitor.timeout),
            expected_codes: monitor.expected_codes.clone(),
            keywords: monitor.keywords.clone(),
        }
    }
}

/// Why a probe failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The request could not be built (malformed URL, bad scheme, ...)
    InvalidRequest(String),

    /// Connection, DNS or TLS failure
    Connection(String),

    /// No complete response within the deadline
    Timeout(Duration),

    /// Response arrived but the body could not be read
    BodyRead(String),

    UnexpectedStatus { actual: u16, expected: ExpectedCodes },

    MissingKeyword(String),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::InvalidRequest(msg) => write!(f, "failed to create request: {}", msg),
            ProbeFailure::Connection(msg) => write!(f, "request failed: {}", msg),
            ProbeFailure::Timeout(after) => {
                write!(f, "request timed out after {}s", after.as_secs_f64())
            }
            ProbeFailure::BodyRead(msg) => write!(f, "failed to read response body: {}", msg),
            ProbeFailure::UnexpectedStatus { actual, expected } => write!(
                f,
                "unexpected status code: got {}, expected one of [{}]",
                actual, expected
            ),
            ProbeFailure::MissingKeyword(keyword) => {
                write!(f, "keyword '{}' not found in response", keyword)
            }
        }
    }
}

/// Classified result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success {
        status_code: u16,
        latency_ms: u64,
    },
    Failure {
        /// Status code received, 0 if no response arrived
        status_code: u16,
        reason: ProbeFailure,
    },
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ProbeOutcome::Success { status_code, .. } | ProbeOutcome::Failure { status_code, .. } => {
                *status_code
            }
        }
    }

    /// Latency of a successful probe, 0 for failures
    pub fn latency_ms(&self) -> u64 {
        match self {
            ProbeOutcome::Success { latency_ms, .. } => *latency_ms,
            ProbeOutcome::Failure { .. } => 0,
        }
    }

    /// Diagnostic text, empty on success
    pub fn error_text(&self) -> String {
        match self {
            ProbeOutcome::Success { .. } => String::new(),
            ProbeOutcome::Failure { reason, .. } => reason.to_string(),
        }
    }

    fn failure(status_code: u16, reason: ProbeFailure) -> Self {
        ProbeOutcome::Failure {
            status_code,
            reason,
        }
    }
}

/// Something that can check an endpoint
///
/// [`HttpProbe`] is the real implementation; tests substitute scripted probes.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn execute(&self, target: &ProbeTarget) -> ProbeOutcome;
}

/// HTTP GET probe backed by a shared `reqwest` client
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(user_agent).build()?;
        Ok(Self { client })
    }

    fn classify_error(err: &reqwest::Error, timeout: Duration) -> ProbeFailure {
        if err.is_timeout() {
            ProbeFailure::Timeout(timeout)
        } else if err.is_builder() {
            ProbeFailure::InvalidRequest(err.to_string())
        } else {
            ProbeFailure::Connection(err.to_string())
        }
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(skip_all, fields(url = %target.url))]
    async fn execute(&self, target: &ProbeTarget) -> ProbeOutcome {
        trace!("probing {}", target.url);

        let start = Instant::now();

        let response = match self
            .client
            .get(&target.url)
            .timeout(target.timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return ProbeOutcome::failure(0, Self::classify_error(&e, target.timeout)),
        };

        let latency_ms = start.elapsed().as_millis().min(u64::MAX as u128) as u64;
        let status_code = response.status().as_u16();

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return ProbeOutcome::failure(status_code, ProbeFailure::Timeout(target.timeout));
            }
            Err(e) => return ProbeOutcome::failure(status_code, ProbeFailure::BodyRead(e.to_string())),
        };

        if !target.expected_codes.contains(status_code) {
            return ProbeOutcome::failure(
                status_code,
                ProbeFailure::UnexpectedStatus {
                    actual: status_code,
                    expected: target.expected_codes.clone(),
                },
            );
        }

        if let Some(keyword) = target.keywords.first_missing(&body) {
            return ProbeOutcome::failure(
                status_code,
                ProbeFailure::MissingKeyword(keyword.to_string()),
            );
        }

        trace!("{} answered {} in {}ms", target.url, status_code, latency_ms);
        ProbeOutcome::Success {
            status_code,
            latency_ms,
        }
    }
}
