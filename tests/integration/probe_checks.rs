//! Integration tests for the HTTP probe
//!
//! These tests verify that:
//! - Status codes are matched against the expected set exactly
//! - Keywords are matched case-insensitively and all of them are required
//! - Transport failures and timeouts become failure outcomes with code 0
//! - The user agent is sent

use std::time::Duration;

use uptime_monitoring::monitors::criteria::{ExpectedCodes, Keywords};
use uptime_monitoring::monitors::probe::{HttpProbe, Probe, ProbeFailure, ProbeOutcome, ProbeTarget};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn target(url: String, codes: &str, keywords: &str) -> ProbeTarget {
    ProbeTarget {
        url,
        timeout: Duration::from_secs(5),
        expected_codes: ExpectedCodes::parse(codes),
        keywords: Keywords::parse(keywords),
    }
}

async fn server_returning(status: u16, body: &str) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(&mock_server)
        .await;
    mock_server
}

#[tokio::test]
async fn test_probe_success() {
    let mock_server = server_returning(200, "all systems OK").await;
    let probe = HttpProbe::new("test-agent").unwrap();

    let outcome = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200", ""))
        .await;

    assert!(outcome.is_success());
    assert_eq!(outcome.status_code(), 200);
    assert_eq!(outcome.error_text(), "");
}

#[tokio::test]
async fn test_probe_unexpected_status() {
    let mock_server = server_returning(503, "maintenance").await;
    let probe = HttpProbe::new("test-agent").unwrap();

    let outcome = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200,201", ""))
        .await;

    assert_eq!(outcome.status_code(), 503);
    assert_eq!(outcome.latency_ms(), 0);
    assert_eq!(
        outcome.error_text(),
        "unexpected status code: got 503, expected one of [200,201]"
    );
}

#[tokio::test]
async fn test_probe_exact_code_membership() {
    // 204 is a 2xx code but not in the expected set
    let mock_server = server_returning(204, "").await;
    let probe = HttpProbe::new("test-agent").unwrap();

    let outcome = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200", ""))
        .await;
    assert!(!outcome.is_success());

    let outcome = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "204", ""))
        .await;
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_probe_keywords_case_insensitive() {
    let mock_server = server_returning(200, "Status: OK, service READY").await;
    let probe = HttpProbe::new("test-agent").unwrap();

    let outcome = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200", "ok,ready"))
        .await;

    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_probe_keywords_are_conjunctive() {
    let mock_server = server_returning(200, "OK").await;
    let probe = HttpProbe::new("test-agent").unwrap();

    let outcome = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200", "ok,ready"))
        .await;

    assert_eq!(
        outcome,
        ProbeOutcome::Failure {
            status_code: 200,
            reason: ProbeFailure::MissingKeyword("ready".to_string()),
        }
    );
}

#[tokio::test]
async fn test_probe_keyword_with_regex_characters() {
    let mock_server = server_returning(200, "version (1.2)").await;
    let probe = HttpProbe::new("test-agent").unwrap();

    let found = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200", "(1.2)"))
        .await;
    assert!(found.is_success());

    // "." must not act as a wildcard
    let missing = probe
        .execute(&target(format!("{}/health", mock_server.uri()), "200", "1x2"))
        .await;
    assert!(!missing.is_success());
}

#[tokio::test]
async fn test_probe_connection_refused() {
    // Non-pooled server: pooled servers keep listening after drop
    let mock_server = MockServer::builder().start().await;
    let url = format!("{}/health", mock_server.uri());
    drop(mock_server);

    let probe = HttpProbe::new("test-agent").unwrap();
    let outcome = probe.execute(&target(url, "200", "")).await;

    assert!(!outcome.is_success());
    assert_eq!(outcome.status_code(), 0);
    assert!(!outcome.error_text().is_empty());
}

#[tokio::test]
async fn test_probe_timeout() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let probe = HttpProbe::new("test-agent").unwrap();
    let mut slow = target(format!("{}/slow", mock_server.uri()), "200", "");
    slow.timeout = Duration::from_millis(200);

    let outcome = probe.execute(&slow).await;

    assert_eq!(
        outcome,
        ProbeOutcome::Failure {
            status_code: 0,
            reason: ProbeFailure::Timeout(Duration::from_millis(200)),
        }
    );
}

#[tokio::test]
async fn test_probe_sends_user_agent() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header("user-agent", "uptime-test/1.0"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let probe = HttpProbe::new("uptime-test/1.0").unwrap();
    let outcome = probe
        .execute(&target(mock_server.uri(), "200", ""))
        .await;

    assert!(outcome.is_success());
}
