//! Integration tests for alert delivery
//!
//! These tests verify that:
//! - Webhook targets receive a JSON payload for down and recovery events
//! - Discord targets receive an embed
//! - Muted alert managers send nothing
//! - Delivery failures are swallowed
//! - A hanging target is abandoned after the delivery timeout

use std::time::{Duration, Instant};

use serde_json::Value;
use uptime_monitoring::alerts::{AlertManager, Notifier};
use uptime_monitoring::config::{Alert, Discord, Webhook};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn receiver(expected_calls: u64) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/hook"))
        .respond_with(ResponseTemplate::new(204))
        .expect(expected_calls)
        .mount(&mock_server)
        .await;
    mock_server
}

async fn received_json(mock_server: &MockServer) -> Vec<Value> {
    mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| serde_json::from_slice(&request.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_webhook_down_and_recovery_payloads() {
    let mock_server = receiver(2).await;
    let manager = AlertManager::new(vec![Alert::Webhook(Webhook {
        url: format!("{}/hook", mock_server.uri()),
    })])
    .unwrap();

    manager
        .notify_down("API", "https://api.test", "request timed out after 10s")
        .await;
    manager.notify_recovery("API", "https://api.test").await;

    let payloads = received_json(&mock_server).await;
    assert_eq!(payloads.len(), 2);

    assert_eq!(payloads[0]["monitor"], "API");
    assert_eq!(payloads[0]["url"], "https://api.test");
    assert_eq!(payloads[0]["status"], "down");
    assert_eq!(payloads[0]["error"], "request timed out after 10s");
    assert!(payloads[0]["message"].as_str().unwrap().contains("is DOWN"));

    assert_eq!(payloads[1]["status"], "up");
    assert!(payloads[1]["error"].is_null());
    assert!(payloads[1]["timestamp"].is_string());
}

#[tokio::test]
async fn test_discord_embed_with_mention() {
    let mock_server = receiver(1).await;
    let manager = AlertManager::new(vec![Alert::Discord(Discord {
        url: format!("{}/hook", mock_server.uri()),
        user_id: Some("1234".to_string()),
    })])
    .unwrap();

    manager.notify_down("API", "https://api.test", "refused").await;

    let payloads = received_json(&mock_server).await;
    assert_eq!(payloads.len(), 1);
    assert!(payloads[0]["content"].as_str().unwrap().contains("<@1234>"));
    assert_eq!(payloads[0]["embeds"][0]["title"], "🔴 API is DOWN");
}

#[tokio::test]
async fn test_muted_manager_sends_nothing() {
    let mock_server = receiver(0).await;
    let manager = AlertManager::new(vec![Alert::Webhook(Webhook {
        url: format!("{}/hook", mock_server.uri()),
    })])
    .unwrap();

    manager.set_enabled(false);
    manager.notify_down("API", "https://api.test", "refused").await;
    manager.notify_recovery("API", "https://api.test").await;

    assert!(received_json(&mock_server).await.is_empty());
}

#[tokio::test]
async fn test_delivery_failure_is_swallowed() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let manager = AlertManager::new(vec![
        Alert::Log,
        Alert::Webhook(Webhook {
            url: format!("{}/hook", mock_server.uri()),
        }),
        Alert::Webhook(Webhook {
            url: "http://127.0.0.1:1/unreachable".to_string(),
        }),
    ])
    .unwrap();

    // returns normally even though every remote target fails
    manager.notify_down("API", "https://api.test", "refused").await;
    assert_eq!(received_json(&mock_server).await.len(), 1);
}

#[tokio::test]
async fn test_hanging_target_times_out() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(204).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let manager = AlertManager::with_timeout(
        vec![Alert::Webhook(Webhook {
            url: format!("{}/hook", mock_server.uri()),
        })],
        Duration::from_millis(200),
    )
    .unwrap();

    let started = Instant::now();
    manager.notify_down("API", "https://api.test", "refused").await;
    assert!(started.elapsed() < Duration::from_secs(2));
}
