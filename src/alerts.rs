//! Notification gateway
//!
//! The check engine only knows the [`Notifier`] trait. [`AlertManager`] is
//! the implementation used by the daemon: it fans a down or recovery event out
//! to every configured target (log, webhook, Discord). Delivery failures are
//! logged here and never reach the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Alert, Webhook};
use crate::discord::{DiscordManager, MessageBuilder};
use crate::monitors::status::MonitorStatus;

const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Receiver of monitor state notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_down(&self, name: &str, url: &str, error: &str);

    async fn notify_recovery(&self, name: &str, url: &str);
}

/// Fans notifications out to the configured alert targets
#[derive(Debug)]
pub struct AlertManager {
    client: Client,
    targets: Vec<Alert>,
    enabled: AtomicBool,
    discord_manager: DiscordManager,
}

impl AlertManager {
    /// Build a manager whose deliveries time out after 10 seconds
    pub fn new(targets: Vec<Alert>) -> Result<Self, reqwest::Error> {
        Self::with_timeout(targets, DELIVERY_TIMEOUT)
    }

    pub fn with_timeout(targets: Vec<Alert>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            discord_manager: DiscordManager::new(client.clone()),
            client,
            targets,
            enabled: AtomicBool::new(true),
        })
    }

    /// Mute or unmute every target
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        info!("notifications {}", if enabled { "enabled" } else { "disabled" });
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn format_down_message(name: &str, url: &str, error: &str) -> String {
        format!("🔴 **{} is DOWN**\nURL: {}\nError: {}", name, url, error)
    }

    fn format_recovery_message(name: &str, url: &str) -> String {
        format!("✅ **{} is UP**\nURL: {} has recovered", name, url)
    }

    async fn dispatch(&self, name: &str, url: &str, status: MonitorStatus, error: Option<&str>) {
        if !self.is_enabled() {
            debug!("notifications disabled, dropping {status} alert for {name}");
            return;
        }

        let message = match error {
            Some(error) => Self::format_down_message(name, url, error),
            None => Self::format_recovery_message(name, url),
        };

        if self.targets.is_empty() {
            info!("{}", message);
            return;
        }

        for target in &self.targets {
            match target {
                Alert::Log => match error {
                    Some(_) => warn!("{}", message),
                    None => info!("{}", message),
                },
                Alert::Discord(discord) => {
                    let embed = match error {
                        Some(error) => self.discord_manager.build_down_embed(name, url, error),
                        None => self.discord_manager.build_recovery_embed(name, url),
                    };

                    let mut message_builder = MessageBuilder::new().add_embed(embed);
                    if let Some(user_id) = &discord.user_id {
                        let emoji = match status {
                            MonitorStatus::Down => "🔴",
                            _ => "✅",
                        };
                        message_builder =
                            message_builder.content(format!("{} `{}` <@{user_id}>", emoji, name));
                    }

                    self.discord_manager
                        .send_message(discord, &message_builder.build())
                        .await;
                }
                Alert::Webhook(webhook) => {
                    self.send_webhook_alert(webhook, &message, name, url, status, error)
                        .await;
                }
            }
        }
    }

    #[instrument(skip(self, webhook, message))]
    async fn send_webhook_alert(
        &self,
        webhook: &Webhook,
        message: &str,
        name: &str,
        url: &str,
        status: MonitorStatus,
        error: Option<&str>,
    ) {
        let payload = json!({
            "message": message,
            "monitor": name,
            "url": url,
            "status": status,
            "error": error,
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&webhook.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
            }
        }
    }
}

#[async_trait]
impl Notifier for AlertManager {
    async fn notify_down(&self, name: &str, url: &str, error: &str) {
        self.dispatch(name, url, MonitorStatus::Down, Some(error)).await;
    }

    async fn notify_recovery(&self, name: &str, url: &str) {
        self.dispatch(name, url, MonitorStatus::Up, None).await;
    }
}

#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Notification {
    Down { name: String, error: String },
    Recovery { name: String },
}

/// Notifier that only remembers what it was asked to send
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct RecordingNotifier {
    events: std::sync::Mutex<Vec<Notification>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub(crate) fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    pub(crate) fn down_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Notification::Down { .. }))
            .count()
    }

    pub(crate) fn recovery_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Notification::Recovery { .. }))
            .count()
    }
}

#[cfg(test)]
#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_down(&self, name: &str, _url: &str, error: &str) {
        self.events.lock().unwrap().push(Notification::Down {
            name: name.to_string(),
            error: error.to_string(),
        });
    }

    async fn notify_recovery(&self, name: &str, _url: &str) {
        self.events.lock().unwrap().push(Notification::Recovery {
            name: name.to_string(),
        });
    }
}
