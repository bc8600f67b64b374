//! AlertActor - delivers notifications off the check path
//!
//! Monitor actors never wait on alert delivery. They hand an [`AlertEvent`]
//! to the [`AlertHandle`], which queues it for this actor and returns at once.
//! The actor passes events to the wrapped [`Notifier`] one at a time, so a
//! down alert always goes out before the recovery that follows it.
//!
//! ```text
//! MonitorActor ─┐
//! MonitorActor ─┼─▶ AlertHandle ─▶ (queue) ─▶ AlertActor ─▶ Notifier
//! MonitorActor ─┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use crate::alerts::Notifier;

use super::messages::AlertEvent;

/// Actor that owns the notifier and delivers queued events
pub struct AlertActor {
    notifier: Arc<dyn Notifier>,

    /// Unbounded so senders never wait on a slow target
    event_rx: mpsc::UnboundedReceiver<AlertEvent>,
}

impl AlertActor {
    pub fn new(notifier: Arc<dyn Notifier>, event_rx: mpsc::UnboundedReceiver<AlertEvent>) -> Self {
        Self { notifier, event_rx }
    }

    /// Run until every [`AlertHandle`] is dropped and the queue is empty
    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting alert actor");

        while let Some(event) = self.event_rx.recv().await {
            trace!("delivering {event:?}");
            match event {
                AlertEvent::Down { name, url, error } => {
                    self.notifier.notify_down(&name, &url, &error).await;
                }
                AlertEvent::Recovery { name, url } => {
                    self.notifier.notify_recovery(&name, &url).await;
                }
            }
        }

        debug!("alert actor stopped");
    }
}

/// Cheap, cloneable sender side of the alert actor
#[derive(Debug, Clone)]
pub struct AlertHandle {
    sender: mpsc::UnboundedSender<AlertEvent>,
}

impl AlertHandle {
    /// Spawn an alert actor delivering through `notifier`
    pub fn spawn(notifier: Arc<dyn Notifier>) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = AlertActor::new(notifier, event_rx);
        tokio::spawn(actor.run());

        Self { sender: event_tx }
    }

    fn enqueue(&self, event: AlertEvent) {
        if let Err(e) = self.sender.send(event) {
            warn!("alert actor is gone, dropping {:?}", e.0);
        }
    }
}

#[async_trait]
impl Notifier for AlertHandle {
    async fn notify_down(&self, name: &str, url: &str, error: &str) {
        self.enqueue(AlertEvent::Down {
            name: name.to_string(),
            url: url.to_string(),
            error: error.to_string(),
        });
    }

    async fn notify_recovery(&self, name: &str, url: &str) {
        self.enqueue(AlertEvent::Recovery {
            name: name.to_string(),
            url: url.to_string(),
        });
    }
}
