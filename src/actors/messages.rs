//! Message types for actor communication
//!
//! Monitor actors are controlled through two channels:
//!
//! 1. **Commands**: request/response messages sent over the actor's mpsc channel
//! 2. **Cancellation**: a `CancellationToken` shared with the scheduler, which
//!    stops the actor between checks
//!
//! Notifications leave the check path as [`AlertEvent`]s, which the alert
//! actor delivers in order.

use tokio::sync::oneshot;

use crate::monitors::tracker::Evaluation;

/// Commands that can be sent to a MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a check right away (bypassing the interval timer)
    ///
    /// The check is serialized with the timer-driven ones, so two checks of
    /// the same monitor never run at the same time.
    CheckNow {
        /// Channel to send the evaluation back
        respond_to: oneshot::Sender<Evaluation>,
    },
}

/// Notification handed from a monitor actor to the alert actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertEvent {
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
