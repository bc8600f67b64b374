//! Actor-based check engine
//!
//! Every scheduled monitor runs as its own `MonitorActor`, an independent
//! async task that owns the monitor's in-memory state.
//!
//! ## Architecture Overview
//!
//! ```text
//!                  ┌─────────────────┐
//!                  │    Scheduler    │
//!                  └────────┬────────┘
//!                           │ spawns, cancels, joins
//!             ┌─────────────┼─────────────┐
//!     ┌───────▼───────┐     │     ┌───────▼───────┐
//!     │ MonitorActor 1│     │     │ MonitorActor N│
//!     └───────┬───────┘     │     └───────┬───────┘
//!             │   probe → status tracker  │
//!             └─────────────┼─────────────┘
//!                           │
//!                ┌──────────▼──────────┐     ┌────────────┐
//!                │ RecordStore         │     │ AlertActor │──▶ Notifier
//!                └─────────────────────┘     └────────────┘
//!                  (monitor actors queue alert events, never wait on delivery)
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Request/Response**: oneshot channels carry the answer to a command
//! 3. **Cancellation**: a child `CancellationToken` per actor, all children
//!    of the scheduler's shutdown token

pub mod alert;
pub mod messages;
pub mod monitor;
