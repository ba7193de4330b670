//! # Broadcast bus for pipeline notices.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so that the registry, the queue
//! handles and the dispatch loop can report what happened without ever
//! blocking on whoever is listening.
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits.
//! - **Bounded capacity**: one ring buffer shared by all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` notices.
//! - **No persistence**: with no receivers, notices are simply discarded.

use tokio::sync::broadcast;

use super::notice::Notice;

/// Broadcast channel for pipeline notices.
///
/// Cheap to clone (holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Notice>,
}

impl Bus {
    /// Creates a new bus; capacity is clamped to a minimum of 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Notice>(capacity.max(1));
        Self { tx }
    }

    /// Publishes a notice to all current receivers (fire-and-forget).
    pub fn publish(&self, notice: Notice) {
        let _ = self.tx.send(notice);
    }

    /// Creates an independent receiver that observes notices sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }
}
