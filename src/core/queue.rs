//! # Bounded event queue between producers and the dispatch loop.
//!
//! [`EventSender`] is the cloneable producer handle; the receiving half is
//! owned by the dispatch loop. The queue is a bounded `tokio::sync::mpsc`
//! channel, FIFO in admission order.
//!
//! ## Admission
//! ```text
//! enqueue(ev)
//!   ├─ closing?            ─► Err(QueueClosed)
//!   ├─ slot free           ─► admitted
//!   └─ full ─► wait up to enqueue_timeout for a slot
//!                ├─ slot    ─► admitted
//!                ├─ closing ─► Err(QueueClosed)
//!                └─ timeout ─► Err(QueueFull)
//! ```
//!
//! Rejections hand the event back, are counted, and published as
//! `AdmissionRejected` notices; nothing is dropped unannounced.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::stats::Stats;
use crate::error::EnqueueError;
use crate::events::{Bus, Event, Notice, NoticeKind};

/// Creates a connected sender/receiver pair.
pub(crate) fn channel(
    capacity: usize,
    timeout: Duration,
    closing: CancellationToken,
    stats: Arc<Stats>,
    bus: Bus,
) -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = EventSender {
        tx,
        timeout,
        closing,
        stats,
        bus,
    };
    (sender, EventReceiver { rx })
}

/// Producer handle of the event queue.
///
/// Cheap to clone; every clone feeds the same queue.
#[derive(Clone)]
pub struct EventSender {
    tx: mpsc::Sender<Arc<Event>>,
    timeout: Duration,
    closing: CancellationToken,
    stats: Arc<Stats>,
    bus: Bus,
}

impl EventSender {
    /// Admits `event`, waiting up to the configured timeout while the queue is full.
    pub async fn enqueue(&self, event: Event) -> Result<(), EnqueueError> {
        if self.closing.is_cancelled() {
            return Err(self.reject_closed(event));
        }
        match self.tx.try_reserve() {
            Ok(permit) => {
                permit.send(Arc::new(event));
                self.stats.enqueued();
                return Ok(());
            }
            Err(mpsc::error::TrySendError::Closed(())) => return Err(self.reject_closed(event)),
            Err(mpsc::error::TrySendError::Full(())) => {}
        }
        if self.timeout.is_zero() {
            return Err(self.reject_full(event));
        }

        let reserved = tokio::select! {
            biased;
            _ = self.closing.cancelled() => return Err(self.reject_closed(event)),
            res = tokio::time::timeout(self.timeout, self.tx.reserve()) => res,
        };
        match reserved {
            Ok(Ok(permit)) => {
                permit.send(Arc::new(event));
                self.stats.enqueued();
                Ok(())
            }
            Ok(Err(_closed)) => Err(self.reject_closed(event)),
            Err(_elapsed) => Err(self.reject_full(event)),
        }
    }

    /// Admits `event` only if a slot is free right now.
    pub fn try_enqueue(&self, event: Event) -> Result<(), EnqueueError> {
        if self.closing.is_cancelled() {
            return Err(self.reject_closed(event));
        }
        match self.tx.try_reserve() {
            Ok(permit) => {
                permit.send(Arc::new(event));
                self.stats.enqueued();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(())) => Err(self.reject_closed(event)),
            Err(mpsc::error::TrySendError::Full(())) => Err(self.reject_full(event)),
        }
    }

    /// Number of free slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }

    /// Whether admission is closed.
    pub fn is_closed(&self) -> bool {
        self.closing.is_cancelled() || self.tx.is_closed()
    }

    fn reject_full(&self, event: Event) -> EnqueueError {
        self.stats.rejected_full();
        tracing::debug!(seq = event.seq(), timeout = ?self.timeout, "event rejected: queue full");
        self.bus.publish(
            Notice::now(NoticeKind::AdmissionRejected)
                .with_reason("full")
                .with_event_seq(event.seq()),
        );
        EnqueueError::QueueFull {
            timeout: self.timeout,
            event,
        }
    }

    fn reject_closed(&self, event: Event) -> EnqueueError {
        self.stats.rejected_closed();
        tracing::debug!(seq = event.seq(), "event rejected: queue closed");
        self.bus.publish(
            Notice::now(NoticeKind::AdmissionRejected)
                .with_reason("closed")
                .with_event_seq(event.seq()),
        );
        EnqueueError::QueueClosed { event }
    }
}

/// Consumer half of the event queue, owned by the dispatch loop.
pub(crate) struct EventReceiver {
    rx: mpsc::Receiver<Arc<Event>>,
}

impl EventReceiver {
    /// Next event in admission order; `None` once closed and empty.
    pub(crate) async fn dequeue(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Stops admission at the channel level; queued events stay receivable.
    pub(crate) fn close(&mut self) {
        self.rx.close();
    }

    /// Closes the queue and drops whatever is still in it, returning the count.
    pub(crate) fn discard_remaining(&mut self) -> u64 {
        self.rx.close();
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}
