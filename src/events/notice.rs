//! # Diagnostic notices published by the pipeline itself.
//!
//! A [`Notice`] describes something the forwarder did, as opposed to an
//! [`Event`](crate::Event), which describes the system under test. Notices
//! carry the out-of-band reports the pipeline never raises to callers:
//! per-backend dispatch failures, refused admissions, drain outcomes.
//!
//! The [`NoticeKind`] enum falls into three groups:
//! - **Registry**: backend added, replaced, removed
//! - **Delivery**: dispatch failed, admission rejected
//! - **Lifecycle**: dispatcher started, drain started, stopped, drain timed out

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for notice ordering.
static NOTICE_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of pipeline notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    // === Registry ===
    /// A backend with a new identity was registered.
    ///
    /// Sets: `backend`
    BackendAdded,

    /// A backend replaced one registered under the same identity.
    ///
    /// Sets: `backend`
    BackendReplaced,

    /// A registered backend was removed.
    ///
    /// Sets: `backend`
    BackendRemoved,

    // === Delivery ===
    /// One backend failed to handle one event.
    ///
    /// Sets: `backend`, `reason` (error message), `event_seq`
    DispatchFailed,

    /// A producer's event was refused by the queue.
    ///
    /// Sets: `reason` (`"full"` or `"closed"`), `event_seq`
    AdmissionRejected,

    // === Lifecycle ===
    /// The dispatch loop is running.
    DispatcherStarted,

    /// Shutdown requested; admission closed, queued events are being flushed.
    DrainStarted,

    /// The dispatch loop finished.
    ///
    /// Sets: `count` (events dispatched while draining)
    Stopped,

    /// The drain deadline elapsed with events still queued.
    ///
    /// Sets: `count` (events dropped)
    DrainTimedOut,
}

/// Pipeline notice with optional metadata.
#[derive(Debug, Clone)]
pub struct Notice {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Notice classification.
    pub kind: NoticeKind,
    /// Identity of the backend concerned, if any.
    pub backend: Option<Arc<str>>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
    /// Sequence number of the event concerned, if any.
    pub event_seq: Option<u64>,
    /// Event count (dispatched or dropped, depending on kind).
    pub count: Option<u64>,
}

impl Notice {
    /// Creates a notice of the given kind with current timestamp and next sequence number.
    pub fn now(kind: NoticeKind) -> Self {
        Self {
            seq: NOTICE_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            backend: None,
            reason: None,
            event_seq: None,
            count: None,
        }
    }

    #[inline]
    pub fn with_backend(mut self, backend: impl Into<Arc<str>>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[inline]
    pub fn with_event_seq(mut self, seq: u64) -> Self {
        self.event_seq = Some(seq);
        self
    }

    #[inline]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }
}
