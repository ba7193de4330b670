//! Error types used by the forwarding pipeline and its backends.
//!
//! This module defines one enum per failure surface:
//!
//! - [`AdapterError`]: a backend could not be constructed (surfaced to the caller).
//! - [`BackendError`]: a backend handler failed for one event (returned by handlers).
//! - [`DispatchError`]: the dispatcher's record of one isolated per-backend failure.
//! - [`EnqueueError`]: admission into the queue was refused (surfaced to the producer).
//! - [`RuntimeError`]: the forwarder itself (start/shutdown) failed.
//!
//! All of them provide `as_label` (stable snake_case for logs/metrics).

use std::time::Duration;

use thiserror::Error;

use crate::backends::Identity;
use crate::events::Event;

/// # Errors produced while constructing a backend.
///
/// A backend that fails construction never exists, so it can never be registered.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The connectivity probe was requested and no endpoint answered.
    #[error("backend unavailable at {endpoints:?}: {reason}")]
    BackendUnavailable {
        /// Endpoints that were probed.
        endpoints: Vec<String>,
        /// Last probe failure.
        reason: String,
    },

    /// The configuration cannot describe a working backend.
    #[error("invalid backend configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with it.
        reason: String,
    },

    /// The underlying client could not be built.
    #[error("backend client setup failed: {reason}")]
    Client {
        /// The underlying error message.
        reason: String,
    },
}

impl AdapterError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AdapterError::BackendUnavailable { .. } => "adapter_backend_unavailable",
            AdapterError::InvalidConfig { .. } => "adapter_invalid_config",
            AdapterError::Client { .. } => "adapter_client",
        }
    }
}

/// # Errors returned by a backend handler for a single event.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BackendError {
    /// The event could not be encoded for the sink.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The sink could not be reached.
    #[error("transport error: {reason}")]
    Transport {
        /// The underlying error message.
        reason: String,
    },

    /// The sink answered but refused the submission.
    #[error("rejected with status {status}: {body}")]
    Rejected {
        /// Status code reported by the sink.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Any other backend-specific failure.
    #[error("{reason}")]
    Other {
        /// Human-readable description.
        reason: String,
    },
}

impl BackendError {
    /// Shorthand for [`BackendError::Other`].
    pub fn other(reason: impl Into<String>) -> Self {
        BackendError::Other {
            reason: reason.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BackendError::Serialize(_) => "backend_serialize",
            BackendError::Transport { .. } => "backend_transport",
            BackendError::Rejected { .. } => "backend_rejected",
            BackendError::Other { .. } => "backend_other",
        }
    }
}

/// # One backend failed to handle one event.
///
/// Recorded by the dispatcher (stats, log, notice) and never propagated:
/// it does not stop the loop, skip other backends, or re-queue the event.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The handler returned an error.
    #[error("backend {backend} failed: {error}")]
    Failed {
        /// Backend that failed.
        backend: Identity,
        /// What the handler reported.
        error: BackendError,
    },

    /// The handler did not finish within its timeout.
    #[error("backend {backend} timed out after {timeout:?}")]
    Timeout {
        /// Backend that timed out.
        backend: Identity,
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// The handler panicked; the panic was caught.
    #[error("backend {backend} panicked: {info}")]
    Panicked {
        /// Backend that panicked.
        backend: Identity,
        /// Panic payload, when it was a string.
        info: String,
    },

    /// The drain deadline elapsed before the handler finished; the call was dropped.
    #[error("backend {backend} call abandoned at the drain deadline")]
    Abandoned {
        /// Backend whose call was cut short or never made.
        backend: Identity,
    },
}

impl DispatchError {
    /// Returns the identity of the backend that failed.
    pub fn backend(&self) -> &Identity {
        match self {
            DispatchError::Failed { backend, .. }
            | DispatchError::Timeout { backend, .. }
            | DispatchError::Panicked { backend, .. }
            | DispatchError::Abandoned { backend } => backend,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Failed { .. } => "dispatch_failed",
            DispatchError::Timeout { .. } => "dispatch_timeout",
            DispatchError::Panicked { .. } => "dispatch_panicked",
            DispatchError::Abandoned { .. } => "dispatch_abandoned",
        }
    }
}

/// # Admission into the event queue was refused.
///
/// The rejected event is handed back so the producer decides whether to drop or retry.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EnqueueError {
    /// No space became available within the admission timeout.
    #[error("event queue full (waited {timeout:?})")]
    QueueFull {
        /// How long admission waited.
        timeout: Duration,
        /// The event that was not admitted.
        event: Event,
    },

    /// Shutdown has begun; the queue no longer admits events.
    #[error("event queue closed")]
    QueueClosed {
        /// The event that was not admitted.
        event: Event,
    },
}

impl EnqueueError {
    /// Returns the rejected event.
    pub fn into_event(self) -> Event {
        match self {
            EnqueueError::QueueFull { event, .. } | EnqueueError::QueueClosed { event } => event,
        }
    }

    /// Returns `true` for [`EnqueueError::QueueFull`].
    pub fn is_full(&self) -> bool {
        matches!(self, EnqueueError::QueueFull { .. })
    }

    /// Returns `true` for [`EnqueueError::QueueClosed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, EnqueueError::QueueClosed { .. })
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            EnqueueError::QueueFull { .. } => "queue_full",
            EnqueueError::QueueClosed { .. } => "queue_closed",
        }
    }
}

/// # Errors produced by the forwarder runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `start()` was called on a forwarder that already left `Idle`.
    #[error("dispatcher already started")]
    AlreadyStarted,

    /// The dispatch loop needs a tokio runtime and none is running on this thread.
    #[error("no tokio runtime: {reason}")]
    NoRuntime {
        /// Why the runtime handle could not be obtained.
        reason: String,
    },

    /// The drain deadline elapsed with events still queued.
    #[error("drain deadline {deadline:?} exceeded; dropped {dropped} queued events")]
    DrainTimeout {
        /// The configured drain deadline.
        deadline: Duration,
        /// Number of admitted events that were never dispatched.
        dropped: u64,
    },

    /// The dispatch task ended abnormally.
    #[error("dispatch loop aborted: {reason}")]
    LoopAborted {
        /// Panic payload of the loop task.
        reason: String,
    },

    /// Registering OS signal listeners failed.
    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use loadsink::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::DrainTimeout { deadline: Duration::from_secs(1), dropped: 3 };
    /// assert_eq!(err.as_label(), "runtime_drain_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::NoRuntime { .. } => "runtime_no_runtime",
            RuntimeError::DrainTimeout { .. } => "runtime_drain_timeout",
            RuntimeError::LoopAborted { .. } => "runtime_loop_aborted",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_event_is_handed_back() {
        let ev = Event::success("GET", "/", 12.0, 64);
        let seq = ev.seq();
        let err = EnqueueError::QueueFull {
            timeout: Duration::from_millis(5),
            event: ev,
        };
        assert!(err.is_full());
        assert_eq!(err.as_label(), "queue_full");
        assert_eq!(err.into_event().seq(), seq);
    }

    #[test]
    fn dispatch_error_names_its_backend() {
        let err = DispatchError::Failed {
            backend: Identity::from("index"),
            error: BackendError::other("boom"),
        };
        assert_eq!(err.backend().as_str(), "index");
        assert_eq!(err.to_string(), "backend index failed: boom");
    }
}
