//! # Backend trait
//!
//! [`Backend`] is the extension point for plugging sinks into the forwarder.
//! A backend is driven by the dispatch loop: for every dequeued event, each
//! registered backend gets exactly one call, `handle_success` or
//! `handle_failure` depending on the event kind.
//!
//! ## Contract
//! - Handlers return `Err` instead of panicking; the error is recorded as a
//!   `DispatchError` and never reaches other backends or the producer.
//! - Panics and calls exceeding [`Backend::handler_timeout`] are caught by the
//!   dispatcher and recorded the same way.
//! - Handlers run sequentially: a slow backend delays the loop, so anything
//!   that may block for long should bound itself (timeouts, bounded retries).
//! - Two backends with the same [`Identity`] are the same backend; registering
//!   the second replaces the first.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use loadsink::{Backend, BackendError, Event, Identity};
//!
//! struct Counter(std::sync::atomic::AtomicU64);
//!
//! #[async_trait]
//! impl Backend for Counter {
//!     fn identity(&self) -> Identity { Identity::from("counter") }
//!
//!     async fn handle_success(&self, _ev: &Event) -> Result<(), BackendError> {
//!         self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         Ok(())
//!     }
//! }
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::events::Event;

/// Stable identity of a backend, used for deduplication and equality.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Identity(Arc<str>);

impl Identity {
    /// Identity derived from a type name (the default for every backend).
    pub fn of<T: ?Sized>() -> Self {
        Self(Arc::from(std::any::type_name::<T>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl From<String> for Identity {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl From<Identity> for Arc<str> {
    fn from(id: Identity) -> Self {
        id.0
    }
}

/// Sink for test-outcome events.
///
/// Both handlers acknowledge by default, so a backend only implements the
/// kinds it cares about.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Returns the identity used for registry deduplication and in reports.
    ///
    /// Defaults to `type_name::<Self>()`, so at most one instance of a given
    /// type is registered unless this is overridden.
    fn identity(&self) -> Identity {
        Identity::of::<Self>()
    }

    /// Handles one success event.
    async fn handle_success(&self, _event: &Event) -> Result<(), BackendError> {
        Ok(())
    }

    /// Handles one failure event.
    async fn handle_failure(&self, _event: &Event) -> Result<(), BackendError> {
        Ok(())
    }

    /// Per-call timeout overriding the forwarder default.
    ///
    /// `None` keeps the default from
    /// [`ForwarderConfig::handler_timeout`](crate::ForwarderConfig::handler_timeout).
    fn handler_timeout(&self) -> Option<Duration> {
        None
    }
}
