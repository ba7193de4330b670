//! # loadsink
//!
//! **loadsink** forwards load-test results to pluggable sinks.
//!
//! A load generator reports every request it made as an [`Event`] (success or
//! failure). Events are admitted into a bounded queue and fanned out by a
//! single dispatch task to every registered [`Backend`]: a console printer, a
//! search-index store, or anything implementing the trait. Backends can be
//! added and removed while events flow; a failing, panicking or hanging
//! backend never affects the others or the producer.
//!
//! ## Architecture
//! ```text
//!   load engine (many tasks)
//!     │ EventSource::on_success / on_failure
//!     │ EventSender::enqueue / try_enqueue
//!     ▼
//! ┌───────────────────────────────────────────────┐
//! │ bounded queue (ForwarderConfig::queue_capacity)│ ◄── full: wait enqueue_timeout, then QueueFull
//! └──────────────────────┬────────────────────────┘     closed: QueueClosed
//!                        ▼
//!              dispatch task (one per Forwarder)
//!                        │ Registry::snapshot()
//!        ┌───────────────┼────────────────┐
//!        ▼               ▼                ▼
//!  ConsoleBackend   IndexBackend      custom Backend
//!        │               │                │
//!        └── Err / timeout / panic ─► DispatchError ─► stats + warn! + Notice
//!
//! Bus (broadcast) ◄── Notice { BackendAdded, DispatchFailed, AdmissionRejected, DrainStarted, ... }
//! ```
//!
//! ### Lifecycle
//! ```text
//! Idle ──start()──► Running ──shutdown(deadline)──► Draining ──► Stopped
//!                                   │
//!                                   ├─ admission closed (QueueClosed)
//!                                   ├─ admitted events flushed in order
//!                                   └─ deadline elapsed → calls in flight abandoned,
//!                                      rest dropped, DrainTimeout
//! ```
//!
//! ## Features
//! | Area          | Description                                          | Key types                                  |
//! |---------------|------------------------------------------------------|--------------------------------------------|
//! | **Events**    | Immutable success/failure records with metadata.     | [`Event`], [`EventKind`], [`Outcome`]      |
//! | **Producers** | Hooks and queue handles with backpressure.           | [`EventSource`], [`EventSender`]           |
//! | **Backends**  | Sink trait and ready-made adapters.                  | [`Backend`], [`ConsoleBackend`], `IndexBackend` |
//! | **Runtime**   | Queue, registry, dispatch loop and shutdown.         | [`Forwarder`], [`ForwarderBuilder`]        |
//! | **Reporting** | Counters, notices and structured `tracing` logs.     | [`StatsSnapshot`], [`Notice`]              |
//! | **Errors**    | One typed error per failure surface.                 | [`EnqueueError`], [`RuntimeError`], ...    |
//!
//! ## Optional features
//! - `elasticsearch` _(default)_: the `IndexBackend` adapter over `reqwest`.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use loadsink::{ConsoleBackend, Extra, Forwarder, ForwarderConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fwd = Forwarder::builder(ForwarderConfig::default())
//!         .with_backend(Arc::new(ConsoleBackend::new()))
//!         .build();
//!     fwd.start()?;
//!
//!     let source = fwd.source();
//!     source.on_success("POST", "/login", 35.0, 120, Extra::new()).await?;
//!     source.on_failure("GET", "/cart", None, "HTTP 503", Extra::new()).await?;
//!
//!     fwd.shutdown(Duration::from_secs(5)).await?;
//!     Ok(())
//! }
//! ```

mod backends;
mod core;
mod error;
mod events;

// ---- Public re-exports ----

pub use backends::{Backend, ConsoleBackend, Identity, RetryPolicy};
#[cfg(feature = "elasticsearch")]
pub use backends::{IndexBackend, IndexConfig};
pub use crate::core::{
    DispatcherState, DrainReport, EventSender, EventSource, Forwarder, ForwarderBuilder,
    ForwarderConfig, Registry, Snapshot, StatsSnapshot,
};
pub use error::{AdapterError, BackendError, DispatchError, EnqueueError, RuntimeError};
pub use events::{Bus, Event, EventKind, Extra, Notice, NoticeKind, Outcome};
