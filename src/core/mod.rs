//! Pipeline core: queue, registry, dispatch loop and lifecycle.
//!
//! The public entry point is [`Forwarder`], built through [`ForwarderBuilder`].
//!
//! Internal modules:
//! - [`queue`]: bounded FIFO with timed admission and a closing signal;
//! - [`registry`]: copy-on-write set of backends keyed by identity;
//! - [`dispatcher`]: the single loop fanning events out with per-call isolation;
//! - [`forwarder`]: owns everything above and drives start/drain/stop;
//! - [`shutdown`]: OS signal handling.

mod builder;
mod config;
mod dispatcher;
mod forwarder;
mod queue;
mod registry;
mod shutdown;
mod source;
mod state;
mod stats;

pub use builder::ForwarderBuilder;
pub use config::ForwarderConfig;
pub use forwarder::Forwarder;
pub use queue::EventSender;
pub use registry::{Registry, Snapshot};
pub use source::EventSource;
pub use state::{DispatcherState, DrainReport};
pub use stats::StatsSnapshot;
