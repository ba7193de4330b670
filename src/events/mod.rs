//! Events and notices: the data that flows through the pipeline.
//!
//! ## Contents
//! - [`Event`], [`EventKind`], [`Outcome`] one recorded test outcome (the payload)
//! - [`Notice`], [`NoticeKind`] diagnostics about the pipeline itself
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast` carrying notices
//!
//! ## Quick reference
//! - **Event producers**: the load engine, through [`EventSource`](crate::EventSource)
//!   or an [`EventSender`](crate::EventSender).
//! - **Event consumer**: the dispatch loop (one per forwarder).
//! - **Notice publishers**: registry, queue handles, dispatch loop.
//! - **Notice consumers**: whoever calls [`Forwarder::subscribe`](crate::Forwarder::subscribe).

mod bus;
mod event;
mod notice;

pub use bus::Bus;
pub use event::{Event, EventKind, Extra, Outcome};
pub use notice::{Notice, NoticeKind};
