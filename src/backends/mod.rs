//! # Sink backends for the forwarding pipeline.
//!
//! This module provides the [`Backend`] trait and two ready-made adapters.
//!
//! ## Architecture
//! ```text
//! dispatch loop ── snapshot ──► Backend::handle_success(&Event)
//!                     │          Backend::handle_failure(&Event)
//!                     │               │
//!                     │      ┌────────┴────────┬─────────┐
//!                     │      ▼                 ▼         ▼
//!                     │  ConsoleBackend   IndexBackend  Custom
//!                     │
//!                     └──► Err / timeout / panic ─► DispatchError (recorded, isolated)
//! ```
//!
//! ## Backend types
//! - **Local sinks** never fail (console printer).
//! - **Remote sinks** can be down; they validate connectivity in a fallible
//!   constructor and retry submissions internally before reporting.

mod backend;
mod console;
#[cfg(feature = "elasticsearch")]
mod index;
mod retry;

pub use backend::{Backend, Identity};
pub use console::ConsoleBackend;
#[cfg(feature = "elasticsearch")]
pub use index::{IndexBackend, IndexConfig};
pub use retry::RetryPolicy;
