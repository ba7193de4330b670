//! # Forwarder configuration.
//!
//! Provides [`ForwarderConfig`], the settings of the core pipeline. Backends
//! carry their own configuration (for example `IndexConfig`).
//!
//! ## Sentinel values
//! - `enqueue_timeout = 0s` → a full queue rejects immediately
//! - `handler_timeout = 0s` → backend calls are not time-limited
//! - capacities are clamped to a minimum of 1

use std::time::Duration;

/// Configuration of the forwarding pipeline.
///
/// ## Field semantics
/// - `queue_capacity`: events buffered between producers and the dispatch loop
/// - `enqueue_timeout`: how long a producer waits for space before `QueueFull`
/// - `handler_timeout`: default limit for one backend call (per-backend override wins)
/// - `drain_deadline`: used by `shutdown_on_signal`; `shutdown` takes its own
/// - `bus_capacity`: notice bus ring buffer size
#[derive(Clone, Debug)]
pub struct ForwarderConfig {
    /// Maximum number of admitted, not yet dispatched events.
    ///
    /// Bounding the queue turns sustained backend slowness into producer
    /// backpressure instead of unbounded memory growth.
    pub queue_capacity: usize,

    /// Admission wait on a full queue.
    pub enqueue_timeout: Duration,

    /// Default time limit for one `handle_*` call.
    ///
    /// Exceeding it is recorded as `DispatchError::Timeout` and the loop moves on.
    pub handler_timeout: Duration,

    /// Drain deadline applied when shutting down on an OS signal.
    pub drain_deadline: Duration,

    /// Capacity of the notice bus.
    ///
    /// Receivers lagging by more than this many notices skip the oldest ones.
    pub bus_capacity: usize,
}

impl ForwarderConfig {
    /// Queue capacity clamped to a minimum of 1.
    #[inline]
    pub fn queue_capacity_clamped(&self) -> usize {
        self.queue_capacity.max(1)
    }

    /// Default handler timeout as an `Option` (`None` = unlimited).
    #[inline]
    pub fn default_handler_timeout(&self) -> Option<Duration> {
        if self.handler_timeout == Duration::ZERO {
            None
        } else {
            Some(self.handler_timeout)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for ForwarderConfig {
    /// Default configuration:
    ///
    /// - `queue_capacity = 10_000`
    /// - `enqueue_timeout = 100ms`
    /// - `handler_timeout = 30s`
    /// - `drain_deadline = 10s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            queue_capacity: 10_000,
            enqueue_timeout: Duration::from_millis(100),
            handler_timeout: Duration::from_secs(30),
            drain_deadline: Duration::from_secs(10),
            bus_capacity: 1024,
        }
    }
}
