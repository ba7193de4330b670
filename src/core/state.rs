use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

/// Lifecycle of the dispatch loop.
///
/// ```text
/// Idle ──start()──► Running ──shutdown()──► Draining ──► Stopped
/// ```
/// Transitions only move forward; a stopped forwarder is not restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DispatcherState {
    /// Built, loop not spawned yet. Events may already be admitted.
    Idle,
    /// Loop is dispatching.
    Running,
    /// Admission closed; flushing what was admitted.
    Draining,
    /// Loop finished.
    Stopped,
}

impl DispatcherState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatcherState::Idle => "idle",
            DispatcherState::Running => "running",
            DispatcherState::Draining => "draining",
            DispatcherState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for DispatcherState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the draining phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events dispatched after shutdown was requested.
    pub dispatched: u64,
    /// Admitted events discarded because the drain deadline elapsed.
    pub dropped: u64,
}

/// Point in time at which the draining phase gives up.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DrainWindow {
    /// Deadline as passed to `shutdown`.
    pub(crate) deadline: Duration,
    pub(crate) until: Instant,
}

impl DrainWindow {
    pub(crate) fn starting_now(deadline: Duration) -> Self {
        let now = Instant::now();
        Self {
            deadline,
            // saturate absurd deadlines to roughly thirty years
            until: now
                .checked_add(deadline)
                .unwrap_or_else(|| now + Duration::from_secs(30 * 365 * 86_400)),
        }
    }
}
