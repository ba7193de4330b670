//! # Forwarder: owns the queue, the registry and the dispatch task.
//!
//! The [`Forwarder`] wires producers ([`EventSender`] / [`EventSource`]) to the
//! backends in its [`Registry`] through a single dispatch task, and drives
//! that task's lifecycle.
//!
//! ## Architecture
//! ```text
//! EventSource::on_*  ─┐
//! EventSender::enqueue ┼─► [ bounded queue ] ─► dispatch task ─► Registry snapshot
//!                      │                                           ├─► backend A
//! register_backend ────┼─► Registry                                ├─► backend B
//! unregister_backend ──┘                                           └─► ...
//!
//! Bus ◄── notices (registry changes, dispatch failures, rejections, lifecycle)
//! ```
//!
//! ## Shutdown path
//! ```text
//! shutdown(deadline)
//!   ├─ Idle? spawn the loop first, so admitted events are flushed
//!   ├─ first call only: open the DrainWindow, state = Draining,
//!   │  publish DrainStarted, closing.cancel() → producers get QueueClosed
//!   └─ wait for Stopped, take the outcome
//!
//! dispatch task, when the loop returns:
//!   ├─ publish Stopped; dropped > 0 → publish DrainTimedOut, Err(DrainTimeout)
//!   └─ store the outcome, state = Stopped
//! ```
//! The task finishes the drain on its own, so dropping a `shutdown` future
//! does not strand the forwarder in `Draining`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use loadsink::{ConsoleBackend, Event, Forwarder, ForwarderConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fwd = Forwarder::builder(ForwarderConfig::default())
//!         .with_backend(std::sync::Arc::new(ConsoleBackend::new()))
//!         .build();
//!     fwd.start()?;
//!
//!     fwd.sender()
//!         .enqueue(Event::success("GET", "/", 12.0, 512))
//!         .await?;
//!
//!     let report = fwd.shutdown(Duration::from_secs(1)).await?;
//!     assert_eq!(report.dropped, 0);
//!     Ok(())
//! }
//! ```

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::backends::{Backend, Identity};
use crate::core::{
    builder::ForwarderBuilder,
    config::ForwarderConfig,
    dispatcher::{self, Dispatcher},
    queue::{self, EventReceiver, EventSender},
    registry::Registry,
    shutdown,
    source::EventSource,
    state::{DispatcherState, DrainReport, DrainWindow},
    stats::{Stats, StatsSnapshot},
};
use crate::error::RuntimeError;
use crate::events::{Bus, Notice, NoticeKind};

/// Receiver until the loop is spawned; whether a drain was requested.
#[derive(Default)]
struct Lifecycle {
    receiver: Option<EventReceiver>,
    draining: bool,
}

/// Written by the dispatch task; read by whoever waits for `Stopped`.
struct Completion {
    state: watch::Sender<DispatcherState>,
    outcome: Mutex<Option<Result<DrainReport, RuntimeError>>>,
}

impl Completion {
    fn finish(&self, outcome: Result<DrainReport, RuntimeError>) {
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = Some(outcome);
        self.state.send_replace(DispatcherState::Stopped);
    }

    fn take(&self) -> Option<Result<DrainReport, RuntimeError>> {
        self.outcome.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Event-forwarding pipeline with a dynamic set of backends.
pub struct Forwarder {
    cfg: ForwarderConfig,
    bus: Bus,
    registry: Arc<Registry>,
    stats: Arc<Stats>,
    sender: EventSender,
    lifecycle: Mutex<Lifecycle>,
    closing: CancellationToken,
    window: watch::Sender<Option<DrainWindow>>,
    completion: Arc<Completion>,
}

impl Forwarder {
    /// Starts building a forwarder with the given configuration.
    pub fn builder(cfg: ForwarderConfig) -> ForwarderBuilder {
        ForwarderBuilder::new(cfg)
    }

    pub(crate) fn new_internal(cfg: ForwarderConfig) -> Self {
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let stats = Arc::new(Stats::default());
        let closing = CancellationToken::new();
        let (sender, receiver) = queue::channel(
            cfg.queue_capacity_clamped(),
            cfg.enqueue_timeout,
            closing.clone(),
            Arc::clone(&stats),
            bus.clone(),
        );
        let (state, _) = watch::channel(DispatcherState::Idle);
        let (window, _) = watch::channel(None);

        Self {
            registry: Arc::new(Registry::new(bus.clone())),
            cfg,
            bus,
            stats,
            sender,
            lifecycle: Mutex::new(Lifecycle {
                receiver: Some(receiver),
                draining: false,
            }),
            closing,
            window,
            completion: Arc::new(Completion {
                state,
                outcome: Mutex::new(None),
            }),
        }
    }

    /// Registers a backend; a backend with the same identity is replaced in place.
    ///
    /// Safe while the loop is dispatching: the change applies from the next event.
    pub fn register_backend(&self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        self.registry.add(backend)
    }

    /// Unregisters a backend by identity; unknown identities are ignored.
    pub fn unregister_backend(&self, identity: impl AsRef<str>) -> Option<Arc<dyn Backend>> {
        self.registry.remove(identity)
    }

    /// Identities of the registered backends, in dispatch order.
    pub fn backends(&self) -> Vec<Identity> {
        self.registry.identities()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Spawns the dispatch loop on the current tokio runtime.
    ///
    /// Fails with [`RuntimeError::NoRuntime`] outside a runtime, leaving the
    /// forwarder `Idle`.
    pub fn start(&self) -> Result<(), RuntimeError> {
        let mut lc = self.lifecycle();
        if lc.receiver.is_none() {
            return Err(RuntimeError::AlreadyStarted);
        }
        let rt = Handle::try_current().map_err(|e| RuntimeError::NoRuntime {
            reason: e.to_string(),
        })?;
        if let Some(rx) = lc.receiver.take() {
            self.spawn_loop(&rt, rx);
        }
        Ok(())
    }

    fn spawn_loop(&self, rt: &Handle, rx: EventReceiver) {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.stats),
            self.bus.clone(),
            self.cfg.default_handler_timeout(),
        );
        self.completion.state.send_replace(DispatcherState::Running);
        self.bus.publish(Notice::now(NoticeKind::DispatcherStarted));
        tracing::info!(backends = self.registry.len(), "dispatcher started");

        let run = dispatcher.run(rx, self.closing.clone(), self.window.subscribe());
        let window = self.window.subscribe();
        let bus = self.bus.clone();
        let stats = Arc::clone(&self.stats);
        let completion = Arc::clone(&self.completion);
        rt.spawn(async move {
            let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                Ok(report) => {
                    let window = *window.borrow();
                    settle(report, window, &bus, &stats)
                }
                Err(panic_err) => {
                    let reason = dispatcher::panic_info(&*panic_err);
                    tracing::error!(%reason, "dispatch loop aborted");
                    bus.publish(Notice::now(NoticeKind::Stopped).with_reason(reason.clone()));
                    Err(RuntimeError::LoopAborted { reason })
                }
            };
            completion.finish(outcome);
        });
    }

    /// Closes admission, flushes admitted events within `deadline`, and stops the loop.
    ///
    /// Calls still running at the deadline are abandoned, and events still
    /// queued are dropped and reported as [`RuntimeError::DrainTimeout`].
    ///
    /// Only the first call sets the deadline. Every call waits for `Stopped`;
    /// the drain outcome goes to the first caller that observes it and later
    /// callers get an empty report. Dropping the returned future does not stop
    /// the drain.
    pub async fn shutdown(&self, deadline: Duration) -> Result<DrainReport, RuntimeError> {
        self.begin_drain(deadline)?;

        let mut state = self.completion.state.subscribe();
        let _ = state.wait_for(|s| *s == DispatcherState::Stopped).await;
        self.completion.take().unwrap_or(Ok(DrainReport::default()))
    }

    fn begin_drain(&self, deadline: Duration) -> Result<(), RuntimeError> {
        let mut lc = self.lifecycle();
        if lc.receiver.is_some() {
            let rt = Handle::try_current().map_err(|e| RuntimeError::NoRuntime {
                reason: e.to_string(),
            })?;
            if let Some(rx) = lc.receiver.take() {
                self.spawn_loop(&rt, rx);
            }
        }
        if lc.draining {
            return Ok(());
        }
        lc.draining = true;

        // the window must be visible before the loop sees `closing`
        self.window.send_replace(Some(DrainWindow::starting_now(deadline)));
        self.completion.state.send_if_modified(|s| match *s {
            DispatcherState::Stopped => false,
            _ => {
                *s = DispatcherState::Draining;
                true
            }
        });
        self.bus.publish(Notice::now(NoticeKind::DrainStarted));
        tracing::info!(?deadline, "draining event queue");
        self.closing.cancel();
        Ok(())
    }

    /// Waits for SIGINT/SIGTERM/SIGQUIT (Ctrl-C elsewhere), then shuts down
    /// with [`ForwarderConfig::drain_deadline`].
    pub async fn shutdown_on_signal(&self) -> Result<DrainReport, RuntimeError> {
        shutdown::wait_for_shutdown_signal().await?;
        tracing::info!("termination signal received");
        self.shutdown(self.cfg.drain_deadline).await
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DispatcherState {
        *self.completion.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<DispatcherState> {
        self.completion.state.subscribe()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Subscribes to pipeline notices published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.bus.subscribe()
    }

    /// Producer handle for the queue.
    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    /// Success/failure hooks bound to this forwarder.
    pub fn source(&self) -> EventSource {
        EventSource::new(self.sender.clone())
    }

    pub fn config(&self) -> &ForwarderConfig {
        &self.cfg
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Accounts for a finished loop and turns its report into the drain outcome.
fn settle(
    report: DrainReport,
    window: Option<DrainWindow>,
    bus: &Bus,
    stats: &Stats,
) -> Result<DrainReport, RuntimeError> {
    bus.publish(Notice::now(NoticeKind::Stopped).with_count(report.dispatched));
    if report.dropped == 0 {
        tracing::info!(dispatched = report.dispatched, "dispatcher stopped");
        return Ok(report);
    }

    let deadline = window.map(|w| w.deadline).unwrap_or_default();
    stats.dropped(report.dropped);
    bus.publish(Notice::now(NoticeKind::DrainTimedOut).with_count(report.dropped));
    tracing::warn!(
        ?deadline,
        dispatched = report.dispatched,
        dropped = report.dropped,
        "drain deadline exceeded; queued events dropped"
    );
    Err(RuntimeError::DrainTimeout {
        deadline,
        dropped: report.dropped,
    })
}

impl Drop for Forwarder {
    fn drop(&mut self) {
        // lets a running loop drain and exit instead of idling forever
        self.closing.cancel();
    }
}
