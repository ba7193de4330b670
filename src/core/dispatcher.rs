//! # Dispatch loop: one task fanning events out to every backend.
//!
//! The loop takes one event at a time off the queue, snapshots the registry
//! and calls each backend in registration order. Because fan-out for event
//! `N` completes before event `N+1` is dequeued, each backend observes events
//! in admission order.
//!
//! ## Per-backend call
//! ```text
//! snapshot ─► for entry in snapshot:
//!               route by kind ─► handle_success / handle_failure
//!                 └─ catch_unwind ─► timeout(min(entry.timeout | default, time left to drain))
//!                      ├─ Ok(Ok)         ─► delivered
//!                      ├─ Ok(Err(e))     ─► DispatchError::Failed
//!                      ├─ panic          ─► DispatchError::Panicked
//!                      ├─ elapsed        ─► DispatchError::Timeout
//!                      └─ drain deadline ─► DispatchError::Abandoned
//! ```
//! A `DispatchError` is counted, logged and published as a `DispatchFailed`
//! notice, then the loop moves to the next backend. Nothing is retried here.
//!
//! ## Phases
//! - **running**: dispatch until `closing` is cancelled.
//! - **draining**: close the receiver, dispatch what was admitted until the
//!   queue is empty or the `DrainWindow` closes; whatever is left is
//!   discarded and counted.
//!
//! Once the window closes, the event in hand is cut short: the call in flight
//! and every backend not yet reached are reported as `Abandoned`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::queue::EventReceiver;
use crate::core::registry::{Entry, Registry};
use crate::core::state::{DrainReport, DrainWindow};
use crate::core::stats::Stats;
use crate::error::DispatchError;
use crate::events::{Bus, Event, EventKind, Notice, NoticeKind};

pub(crate) struct Dispatcher {
    registry: Arc<Registry>,
    stats: Arc<Stats>,
    bus: Bus,
    default_timeout: Option<Duration>,
}

impl Dispatcher {
    pub(crate) fn new(
        registry: Arc<Registry>,
        stats: Arc<Stats>,
        bus: Bus,
        default_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry,
            stats,
            bus,
            default_timeout,
        }
    }

    /// Runs both phases to completion and reports the draining phase.
    ///
    /// `window` is read once `closing` fires; `None` drains without a deadline.
    pub(crate) async fn run(
        self,
        mut rx: EventReceiver,
        closing: CancellationToken,
        window: watch::Receiver<Option<DrainWindow>>,
    ) -> DrainReport {
        loop {
            tokio::select! {
                biased;
                _ = closing.cancelled() => break,
                ev = rx.dequeue() => match ev {
                    Some(ev) => self.dispatch(&ev, None).await,
                    None => return DrainReport::default(),
                },
            }
        }

        rx.close();
        let until = window.borrow().as_ref().map(|w| w.until);
        let mut report = DrainReport::default();
        loop {
            tokio::select! {
                biased;
                _ = expiry(until) => break,
                ev = rx.dequeue() => match ev {
                    Some(ev) => {
                        self.dispatch(&ev, until).await;
                        report.dispatched += 1;
                    }
                    None => break,
                },
            }
        }
        report.dropped = rx.discard_remaining();
        report
    }

    /// Fans one event out to the current snapshot of backends.
    ///
    /// With `until` set, no call runs past that instant.
    pub(crate) async fn dispatch(&self, ev: &Event, until: Option<Instant>) {
        self.stats.dispatched();
        let snapshot = self.registry.snapshot();
        for entry in snapshot.entries() {
            match self.call(entry, ev, until).await {
                Ok(()) => self.stats.delivered(),
                Err(err) => self.report(&err, ev),
            }
        }
    }

    async fn call(
        &self,
        entry: &Entry,
        ev: &Event,
        until: Option<Instant>,
    ) -> Result<(), DispatchError> {
        let limit = entry.timeout.or(self.default_timeout);
        let left = match until {
            Some(at) => match at.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Some(left),
                _ => {
                    return Err(DispatchError::Abandoned {
                        backend: entry.identity.clone(),
                    });
                }
            },
            None => None,
        };
        // the drain window wins when it is the tighter bound
        let (bound, cut_by_drain) = match (limit, left) {
            (Some(l), Some(w)) if w < l => (Some(w), true),
            (Some(l), _) => (Some(l), false),
            (None, Some(w)) => (Some(w), true),
            (None, None) => (None, false),
        };

        let fut = match ev.kind() {
            EventKind::Success => entry.backend.handle_success(ev),
            EventKind::Failure => entry.backend.handle_failure(ev),
        };
        let guarded = AssertUnwindSafe(fut).catch_unwind();

        let res = match bound {
            Some(dur) => match tokio::time::timeout(dur, guarded).await {
                Ok(res) => res,
                Err(_elapsed) if cut_by_drain => {
                    return Err(DispatchError::Abandoned {
                        backend: entry.identity.clone(),
                    });
                }
                Err(_elapsed) => {
                    return Err(DispatchError::Timeout {
                        backend: entry.identity.clone(),
                        timeout: dur,
                    });
                }
            },
            None => guarded.await,
        };

        match res {
            Ok(Ok(())) => Ok(()),
            Ok(Err(error)) => Err(DispatchError::Failed {
                backend: entry.identity.clone(),
                error,
            }),
            Err(panic_err) => Err(DispatchError::Panicked {
                backend: entry.identity.clone(),
                info: panic_info(&*panic_err),
            }),
        }
    }

    fn report(&self, err: &DispatchError, ev: &Event) {
        self.stats.failed();
        tracing::warn!(
            backend = %err.backend(),
            seq = ev.seq(),
            label = err.as_label(),
            error = %err,
            "backend dispatch failed"
        );
        self.bus.publish(
            Notice::now(NoticeKind::DispatchFailed)
                .with_backend(err.backend().clone())
                .with_reason(err.to_string())
                .with_event_seq(ev.seq()),
        );
    }
}

async fn expiry(until: Option<Instant>) {
    match until {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

pub(crate) fn panic_info(any: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = any.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = any.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::backends::{Backend, Identity};
    use crate::core::queue;
    use crate::error::BackendError;

    #[derive(Default)]
    struct Recorder {
        id: &'static str,
        seen: Mutex<Vec<(EventKind, String)>>,
    }

    #[async_trait]
    impl Backend for Recorder {
        fn identity(&self) -> Identity {
            Identity::from(self.id)
        }

        async fn handle_success(&self, ev: &Event) -> Result<(), BackendError> {
            self.seen.lock().unwrap().push((ev.kind(), ev.name().to_string()));
            Ok(())
        }

        async fn handle_failure(&self, ev: &Event) -> Result<(), BackendError> {
            self.seen.lock().unwrap().push((ev.kind(), ev.name().to_string()));
            Ok(())
        }
    }

    enum Misbehave {
        Fail,
        Panic,
        Hang,
    }

    #[async_trait]
    impl Backend for Misbehave {
        fn identity(&self) -> Identity {
            match self {
                Misbehave::Fail => Identity::from("fail"),
                Misbehave::Panic => Identity::from("panic"),
                Misbehave::Hang => Identity::from("hang"),
            }
        }

        async fn handle_success(&self, _ev: &Event) -> Result<(), BackendError> {
            match self {
                Misbehave::Fail => Err(BackendError::other("refused")),
                Misbehave::Panic => panic!("handler blew up"),
                Misbehave::Hang => {
                    std::future::pending::<()>().await;
                    Ok(())
                }
            }
        }

        fn handler_timeout(&self) -> Option<Duration> {
            matches!(self, Misbehave::Hang).then_some(Duration::from_millis(20))
        }
    }

    fn dispatcher(bus: &Bus) -> (Dispatcher, Arc<Registry>, Arc<Stats>) {
        let registry = Arc::new(Registry::new(bus.clone()));
        let stats = Arc::new(Stats::default());
        let d = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&stats),
            bus.clone(),
            None,
        );
        (d, registry, stats)
    }

    #[tokio::test]
    async fn routes_by_kind() {
        let bus = Bus::new(16);
        let (d, registry, _) = dispatcher(&bus);
        let rec = Arc::new(Recorder {
            id: "rec",
            ..Recorder::default()
        });
        registry.add(rec.clone());

        d.dispatch(&Event::success("GET", "/ok", 1.0, 1), None).await;
        d.dispatch(&Event::failure("GET", "/bad", None, "boom"), None).await;

        assert_eq!(
            *rec.seen.lock().unwrap(),
            vec![
                (EventKind::Success, "/ok".to_string()),
                (EventKind::Failure, "/bad".to_string()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn misbehaving_backends_do_not_affect_others() {
        let bus = Bus::new(16);
        let mut notices = bus.subscribe();
        let (d, registry, stats) = dispatcher(&bus);
        let rec = Arc::new(Recorder {
            id: "rec",
            ..Recorder::default()
        });
        registry.add(Arc::new(Misbehave::Fail));
        registry.add(Arc::new(Misbehave::Panic));
        registry.add(Arc::new(Misbehave::Hang));
        registry.add(rec.clone());

        let ev = Event::success("GET", "/", 1.0, 1);
        d.dispatch(&ev, None).await;

        assert_eq!(rec.seen.lock().unwrap().len(), 1);
        let snap = stats.snapshot();
        assert_eq!(snap.dispatched, 1);
        assert_eq!(snap.failed, 3);
        assert_eq!(snap.delivered, 1);

        let failed: Vec<_> = std::iter::from_fn(|| notices.try_recv().ok())
            .filter(|n| n.kind == NoticeKind::DispatchFailed)
            .collect();
        assert_eq!(failed.len(), 3);
        assert!(failed.iter().all(|n| n.event_seq == Some(ev.seq())));
        assert_eq!(failed[1].backend.as_deref(), Some("panic"));
        assert!(failed[1].reason.as_deref().unwrap().contains("handler blew up"));
        assert!(failed[2].reason.as_deref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn drain_flushes_admitted_events() {
        let bus = Bus::new(16);
        let (d, registry, _) = dispatcher(&bus);
        let rec = Arc::new(Recorder {
            id: "rec",
            ..Recorder::default()
        });
        registry.add(rec.clone());

        let closing = CancellationToken::new();
        let (tx, rx) = queue::channel(
            8,
            Duration::ZERO,
            closing.clone(),
            Arc::new(Stats::default()),
            bus.clone(),
        );
        for name in ["/1", "/2", "/3"] {
            tx.try_enqueue(Event::success("GET", name, 1.0, 1)).unwrap();
        }
        closing.cancel();

        let (_window, unbounded) = watch::channel(None);
        let report = d.run(rx, closing, unbounded).await;
        assert_eq!(report.dropped, 0);
        let names: Vec<_> = rec.seen.lock().unwrap().iter().map(|(_, n)| n.clone()).collect();
        assert_eq!(names, vec!["/1", "/2", "/3"]);
        // closing was cancelled before the loop started, so all three are drained
        assert_eq!(report.dispatched, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_window_discards_and_counts_the_rest() {
        let bus = Bus::new(16);
        let (d, _registry, _) = dispatcher(&bus);
        let closing = CancellationToken::new();
        let (tx, rx) = queue::channel(
            8,
            Duration::ZERO,
            closing.clone(),
            Arc::new(Stats::default()),
            bus.clone(),
        );
        for _ in 0..4 {
            tx.try_enqueue(Event::success("GET", "/", 1.0, 1)).unwrap();
        }
        let spent = DrainWindow::starting_now(Duration::ZERO);
        let (_window, closed) = watch::channel(Some(spent));
        closing.cancel();

        let report = d.run(rx, closing, closed).await;
        assert_eq!(report, DrainReport { dispatched: 0, dropped: 4 });
    }

    /// Never finishes and sets no timeout of its own.
    struct Stuck;

    #[async_trait]
    impl Backend for Stuck {
        fn identity(&self) -> Identity {
            Identity::from("stuck")
        }

        async fn handle_success(&self, _ev: &Event) -> Result<(), BackendError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_window_cuts_the_call_in_flight_and_skips_the_rest() {
        let bus = Bus::new(16);
        let mut notices = bus.subscribe();
        let (d, registry, stats) = dispatcher(&bus);
        let rec = Arc::new(Recorder {
            id: "rec",
            ..Recorder::default()
        });
        registry.add(Arc::new(Stuck));
        registry.add(rec.clone());

        let started = Instant::now();
        let until = started + Duration::from_secs(1);
        d.dispatch(&Event::success("GET", "/", 1.0, 1), Some(until)).await;
        let took = started.elapsed();
        assert!(took >= Duration::from_secs(1) && took < Duration::from_millis(1100));

        assert!(rec.seen.lock().unwrap().is_empty());
        assert_eq!(stats.snapshot().failed, 2);
        let failed: Vec<_> = std::iter::from_fn(|| notices.try_recv().ok())
            .filter(|n| n.kind == NoticeKind::DispatchFailed)
            .collect();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].backend.as_deref(), Some("stuck"));
        assert_eq!(failed[1].backend.as_deref(), Some("rec"));
        assert!(failed.iter().all(|n| n.reason.as_deref().unwrap().contains("abandoned")));
    }

    #[test]
    fn panic_payloads_are_rendered() {
        assert_eq!(panic_info(&"static"), "static");
        assert_eq!(panic_info(&String::from("owned")), "owned");
        assert_eq!(panic_info(&42_u8), "unknown panic");
    }
}
