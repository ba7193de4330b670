//! # Backend registry - the live set of sinks.
//!
//! The registry holds the backends currently receiving events, keyed by
//! [`Identity`]. It is mutated by administrative callers (any thread, any
//! time) and read by the dispatch loop once per event.
//!
//! ## Architecture
//! ```text
//! add(backend) ──┐                      ┌──► Snapshot (event N)   ─► fan-out
//! remove(id)   ──┼─► RwLock<Arc<Vec>> ──┤
//!                │   (copy-on-write)    └──► Snapshot (event N+1) ─► fan-out
//! ```
//!
//! ## Rules
//! - `add` inserts or **replaces** by identity; a replacement keeps its position.
//! - `remove` of a missing identity is a no-op.
//! - `snapshot` is an `Arc` clone: writers copy the list only while a snapshot
//!   is alive, and never change a snapshot already handed out.
//! - The lock is never held across `.await` or while calling backend code.
//! - Iteration order is registration order, so it is deterministic per run.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use crate::backends::{Backend, Identity};
use crate::events::{Bus, Notice, NoticeKind};

/// One registered backend with the metadata captured at registration.
#[derive(Clone)]
pub(crate) struct Entry {
    pub(crate) identity: Identity,
    pub(crate) timeout: Option<Duration>,
    pub(crate) backend: Arc<dyn Backend>,
}

/// Immutable view of the registry taken for one dispatch cycle.
#[derive(Clone)]
pub struct Snapshot {
    entries: Arc<Vec<Entry>>,
}

impl Snapshot {
    pub(crate) fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Identities in dispatch order.
    pub fn identities(&self) -> Vec<Identity> {
        self.entries.iter().map(|e| e.identity.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concurrent set of backends keyed by identity.
pub struct Registry {
    entries: RwLock<Arc<Vec<Entry>>>,
    bus: Bus,
}

impl Registry {
    /// Creates an empty registry reporting changes on `bus`.
    pub fn new(bus: Bus) -> Self {
        Self {
            entries: RwLock::new(Arc::new(Vec::new())),
            bus,
        }
    }

    /// Registers `backend`, replacing any backend with the same identity.
    ///
    /// Returns the replaced backend, if any.
    pub fn add(&self, backend: Arc<dyn Backend>) -> Option<Arc<dyn Backend>> {
        let entry = Entry {
            identity: backend.identity(),
            timeout: backend.handler_timeout(),
            backend,
        };
        let identity = entry.identity.clone();

        let replaced = {
            let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let entries = Arc::make_mut(&mut *guard);
            match entries.iter().position(|e| e.identity == identity) {
                Some(i) => Some(std::mem::replace(&mut entries[i], entry).backend),
                None => {
                    entries.push(entry);
                    None
                }
            }
        };

        let kind = if replaced.is_some() {
            tracing::debug!(backend = %identity, "backend replaced");
            NoticeKind::BackendReplaced
        } else {
            tracing::debug!(backend = %identity, "backend added");
            NoticeKind::BackendAdded
        };
        self.bus.publish(Notice::now(kind).with_backend(identity));
        replaced
    }

    /// Unregisters the backend with the given identity; no-op if absent.
    pub fn remove(&self, identity: impl AsRef<str>) -> Option<Arc<dyn Backend>> {
        let identity = identity.as_ref();
        let removed = {
            let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            match guard.iter().position(|e| e.identity.as_str() == identity) {
                Some(i) => Some(Arc::make_mut(&mut *guard).remove(i)),
                None => None,
            }
        };

        let entry = removed?;
        tracing::debug!(backend = %entry.identity, "backend removed");
        self.bus
            .publish(Notice::now(NoticeKind::BackendRemoved).with_backend(entry.identity));
        Some(entry.backend)
    }

    /// Returns the current set of backends for iteration.
    pub fn snapshot(&self) -> Snapshot {
        let guard = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Snapshot {
            entries: Arc::clone(&guard),
        }
    }

    pub fn contains(&self, identity: impl AsRef<str>) -> bool {
        let identity = identity.as_ref();
        self.snapshot()
            .entries()
            .iter()
            .any(|e| e.identity.as_str() == identity)
    }

    /// Registered identities in dispatch order.
    pub fn identities(&self) -> Vec<Identity> {
        self.snapshot().identities()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Named(&'static str);

    #[async_trait]
    impl Backend for Named {
        fn identity(&self) -> Identity {
            Identity::from(self.0)
        }
    }

    fn named(id: &'static str) -> Arc<dyn Backend> {
        Arc::new(Named(id))
    }

    #[test]
    fn same_identity_replaces_in_place() {
        let reg = Registry::new(Bus::new(16));
        assert!(reg.add(named("a")).is_none());
        assert!(reg.add(named("b")).is_none());
        assert!(reg.add(named("a")).is_some());

        assert_eq!(reg.len(), 2);
        assert_eq!(
            reg.identities(),
            vec![Identity::from("a"), Identity::from("b")]
        );
    }

    #[test]
    fn removing_missing_identity_is_a_noop() {
        let reg = Registry::new(Bus::new(16));
        reg.add(named("a"));
        assert!(reg.remove("missing").is_none());
        assert!(reg.remove("a").is_some());
        assert!(reg.remove("a").is_none());
        assert!(reg.is_empty());
    }

    #[test]
    fn snapshots_are_unaffected_by_later_changes() {
        let reg = Registry::new(Bus::new(16));
        reg.add(named("a"));
        let before = reg.snapshot();

        reg.add(named("b"));
        reg.remove("a");

        assert_eq!(before.identities(), vec![Identity::from("a")]);
        assert_eq!(reg.identities(), vec![Identity::from("b")]);
    }

    #[tokio::test]
    async fn changes_are_published_as_notices() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let reg = Registry::new(bus);

        reg.add(named("a"));
        reg.add(named("a"));
        reg.remove("a");
        reg.remove("a");

        let kinds: Vec<NoticeKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|n| n.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                NoticeKind::BackendAdded,
                NoticeKind::BackendReplaced,
                NoticeKind::BackendRemoved,
            ]
        );
    }

    #[test]
    fn concurrent_writers_never_duplicate_an_identity() {
        let reg = Arc::new(Registry::new(Bus::new(1)));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        reg.add(named(if i % 2 == 0 { "even" } else { "odd" }));
                        if i % 7 == 0 {
                            reg.remove("odd");
                        }
                        let snap = reg.snapshot();
                        let ids = snap.identities();
                        let mut dedup = ids.clone();
                        dedup.sort();
                        dedup.dedup();
                        assert_eq!(ids.len(), dedup.len());
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert!(reg.contains("even"));
        assert!(reg.len() <= 2);
    }
}
