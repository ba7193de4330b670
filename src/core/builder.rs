use std::sync::Arc;

use crate::backends::Backend;
use crate::core::{config::ForwarderConfig, forwarder::Forwarder};

/// Builder for constructing a [`Forwarder`] with an initial set of backends.
pub struct ForwarderBuilder {
    cfg: ForwarderConfig,
    backends: Vec<Arc<dyn Backend>>,
}

impl ForwarderBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: ForwarderConfig) -> Self {
        Self {
            cfg,
            backends: Vec::new(),
        }
    }

    /// Adds one backend to register at build time.
    pub fn with_backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Adds several backends; later ones replace earlier ones with the same identity.
    pub fn with_backends(mut self, backends: impl IntoIterator<Item = Arc<dyn Backend>>) -> Self {
        self.backends.extend(backends);
        self
    }

    /// Builds the forwarder in the `Idle` state.
    ///
    /// Does not need a runtime; the dispatch task is spawned by `start()`.
    pub fn build(self) -> Arc<Forwarder> {
        let fwd = Forwarder::new_internal(self.cfg);
        for backend in self.backends {
            fwd.register_backend(backend);
        }
        Arc::new(fwd)
    }
}
