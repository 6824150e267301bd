//! Name → backend dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;

use sk_core::{Backend, BackendName, Context, Error, Result};

use crate::stan::StanBackend;
use crate::tfp::TfpBackend;

/// Registered backends plus the one selected by the context.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: BTreeMap<BackendName, Arc<dyn Backend>>,
    current: BackendName,
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.backends.keys().collect::<Vec<_>>())
            .field("current", &self.current)
            .finish()
    }
}

impl BackendRegistry {
    /// Empty registry selecting `current`.
    pub fn empty(current: BackendName) -> Self {
        Self { backends: BTreeMap::new(), current }
    }

    /// `stan` and `tfp`, configured from `ctx`; the current backend is `ctx.backend()`.
    pub fn with_defaults(ctx: &Context) -> Self {
        let mut registry = Self::empty(ctx.backend().clone());
        registry.register(Arc::new(StanBackend::from_context(ctx)));
        registry.register(Arc::new(TfpBackend::from_context(ctx)));
        registry
    }

    /// Add a backend, replacing any backend with the same name.
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        let name = backend.name();
        if self.backends.insert(name.clone(), backend).is_some() {
            log::debug!("replaced backend '{name}'");
        }
    }

    /// Backend registered as `name`.
    pub fn get(&self, name: &BackendName) -> Result<Arc<dyn Backend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownBackend(name.to_string()))
    }

    /// Backend selected by the context.
    pub fn current(&self) -> Result<Arc<dyn Backend>> {
        self.get(&self.current)
    }

    /// Name of the selected backend.
    pub fn current_name(&self) -> &BackendName {
        &self.current
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<BackendName> {
        self.backends.keys().cloned().collect()
    }
}
