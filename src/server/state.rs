//! Process-wide model state.
//!
//! Holds the single loaded model for the life of the process. The state is an
//! injected handle (cloned into every handler) rather than a global, and it
//! transitions from unloaded to loaded at most once.
use std::sync::{Arc, OnceLock};

use thiserror::Error;

use crate::embedder::Embedder;

/// Returned when a second model is offered to an already-loaded state.
#[derive(Error, Debug)]
#[error("model already loaded")]
pub struct AlreadyLoaded;

/// Shared handle to the loaded model, or an explicit "not ready" marker.
#[derive(Clone, Default)]
pub struct ModelState {
    slot: Arc<OnceLock<Arc<dyn Embedder>>>,
}

impl ModelState {
    /// A state with no model; every request is answered with 503.
    #[must_use]
    pub fn unloaded() -> Self {
        Self::default()
    }

    /// A state that is ready from the start.
    #[must_use]
    pub fn loaded(model: Arc<dyn Embedder>) -> Self {
        let state = Self::default();
        // fresh slot, cannot already be set
        let _ = state.slot.set(model);
        state
    }

    /// Install the model. Succeeds once; later calls keep the first model.
    pub fn initialize(&self, model: Arc<dyn Embedder>) -> Result<(), AlreadyLoaded> {
        self.slot.set(model).map_err(|_| AlreadyLoaded)
    }

    /// The loaded model, or `None` while unloaded. Never blocks.
    #[must_use]
    pub fn get(&self) -> Option<Arc<dyn Embedder>> {
        self.slot.get().cloned()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }
}
