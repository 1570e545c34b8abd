//! Shared application state.

use std::sync::Arc;

use storyloop_core::dispatch::GenerationDispatcher;
use storyloop_core::env::{Clock, IdSource};
use storyloop_core::store::GameStore;
use storyloop_gameplay::application::EngineSettings;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Clock for deterministic timestamps.
    pub clock: Arc<dyn Clock>,
    /// Source of new row and task ids.
    pub ids: Arc<dyn IdSource>,
    /// Transactional game store.
    pub store: Arc<dyn GameStore>,
    /// Hands generation tasks to the worker.
    pub dispatcher: Arc<dyn GenerationDispatcher>,
    /// Engine limits.
    pub settings: EngineSettings,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdSource>,
        store: Arc<dyn GameStore>,
        dispatcher: Arc<dyn GenerationDispatcher>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            clock,
            ids,
            store,
            dispatcher,
            settings,
        }
    }
}
