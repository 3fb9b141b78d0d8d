use std::sync::Arc;

use anyhow::Result;
use agenda_core::{EventStore, SystemClock, TokioTimer, TracingSink};
use tokio::runtime::Handle;

use crate::config::ServerConfig;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: EventStore,
    pub occurrence_limit: usize,
}

impl AppState {
    /// Wall-clock store whose reminders run on the current tokio runtime.
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let timer = TokioTimer::new(Handle::try_current()?);
        let store = EventStore::new(Arc::new(SystemClock), Arc::new(timer), Arc::new(TracingSink));

        Ok(AppState::with_store(store, config.occurrence_limit))
    }

    pub fn with_store(store: EventStore, occurrence_limit: usize) -> Self {
        AppState {
            store,
            occurrence_limit,
        }
    }
}
