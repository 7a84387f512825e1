//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the one relay hub for the process and the config sessions need at
//! runtime. The hub is constructed here, once, and handed to every session.

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::hub::Hub;

/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<Hub>,
    pub config: Arc<RelayConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        Self { hub: Arc::new(Hub::new(config.queue_capacity)), config: Arc::new(config) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
