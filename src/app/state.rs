//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::CardCatalog;
use crate::registry::ConnectionRegistry;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: Arc<ConnectionRegistry>,
}

impl AppState {
    pub fn new(config: Config, catalog: CardCatalog) -> Self {
        let config = Arc::new(config);

        let registry = Arc::new(ConnectionRegistry::new(
            Arc::new(catalog),
            config.game.clone(),
            config.outbound_queue_capacity,
        ));

        Self { config, registry }
    }
}
