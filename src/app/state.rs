//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::questions::QuestionBank;
use crate::game::MatchRegistry;
use crate::lobby::LobbyService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: Arc<LobbyService>,
    pub match_registry: Arc<MatchRegistry>,
}

impl AppState {
    pub fn new(config: Config, bank: QuestionBank) -> Self {
        let config = Arc::new(config);

        // Initialize match registry
        let match_registry = Arc::new(MatchRegistry::new());

        // Initialize lobby service (Arc for sharing across cloned AppState)
        let lobby = Arc::new(LobbyService::new(
            config.clone(),
            bank,
            match_registry.clone(),
        ));

        Self {
            config,
            lobby,
            match_registry,
        }
    }
}
