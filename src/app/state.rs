//! Application state shared across HTTP and WebSocket handlers

use std::sync::Arc;

use crate::config::Config;
use crate::matchmaking::{self, MatchmakerHandle};

/// Shared application state. Cheap to clone: the Matchmaker itself lives in
/// its own actor task, reached only through `matchmaker` (spec §5).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub matchmaker: MatchmakerHandle,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let matchmaker = matchmaking::actor::spawn(&config);
        Self {
            config: Arc::new(config),
            matchmaker,
        }
    }
}
