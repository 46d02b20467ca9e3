use std::sync::Arc;

use crate::config::Config;
use crate::services::llm::ChatBackend;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub llm: Arc<dyn ChatBackend>,
}

impl AppState {
    pub fn new(config: Config, llm: Arc<dyn ChatBackend>) -> Self {
        Self {
            config: Arc::new(config),
            llm,
        }
    }
}
