use crate::config::Config;
use crate::converse::ConverseSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Active conversations (session_id -> session)
    pub sessions: Arc<RwLock<HashMap<String, Arc<ConverseSession>>>>,

    /// Service configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            config: Arc::new(config),
        }
    }
}
