// Application state module
// Shared, read-only state handed to every connection

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::types::Config;
use crate::db::Database;

/// Application state
pub struct AppState {
    pub config: Config,
    pub db: Database,

    // Cached config values for fast access without locks
    pub cached_access_log: Arc<AtomicBool>,
}

impl AppState {
    pub fn new(config: &Config, db: Database) -> Self {
        Self {
            config: config.clone(),
            db,
            cached_access_log: Arc::new(AtomicBool::new(config.logging.access_log)),
        }
    }
}
