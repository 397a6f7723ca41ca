use std::sync::Arc;

use shared_config::AppConfig;
use shared_database::{ClinicStore, InMemoryStore, PostgrestStore};

/// Shared handler state: configuration plus the record store.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn ClinicStore>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn ClinicStore>) -> Self {
        Self { config, store }
    }

    /// Picks the store named by `STORE_BACKEND`.
    pub fn from_config(config: AppConfig) -> Self {
        let store: Arc<dyn ClinicStore> = match config.store_backend.as_str() {
            "memory" => Arc::new(InMemoryStore::new()),
            _ => Arc::new(PostgrestStore::new(&config)),
        };
        Self::new(Arc::new(config), store)
    }
}
