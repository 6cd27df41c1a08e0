use std::sync::Arc;

use crate::{config::AppConfig, repository::ledger_store::LedgerStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<LedgerStore>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            store: Arc::new(LedgerStore::new()),
        }
    }
}
