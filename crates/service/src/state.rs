use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::FromRef;

use super::config::Config;
use super::database::{Database, DatabaseSetupError};
use super::relay::Relay;
use super::storage::{ContentStore, StorageError};

/// Main service state, cheap to clone into handlers
#[derive(Clone)]
pub struct State {
    database: Database,
    relay: Relay,
    store: ContentStore,
    posters: Arc<HashSet<String>>,
    gateway_label: Arc<str>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup the content store (creates the store and temp directories)
        let store = ContentStore::open(&config.store_path).await?;

        // 2. Setup database inside the store
        let sqlite_path = config.sqlite_path();
        tracing::info!("Database path: {}", sqlite_path.display());
        let database = Database::open(&sqlite_path).await?;

        // 3. Relay shares the database
        let relay = Relay::new(database.clone(), config.posters.clone());
        if config.posters.is_empty() {
            tracing::warn!("no posters configured, publishing and uploads are disabled");
        }

        Ok(Self {
            database,
            relay,
            store,
            posters: Arc::new(config.posters.clone()),
            gateway_label: Arc::from(config.gateway_label.as_str()),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn posters(&self) -> &HashSet<String> {
        &self.posters
    }

    pub fn gateway_label(&self) -> &str {
        &self.gateway_label
    }
}

impl FromRef<State> for Database {
    fn from_ref(state: &State) -> Self {
        state.database.clone()
    }
}

impl FromRef<State> for ContentStore {
    fn from_ref(state: &State) -> Self {
        state.store.clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("Database setup error: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Content store error: {0}")]
    StorageError(#[from] StorageError),
}
