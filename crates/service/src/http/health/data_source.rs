use std::fmt::Debug;
use std::ops::Deref;
use std::sync::Arc;

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use http::request::Parts;

use crate::database::Database;
use crate::storage::ContentStore;

/// Something the service needs before it can take traffic
#[async_trait]
pub trait DataSource {
    async fn is_ready(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DataSourceError {
    #[error("database is not answering")]
    Database,
    #[error("content store directory is unavailable")]
    Store,
}

pub type DynDataSource = Arc<dyn DataSource + Send + Sync>;

/// Extractor handing readiness handlers the service's data sources
pub struct StateDataSource(DynDataSource);

impl Debug for StateDataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateDataSource").finish()
    }
}

impl StateDataSource {
    #[cfg(test)]
    pub fn new(dds: DynDataSource) -> Self {
        Self(dds)
    }
}

impl Deref for StateDataSource {
    type Target = DynDataSource;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

struct ServiceSources {
    db: Database,
    store: ContentStore,
}

#[async_trait]
impl DataSource for ServiceSources {
    async fn is_ready(&self) -> Result<(), DataSourceError> {
        sqlx::query("SELECT 1")
            .execute(self.db.deref())
            .await
            .map_err(|_| DataSourceError::Database)?;
        match tokio::fs::metadata(self.store.root()).await {
            Ok(meta) if meta.is_dir() => Ok(()),
            _ => Err(DataSourceError::Store),
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for StateDataSource
where
    Database: FromRef<S>,
    ContentStore: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ();

    async fn from_request_parts(_parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        Ok(StateDataSource(Arc::new(ServiceSources {
            db: Database::from_ref(state),
            store: ContentStore::from_ref(state),
        })))
    }
}
