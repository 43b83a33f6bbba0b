mod content_queries;
mod event_queries;
mod sqlite;

use std::ops::Deref;
use std::path::Path;

use sqlx::SqlitePool;

pub use content_queries::ContentRecord;

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Database {
    /// Open (creating if needed) the database file at `path` and bring its
    /// schema up to date
    pub async fn open(path: &Path) -> Result<Self, DatabaseSetupError> {
        let pool = sqlite::connect_sqlite(path).await?;
        sqlite::migrate_sqlite(&pool).await?;
        Ok(Database::new(pool))
    }

    /// A private in-memory database, used by tests
    pub async fn in_memory() -> Result<Self, DatabaseSetupError> {
        let pool = sqlite::connect_sqlite_memory().await?;
        sqlite::migrate_sqlite(&pool).await?;
        Ok(Database::new(pool))
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }
}

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("error occurred while attempting database migration: {0}")]
    MigrationFailed(sqlx::migrate::MigrateError),

    #[error("unable to perform initial connection and check of the database: {0}")]
    Unavailable(sqlx::Error),
}
