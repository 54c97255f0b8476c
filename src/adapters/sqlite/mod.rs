//! SQLite adapters for the command-and-control core.

pub mod command_store;
pub mod connection;
pub mod host_store;
pub mod migrations;
pub mod push_store;
pub mod webhook_store;

pub use command_store::SqliteCommandStore;
pub use connection::{create_pool, create_test_pool, verify_connection, ConnectionError, PoolConfig};
pub use host_store::SqliteHostStore;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use push_store::SqlitePushStore;
pub use webhook_store::SqliteWebhookStore;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::config::DatabaseConfig;

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DomainError::ValidationFailed(format!("invalid stored timestamp {s:?}: {e}")))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(&s)).transpose()
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open (and create, if missing) a SQLite database at `database_url`,
/// applying every pending embedded migration.
pub async fn initialize_database(database_url: &str) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, None).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Open the database at `database.path` from a loaded configuration,
/// applying every pending embedded migration. The `sqlite:` scheme is
/// added here so callers only ever think in terms of filesystem paths.
pub async fn initialize_configured_database(database: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let database_url = format!("sqlite:{}", database.path);
    let pool_config = PoolConfig {
        max_connections: database.max_connections,
        ..PoolConfig::default()
    };
    let pool = create_pool(&database_url, Some(pool_config)).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
