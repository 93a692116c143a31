//! SQLite adapters for module-owned stores.

pub mod connection;
pub mod migrations;
pub mod reminder_repository;
pub mod sequence_repository;
pub mod ticket_repository;

pub use connection::{create_pool, create_test_pool, ConnectionError, PoolConfig};
pub use migrations::{tickets_migrations, Migration, MigrationError, Migrator};
pub use reminder_repository::SqliteReminderRepository;
pub use sequence_repository::SqliteSequenceRepository;
pub use ticket_repository::SqliteTicketRepository;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};

/// Timestamps are stored as fixed-width RFC3339 (millisecond, `Z`) text so
/// that string order equals time order.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| parse_datetime(&s)).transpose()
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

/// Open (creating if absent) a store and bring its schema up to date.
pub async fn initialize_database(
    database_url: &str,
    config: PoolConfig,
    migrations: Vec<Migration>,
) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, Some(config)).await?;
    let migrator = Migrator::new(pool.clone());
    if let Err(err) = migrator.run_embedded_migrations(migrations).await {
        pool.close().await;
        return Err(err.into());
    }
    Ok(pool)
}

/// Create an in-memory test pool with the tickets schema applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(tickets_migrations()).await?;
    Ok(pool)
}
