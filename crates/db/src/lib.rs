//! Database layer for votebattle.
//!
//! Holds the shared `battle_votes` table used by the remote backend.

pub mod entities;
pub mod migrations;
pub mod repositories;
pub mod test_utils;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::log::LevelFilter;
use votebattle_common::{AppError, RemoteConfig};

/// Initialize database connection.
pub async fn init(config: &RemoteConfig) -> Result<DatabaseConnection, AppError> {
    let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::RemoteUnavailable("database URL is not set".to_string()))?;

    let mut opt = ConnectOptions::new(url);

    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(10))
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(LevelFilter::Debug);

    Database::connect(opt)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

/// Run pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), AppError> {
    use sea_orm_migration::MigratorTrait;
    migrations::Migrator::up(db, None)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}
