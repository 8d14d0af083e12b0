//! Test utilities for database operations.
//!
//! Provides helpers for setting up and tearing down test databases.

use sea_orm::{ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr, Statement};
use tracing::info;

/// Test database configuration.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    pub port: u16,
    /// Database username.
    pub username: String,
    /// Database password.
    pub password: String,
    /// Database name.
    pub database: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("TEST_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TEST_DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5433),
            username: std::env::var("TEST_DB_USER")
                .unwrap_or_else(|_| "votebattle_test".to_string()),
            password: std::env::var("TEST_DB_PASSWORD")
                .unwrap_or_else(|_| "votebattle_test".to_string()),
            database: std::env::var("TEST_DB_NAME")
                .unwrap_or_else(|_| "votebattle_test".to_string()),
        }
    }
}

impl TestDbConfig {
    /// Get the database URL.
    #[must_use]
    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }

    /// Get URL for connecting to postgres database (for creating test DB).
    #[must_use]
    pub fn postgres_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/postgres",
            self.username, self.password, self.host, self.port
        )
    }
}

/// A test database context that manages the lifecycle of a test database.
pub struct TestDatabase {
    /// Database connection.
    pub conn: DatabaseConnection,
    /// Database configuration.
    pub config: TestDbConfig,
}

impl TestDatabase {
    /// Connect to the default test database and run migrations.
    pub async fn new() -> Result<Self, DbErr> {
        Self::with_config(TestDbConfig::default()).await
    }

    /// Connect with custom configuration and run migrations.
    pub async fn with_config(config: TestDbConfig) -> Result<Self, DbErr> {
        use sea_orm_migration::MigratorTrait;

        let conn = Database::connect(&config.database_url()).await?;
        crate::migrations::Migrator::up(&conn, None).await?;

        info!(database = %config.database, "Connected to test database");

        Ok(Self { conn, config })
    }

    /// Create a uniquely named test database (for parallel tests).
    pub async fn create_unique() -> Result<Self, DbErr> {
        let mut config = TestDbConfig::default();
        let unique_suffix = uuid::Uuid::new_v4().simple().to_string();
        config.database = format!("votebattle_test_{}", &unique_suffix[..8]);

        let postgres_conn = Database::connect(&config.postgres_url()).await?;
        let create_db = format!("CREATE DATABASE \"{}\"", config.database);
        postgres_conn
            .execute(Statement::from_string(DatabaseBackend::Postgres, create_db))
            .await?;
        postgres_conn.close().await?;

        info!(database = %config.database, "Created unique test database");

        Self::with_config(config).await
    }

    /// Get the database connection.
    #[must_use]
    pub const fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Remove every battle row.
    pub async fn cleanup(&self) -> Result<(), DbErr> {
        self.conn
            .execute(Statement::from_string(
                DatabaseBackend::Postgres,
                "TRUNCATE TABLE \"battle_votes\" RESTART IDENTITY".to_string(),
            ))
            .await?;

        info!("Cleaned up test database");
        Ok(())
    }
}

/// Test Redis configuration.
#[derive(Debug, Clone)]
pub struct TestRedisConfig {
    /// Redis host.
    pub host: String,
    /// Redis port.
    pub port: u16,
}

impl Default for TestRedisConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("TEST_REDIS_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("TEST_REDIS_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(6380),
        }
    }
}

impl TestRedisConfig {
    /// Get the Redis URL.
    #[must_use]
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.host, self.port)
    }
}
