use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use tracing::info;

use crate::config::DatabaseConfig;

/// Connection pool shared by the PostgreSQL store and the readiness probe.
#[derive(Clone)]
pub struct Database {
    pub pool: Pool<Postgres>,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;

        info!(pool_size = config.pool_size, "Connected to PostgreSQL");
        Ok(Database { pool })
    }

    /// Creates the showtime, seat and booking tables if they are missing.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running seat reservation migrations...");
        sqlx::migrate!("./src/migrations").run(&self.pool).await?;
        info!("Migrations completed");
        Ok(())
    }

    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }
}
