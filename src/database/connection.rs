use crate::config::DatabaseConfig;
use crate::error::{ReaderError, ReaderResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::info;

pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    /// Open a pool sized and timed from `config`
    pub async fn connect(config: &DatabaseConfig) -> ReaderResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.database_url())
            .await
            .map_err(|e| ReaderError::resource_acquisition(format!("cannot open pool: {e}")))?;

        info!(
            host = %config.host,
            database = %config.database,
            max_connections = config.max_connections,
            "Database pool created"
        );

        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;

        let health: i32 = row.get("health");
        Ok(health == 1)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
