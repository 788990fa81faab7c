pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{create_pool, DbPool};
pub use repositories::{PgRequestLogRepository, PgSessionRepository, PgUserRepository};

use anyhow::Result;
use std::sync::Arc;

/// PostgreSQL-backed implementations of the service ports
pub struct Database {
    pub users: Arc<PgUserRepository>,
    pub sessions: Arc<PgSessionRepository>,
    pub request_log: Arc<PgRequestLogRepository>,
    pool: DbPool,
}

impl Database {
    pub fn new(pool: DbPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            sessions: Arc::new(PgSessionRepository::new(pool.clone())),
            request_log: Arc::new(PgRequestLogRepository::new(pool.clone())),
            pool,
        }
    }

    pub async fn from_config(config: &config::DatabaseConfig) -> Result<Self> {
        let pool = create_pool(config).await?;
        Ok(Self::new(pool))
    }

    pub async fn run_migrations(&self) -> Result<()> {
        migrations::run(&self.pool).await
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}
