use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use services::auth::UserId;

/// `request_log` table: one row per accepted chat request
pub struct PgRequestLogRepository {
    pool: DbPool,
}

impl PgRequestLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl services::quota::RequestLogRepository for PgRequestLogRepository {
    async fn count_since(&self, user_id: UserId, since: DateTime<Utc>) -> Result<u64> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_one(
                "SELECT COUNT(*) FROM request_log WHERE user_id = $1 AND created_at >= $2",
                &[&user_id.0, &since],
            )
            .await
            .context("Failed to count requests")?;

        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn record(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        client
            .execute(
                "INSERT INTO request_log (user_id, created_at) VALUES ($1, $2)",
                &[&user_id.0, &at],
            )
            .await
            .context("Failed to record request")?;
        Ok(())
    }
}
