use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use services::auth::{User, UserId};
use tokio_postgres::Row;
use tracing::debug;
use uuid::Uuid;

pub struct PgUserRepository {
    pool: DbPool,
}

impl PgUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a user, or update the admin flag of an existing one with the same email
    pub async fn upsert(&self, email: &str, is_admin: bool) -> Result<User> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_one(
                r#"
            INSERT INTO users (id, email, is_admin, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE SET is_admin = EXCLUDED.is_admin
            RETURNING id, email, is_admin, created_at
            "#,
                &[&Uuid::new_v4(), &email, &is_admin, &Utc::now()],
            )
            .await
            .context("Failed to upsert user")?;

        let user = Self::row_to_user(&row)?;
        debug!("Upserted user: {}", user.id);
        Ok(user)
    }

    fn row_to_user(row: &Row) -> Result<User> {
        Ok(User {
            id: UserId(row.try_get("id")?),
            email: row.try_get("email")?,
            is_admin: row.try_get("is_admin")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl services::auth::UserRepository for PgUserRepository {
    async fn get_by_id(&self, id: UserId) -> Result<Option<User>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                "SELECT id, email, is_admin, created_at FROM users WHERE id = $1",
                &[&id.0],
            )
            .await
            .context("Failed to query user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }
}
