use crate::pool::DbPool;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use services::auth::{SessionToken, UserId};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

pub struct PgSessionRepository {
    pool: DbPool,
}

impl PgSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn generate_session_token() -> String {
        format!("sess_{}", Uuid::new_v4().simple())
    }

    /// Tokens are only ever stored hashed
    pub(crate) fn hash_session_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Create a session and return the plaintext token, which is not stored
    pub async fn create(&self, user_id: UserId, expires_in_hours: i64) -> Result<SessionToken> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let id = Uuid::new_v4();
        let token = Self::generate_session_token();
        let now = Utc::now();
        let expires_at = now + Duration::hours(expires_in_hours);

        client
            .execute(
                r#"
            INSERT INTO sessions (id, user_id, token_hash, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
                &[
                    &id,
                    &user_id.0,
                    &Self::hash_session_token(&token),
                    &now,
                    &expires_at,
                ],
            )
            .await
            .context("Failed to create session")?;

        debug!("Created session: {} for user: {}", id, user_id);
        Ok(SessionToken(token))
    }
}

#[async_trait]
impl services::auth::SessionRepository for PgSessionRepository {
    async fn get_user_id_by_token(&self, token: &SessionToken) -> Result<Option<UserId>> {
        let client = self
            .pool
            .get()
            .await
            .context("Failed to get database connection")?;

        let row = client
            .query_opt(
                "SELECT user_id FROM sessions WHERE token_hash = $1 AND expires_at > $2",
                &[&Self::hash_session_token(&token.0), &Utc::now()],
            )
            .await
            .context("Failed to query session")?;

        row.map(|r| r.try_get::<_, Uuid>("user_id").map(UserId))
            .transpose()
            .context("Failed to read session row")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_hash_is_stable_hex_sha256() {
        let hash = PgSessionRepository::hash_session_token("sess_abc");
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, PgSessionRepository::hash_session_token("sess_abc"));
        assert_ne!(hash, PgSessionRepository::hash_session_token("sess_abd"));
    }

    #[test]
    fn test_generated_tokens_are_unique() {
        let a = PgSessionRepository::generate_session_token();
        let b = PgSessionRepository::generate_session_token();
        assert!(a.starts_with("sess_"));
        assert_ne!(a, b);
    }
}
