pub mod ports;

use async_trait::async_trait;
pub use ports::*;
use std::sync::Arc;

/// Resolves bearer tokens to users through the session and user stores.
/// Fails closed: any token that does not lead to an existing user is `Unauthorized`.
pub struct AuthService {
    session_repository: Arc<dyn SessionRepository>,
    user_repository: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(
        session_repository: Arc<dyn SessionRepository>,
        user_repository: Arc<dyn UserRepository>,
    ) -> Self {
        Self {
            session_repository,
            user_repository,
        }
    }
}

#[async_trait]
impl AuthServiceTrait for AuthService {
    async fn authenticate(&self, token: &SessionToken) -> Result<User, AuthError> {
        if token.0.trim().is_empty() {
            return Err(AuthError::Unauthorized);
        }

        let user_id = self
            .session_repository
            .get_user_id_by_token(token)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to look up session: {e}")))?
            .ok_or(AuthError::Unauthorized)?;

        let user = self
            .user_repository
            .get_by_id(user_id)
            .await
            .map_err(|e| AuthError::InternalError(format!("Failed to look up user: {e}")))?;

        match user {
            Some(user) => Ok(user),
            None => {
                tracing::warn!(user_id = %user_id, "Session refers to an unknown user");
                Err(AuthError::Unauthorized)
            }
        }
    }
}
