use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use services::auth::{AuthError, AuthServiceTrait, SessionToken, User};
use std::sync::Arc;
use tracing::{debug, error};

use crate::models::ErrorResponse;

/// Authenticated user information passed to route handlers
#[derive(Clone, Debug)]
pub struct AuthenticatedUser(pub User);

/// State for authentication middleware
#[derive(Clone)]
pub struct AuthState {
    pub auth_service: Arc<dyn AuthServiceTrait>,
}

impl AuthState {
    pub fn new(auth_service: Arc<dyn AuthServiceTrait>) -> Self {
        Self { auth_service }
    }
}

fn unauthorized(message: &str) -> (StatusCode, axum::Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        axum::Json(ErrorResponse::new(message)),
    )
}

/// Resolve the bearer session token to a user before anything else runs.
///
/// Rejected requests never reach the quota check or the model.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, axum::Json<ErrorResponse>)> {
    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    let Some(auth_value) = auth_header else {
        debug!("No authorization header found");
        return Err(unauthorized("Missing authorization header"));
    };

    let Some(token) = auth_value.strip_prefix("Bearer ") else {
        debug!("Authorization header does not start with 'Bearer '");
        return Err(unauthorized("Invalid authorization header format"));
    };

    let user = state
        .auth_service
        .authenticate(&SessionToken(token.trim().to_string()))
        .await
        .map_err(|e| match e {
            AuthError::Unauthorized => {
                debug!("Session token rejected");
                unauthorized("Invalid or expired session")
            }
            AuthError::InternalError(msg) => {
                error!("Authentication failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    axum::Json(ErrorResponse::new("Authentication failed")),
                )
            }
        })?;

    debug!(user_id = %user.id, "Authenticated request");
    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}
