use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use services::quota::{QuotaDecision, QuotaServiceTrait};
use std::sync::Arc;
use tracing::{debug, warn};

use super::auth::AuthenticatedUser;
use crate::models::ErrorResponse;

/// State for quota middleware
#[derive(Clone)]
pub struct QuotaState {
    pub quota_service: Arc<dyn QuotaServiceTrait>,
}

impl QuotaState {
    pub fn new(quota_service: Arc<dyn QuotaServiceTrait>) -> Self {
        Self { quota_service }
    }
}

fn internal_error(message: &str) -> (StatusCode, axum::Json<ErrorResponse>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(ErrorResponse::new(message)),
    )
}

/// Gate chat requests on the caller's daily request count.
///
/// Runs after [`super::auth_middleware`]. A denied request is answered with 429
/// and is not recorded; an allowed one is recorded before the handler starts.
pub async fn quota_middleware(
    State(state): State<QuotaState>,
    request: Request,
    next: Next,
) -> Result<Response, (StatusCode, axum::Json<ErrorResponse>)> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone())
        .ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                axum::Json(ErrorResponse::new("Authentication required")),
            )
        })?;

    let decision = state.quota_service.authorize(&user).await.map_err(|e| {
        tracing::error!(user_id = %user.id, "Failed to check quota: {}", e);
        internal_error("Failed to check request quota")
    })?;

    match decision {
        QuotaDecision::Allowed { remaining } => {
            state.quota_service.record(user.id).await.map_err(|e| {
                tracing::error!(user_id = %user.id, "Failed to record request: {}", e);
                internal_error("Failed to record request")
            })?;
            debug!(user_id = %user.id, ?remaining, "Request admitted");
            Ok(next.run(request).await)
        }
        QuotaDecision::Denied { reason } => {
            warn!(user_id = %user.id, "Request denied: {}", reason);
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                axum::Json(ErrorResponse::new(reason)),
            ))
        }
    }
}
