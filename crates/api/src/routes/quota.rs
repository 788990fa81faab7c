use axum::{
    extract::{Extension, State},
    http::StatusCode,
    response::Json as ResponseJson,
};
use services::quota::QuotaServiceTrait;
use std::sync::Arc;

use crate::middleware::AuthenticatedUser;
use crate::models::{ErrorResponse, QuotaStatusResponse};

/// Today's request usage for the caller
#[utoipa::path(
    get,
    path = "/v1/quota",
    responses(
        (status = 200, description = "Usage for the current UTC day", body = QuotaStatusResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
    ),
    security(("session_token" = [])),
    tag = "Quota"
)]
pub async fn quota_status(
    State(quota_service): State<Arc<dyn QuotaServiceTrait>>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<ResponseJson<QuotaStatusResponse>, (StatusCode, ResponseJson<ErrorResponse>)> {
    let status = quota_service.status(&user.0).await.map_err(|e| {
        tracing::error!(user_id = %user.0.id, "Failed to read quota status: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ResponseJson(ErrorResponse::new("Failed to read quota status")),
        )
    })?;

    Ok(ResponseJson(status.into()))
}
