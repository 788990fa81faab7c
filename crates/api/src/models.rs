use domain::Message;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every non-streaming failure
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Request body for `POST /v1/chat`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChatRequestBody {
    /// Full conversation so far, ending with the user's new message
    #[schema(value_type = Vec<Object>)]
    pub messages: Vec<Message>,
}

impl From<ChatRequestBody> for services::chat::ChatRequest {
    fn from(body: ChatRequestBody) -> Self {
        services::chat::ChatRequest {
            messages: body.messages,
        }
    }
}

/// Today's request usage for the caller
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct QuotaStatusResponse {
    pub limit: u32,
    pub used: u64,
    pub remaining: u32,
    /// Privileged users are never limited
    pub unlimited: bool,
    pub resets_at: chrono::DateTime<chrono::Utc>,
}

impl From<services::quota::QuotaStatus> for QuotaStatusResponse {
    fn from(status: services::quota::QuotaStatus) -> Self {
        Self {
            limit: status.limit,
            used: status.used,
            remaining: status.remaining,
            unlimited: status.unlimited,
            resets_at: status.resets_at,
        }
    }
}
