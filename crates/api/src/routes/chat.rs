use axum::{
    extract::{rejection::JsonRejection, Extension, Json, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json as ResponseJson, Response,
    },
};
use domain::StreamEvent;
use futures::stream::StreamExt;
use services::chat::{ChatError, ChatServiceTrait};
use std::{convert::Infallible, sync::Arc};
use tokio_util::sync::CancellationToken;

use crate::middleware::AuthenticatedUser;
use crate::models::{ChatRequestBody, ErrorResponse};

fn map_chat_error_to_status(error: &ChatError) -> StatusCode {
    match error {
        ChatError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// One SSE frame: `event: <type>` with the JSON-encoded event as data
pub fn to_sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.event_type())
        .data(serde_json::to_string(event).unwrap_or_default())
}

/// Stream an assistant answer, searching the web when the model asks to.
///
/// Dropping the response body (client disconnect) cancels generation and any
/// search in flight.
#[utoipa::path(
    post,
    path = "/v1/chat",
    request_body = ChatRequestBody,
    responses(
        (status = 200, description = "Event stream of the assistant's answer", content_type = "text/event-stream"),
        (status = 400, description = "Malformed message list", body = ErrorResponse),
        (status = 401, description = "Missing or invalid session", body = ErrorResponse),
        (status = 429, description = "Daily request limit reached", body = ErrorResponse),
    ),
    security(("session_token" = [])),
    tag = "Chat"
)]
pub async fn chat(
    State(service): State<Arc<dyn ChatServiceTrait>>,
    Extension(user): Extension<AuthenticatedUser>,
    body: Result<Json<ChatRequestBody>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(user_id = %user.0.id, "Rejected chat body: {}", rejection);
            return (
                StatusCode::BAD_REQUEST,
                ResponseJson(ErrorResponse::new(rejection.body_text())),
            )
                .into_response();
        }
    };

    let cancel = CancellationToken::new();
    match service
        .create_chat_stream(body.into(), &user.0, cancel.clone())
        .await
    {
        Ok(stream) => {
            tracing::info!(user_id = %user.0.id, "Returning chat event stream");

            let guard = cancel.drop_guard();
            let sse_stream = stream.map(move |event| {
                let _ = &guard;
                Ok::<_, Infallible>(to_sse_event(&event))
            });

            Sse::new(sse_stream)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        Err(error) => {
            let status = map_chat_error_to_status(&error);
            if status.is_server_error() {
                tracing::error!(user_id = %user.0.id, error = %error, "Failed to start chat stream");
            } else {
                tracing::debug!(user_id = %user.0.id, error = %error, "Chat request rejected");
            }
            let message = match &error {
                ChatError::InvalidRequest(msg) => msg.clone(),
                other => other.user_message(),
            };
            (status, ResponseJson(ErrorResponse::new(message))).into_response()
        }
    }
}
