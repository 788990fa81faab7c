use crate::models::{ChatRequestBody, ErrorResponse, QuotaStatusResponse};
use crate::routes::health::HealthResponse;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Search Chat API",
        description = "Streaming chat with web search. Answers are delivered as server-sent events.",
        version = "0.0.0"
    ),
    paths(
        crate::routes::chat::chat,
        crate::routes::quota::quota_status,
        crate::routes::health::health_check,
    ),
    components(schemas(ChatRequestBody, ErrorResponse, QuotaStatusResponse, HealthResponse)),
    modifiers(&SecurityAddon),
    tags(
        (name = "Chat", description = "Streaming chat completions"),
        (name = "Quota", description = "Daily request allowance"),
        (name = "Health", description = "Liveness"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "session_token",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Session token issued at sign-in"))
                        .build(),
                ),
            );
        }
    }
}
