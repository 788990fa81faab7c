pub mod middleware;
pub mod models;
pub mod openapi;
pub mod routes;

use crate::{
    middleware::{auth_middleware, quota_middleware, AuthState, QuotaState},
    openapi::ApiDoc,
    routes::health::HealthState,
};
use anyhow::Context;
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use config::ApiConfig;
use database::Database;
use inference_providers::{InferenceProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider};
use services::{
    auth::{AuthService, AuthServiceTrait},
    chat::{ChatServiceImpl, ChatServiceTrait, OrchestratorConfig, StreamOrchestrator},
    quota::{QuotaService, QuotaServiceTrait},
    tools::{default_registry, BraveWebSearchProvider, WebSearchProviderTrait},
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;

/// Services the router is built from
#[derive(Clone)]
pub struct AppServices {
    pub auth_service: Arc<dyn AuthServiceTrait>,
    pub quota_service: Arc<dyn QuotaServiceTrait>,
    pub chat_service: Arc<dyn ChatServiceTrait>,
}

/// Connect to PostgreSQL and run migrations
pub async fn init_database(db_config: &config::DatabaseConfig) -> anyhow::Result<Arc<Database>> {
    let database = Database::from_config(db_config)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Starting database migrations...");
    database
        .run_migrations()
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations completed.");

    Ok(Arc::new(database))
}

pub fn init_inference_provider(
    model_config: &config::ModelConfig,
) -> anyhow::Result<Arc<dyn InferenceProvider>> {
    let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::new(
        model_config.base_url.clone(),
        model_config.api_key.clone(),
        Some(model_config.timeout_seconds),
    ))
    .map_err(|e| anyhow::anyhow!("Failed to create model client: {e}"))?;

    tracing::info!(
        base_url = %model_config.base_url,
        model = %model_config.name,
        "Configured inference provider"
    );
    Ok(Arc::new(provider))
}

pub fn init_search_provider(
    search_config: &config::SearchConfig,
) -> anyhow::Result<Arc<dyn WebSearchProviderTrait>> {
    let provider = BraveWebSearchProvider::new(search_config)
        .map_err(|e| anyhow::anyhow!("Failed to create search client: {e}"))?;
    Ok(Arc::new(provider))
}

/// Wire the domain services over the database and the two remote collaborators
pub fn init_services(
    database: Arc<Database>,
    inference_provider: Arc<dyn InferenceProvider>,
    search_provider: Arc<dyn WebSearchProviderTrait>,
    config: &ApiConfig,
) -> AppServices {
    let auth_service = Arc::new(AuthService::new(
        database.sessions.clone(),
        database.users.clone(),
    ));
    let quota_service = Arc::new(QuotaService::new(
        database.request_log.clone(),
        config.quota.limit,
    ));

    let orchestrator = StreamOrchestrator::new(
        inference_provider,
        Arc::new(default_registry(search_provider)),
        OrchestratorConfig::from_config(&config.chat, config.model.name.clone()),
    );
    let chat_service = Arc::new(ChatServiceImpl::new(Arc::new(orchestrator)));

    AppServices {
        auth_service,
        quota_service,
        chat_service,
    }
}

/// Build the complete application router
pub fn build_app(services: AppServices) -> Router {
    let auth_state = AuthState::new(services.auth_service.clone());

    let chat_routes = build_chat_routes(
        services.chat_service.clone(),
        services.quota_service.clone(),
        &auth_state,
    );
    let quota_routes = build_quota_routes(services.quota_service.clone(), &auth_state);

    let health_routes = Router::new()
        .route("/health", get(routes::health_check))
        .with_state(HealthState::new());

    Router::new()
        .nest("/v1", Router::new().merge(chat_routes).merge(quota_routes))
        .merge(health_routes)
        .merge(build_openapi_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// `POST /v1/chat`: auth, then quota, then the streaming handler
pub fn build_chat_routes(
    chat_service: Arc<dyn ChatServiceTrait>,
    quota_service: Arc<dyn QuotaServiceTrait>,
    auth_state: &AuthState,
) -> Router {
    Router::new()
        .route("/chat", post(routes::chat))
        .with_state(chat_service)
        .layer(from_fn_with_state(
            QuotaState::new(quota_service),
            quota_middleware,
        ))
        .layer(from_fn_with_state(auth_state.clone(), auth_middleware))
}

/// `GET /v1/quota`: authenticated, never counted against the quota
pub fn build_quota_routes(
    quota_service: Arc<dyn QuotaServiceTrait>,
    auth_state: &AuthState,
) -> Router {
    Router::new()
        .route("/quota", get(routes::quota_status))
        .with_state(quota_service)
        .layer(from_fn_with_state(auth_state.clone(), auth_middleware))
}

pub fn build_openapi_routes() -> Router {
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { axum::Json(ApiDoc::openapi()) }),
    )
}
