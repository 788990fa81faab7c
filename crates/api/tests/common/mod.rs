#![allow(dead_code)]

use api::{build_app, AppServices};
use chrono::Utc;
use domain::{Message, StreamEvent};
use inference_providers::{MockProvider, ResponseTemplate};
use services::{
    auth::{AuthService, User, UserId},
    chat::{ChatServiceImpl, OrchestratorConfig, StreamOrchestrator},
    quota::{QuotaService, RequestLogRepository},
    test_utils::{
        InMemoryRequestLogRepository, InMemorySessionRepository, InMemoryUserRepository,
        StaticSearchProvider,
    },
    tools::default_registry,
};
use std::sync::Arc;

pub const USER_TOKEN: &str = "sess_user_token";
pub const ADMIN_TOKEN: &str = "sess_admin_token";

/// A running router over in-memory stores, a scripted model and a canned search backend
pub struct TestContext {
    pub server: axum_test::TestServer,
    pub provider: MockProvider,
    pub search: Arc<StaticSearchProvider>,
    pub request_log: Arc<InMemoryRequestLogRepository>,
    pub user: User,
    pub admin: User,
}

fn test_user(email: &str, is_admin: bool) -> User {
    User {
        id: UserId(uuid::Uuid::new_v4()),
        email: email.to_string(),
        is_admin,
        created_at: Utc::now(),
    }
}

pub fn setup_test_server(
    daily_limit: u32,
    responses: Vec<ResponseTemplate>,
    search: StaticSearchProvider,
) -> TestContext {
    let user = test_user("user@example.com", false);
    let admin = test_user("admin@example.com", true);

    let users = Arc::new(InMemoryUserRepository::new());
    users.insert(user.clone());
    users.insert(admin.clone());
    let sessions = Arc::new(InMemorySessionRepository::new());
    sessions.insert(USER_TOKEN, user.id);
    sessions.insert(ADMIN_TOKEN, admin.id);
    let request_log = Arc::new(InMemoryRequestLogRepository::new());

    let provider = MockProvider::scripted(responses);
    let search = Arc::new(search);

    let mut config = OrchestratorConfig::new("test-model");
    config.retry_backoff = std::time::Duration::from_millis(1);
    let orchestrator = StreamOrchestrator::new(
        Arc::new(provider.clone()),
        Arc::new(default_registry(search.clone())),
        config,
    );

    let services = AppServices {
        auth_service: Arc::new(AuthService::new(sessions, users)),
        quota_service: Arc::new(QuotaService::new(request_log.clone(), daily_limit)),
        chat_service: Arc::new(ChatServiceImpl::new(Arc::new(orchestrator))),
    };

    TestContext {
        server: axum_test::TestServer::new(build_app(services)).unwrap(),
        provider,
        search,
        request_log,
        user,
        admin,
    }
}

/// Log `n` requests for the user as if they had already been served today
pub async fn use_up_requests(ctx: &TestContext, user_id: UserId, n: usize) {
    for _ in 0..n {
        ctx.request_log.record(user_id, Utc::now()).await.unwrap();
    }
}

pub fn chat_body(text: &str) -> serde_json::Value {
    serde_json::json!({ "messages": [Message::user("m1", text)] })
}

/// Split an SSE body into `(event name, decoded event)` pairs, skipping keep-alive comments
pub fn parse_sse(body: &str) -> Vec<(String, StreamEvent)> {
    body.split("\n\n")
        .filter_map(|frame| {
            let mut name = None;
            let mut data = String::new();
            for line in frame.lines() {
                if let Some(value) = line.strip_prefix("event:") {
                    name = Some(value.trim().to_string());
                } else if let Some(value) = line.strip_prefix("data:") {
                    data.push_str(value.trim_start());
                }
            }
            let name = name?;
            let event = serde_json::from_str::<StreamEvent>(&data).unwrap();
            Some((name, event))
        })
        .collect()
}
