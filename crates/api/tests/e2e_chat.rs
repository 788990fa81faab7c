mod common;

use common::*;
use domain::{validate_ordering, FinishReason, StreamEvent, ToolName};
use inference_providers::ResponseTemplate;
use services::test_utils::{search_hits, StaticSearchProvider};

// ============================================
// Authentication
// ============================================

#[tokio::test]
async fn test_chat_without_token_is_rejected() {
    let ctx = setup_test_server(5, vec![], StaticSearchProvider::new(vec![]));

    let response = ctx.server.post("/v1/chat").json(&chat_body("hi")).await;

    assert_eq!(response.status_code(), 401);
    let body: serde_json::Value = response.json();
    assert!(body["error"].is_string());
    assert_eq!(ctx.provider.call_count().await, 0);
    assert!(ctx.request_log.entries_for(ctx.user.id).is_empty());
}

#[tokio::test]
async fn test_chat_with_unknown_token_is_rejected() {
    let ctx = setup_test_server(5, vec![], StaticSearchProvider::new(vec![]));

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", "Bearer sess_does_not_exist")
        .json(&chat_body("hi"))
        .await;

    assert_eq!(response.status_code(), 401);
    assert_eq!(ctx.provider.call_count().await, 0);
}

// ============================================
// Quota gate
// ============================================

#[tokio::test]
async fn test_exhausted_quota_returns_429_without_model_call() {
    let ctx = setup_test_server(3, vec![], StaticSearchProvider::new(vec![]));
    use_up_requests(&ctx, ctx.user.id, 3).await;

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&chat_body("one more please"))
        .await;

    assert_eq!(response.status_code(), 429);
    let body: serde_json::Value = response.json();
    assert_eq!(body, serde_json::json!({ "error": "Daily request limit reached" }));
    assert_eq!(ctx.provider.call_count().await, 0);
    assert_eq!(ctx.search.call_count(), 0);
    assert_eq!(
        ctx.request_log.entries_for(ctx.user.id).len(),
        3,
        "a denied request must not be recorded"
    );
}

#[tokio::test]
async fn test_last_request_within_limit_is_served() {
    let ctx = setup_test_server(
        2,
        vec![ResponseTemplate::new("Still here")],
        StaticSearchProvider::new(vec![]),
    );
    use_up_requests(&ctx, ctx.user.id, 1).await;

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&chat_body("hello"))
        .await;

    assert_eq!(response.status_code(), 200);
    assert_eq!(ctx.request_log.entries_for(ctx.user.id).len(), 2);
}

#[tokio::test]
async fn test_admin_is_never_limited() {
    let ctx = setup_test_server(
        0,
        vec![ResponseTemplate::new("Admins welcome")],
        StaticSearchProvider::new(vec![]),
    );

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {ADMIN_TOKEN}"))
        .json(&chat_body("hello"))
        .await;

    assert_eq!(response.status_code(), 200);
}

// ============================================
// Streaming
// ============================================

#[tokio::test]
async fn test_plain_answer_streams_text_then_done() {
    let ctx = setup_test_server(
        5,
        vec![ResponseTemplate::new("Paris is the capital")],
        StaticSearchProvider::new(vec![]),
    );

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&chat_body("What is the capital of France?"))
        .await;

    assert_eq!(response.status_code(), 200);
    let content_type = response.header("content-type");
    assert!(content_type
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    let events = parse_sse(&response.text());
    for (name, event) in &events {
        assert_eq!(name, event.event_type());
    }

    let text: String = events
        .iter()
        .filter_map(|(_, e)| match e {
            StreamEvent::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Paris is the capital");

    match &events.last().unwrap().1 {
        StreamEvent::Done { finish_reason, .. } => assert_eq!(*finish_reason, FinishReason::Stop),
        other => panic!("expected done, got {other:?}"),
    }
    assert_eq!(ctx.request_log.entries_for(ctx.user.id).len(), 1);
}

#[tokio::test]
async fn test_search_results_are_streamed_before_the_answer() {
    let ctx = setup_test_server(
        5,
        vec![
            ResponseTemplate::tool_call(
                "call_1",
                "searchWeb",
                serde_json::json!({ "query": "rust 2024 edition" }),
            ),
            ResponseTemplate::new("The 2024 edition shipped with Rust 1.85"),
        ],
        StaticSearchProvider::new(search_hits(2)),
    );

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&chat_body("When did the 2024 edition ship?"))
        .await;

    assert_eq!(response.status_code(), 200);
    let events: Vec<StreamEvent> = parse_sse(&response.text())
        .into_iter()
        .map(|(_, e)| e)
        .collect();
    validate_ordering(&events).unwrap();

    let start = events
        .iter()
        .position(|e| matches!(e, StreamEvent::ToolCallStart { .. }))
        .unwrap();
    match &events[start] {
        StreamEvent::ToolCallStart {
            tool_name, input, ..
        } => {
            assert_eq!(*tool_name, ToolName::SearchWeb);
            assert_eq!(input["query"], "rust 2024 edition");
        }
        _ => unreachable!(),
    }

    let result = events
        .iter()
        .position(|e| matches!(e, StreamEvent::ToolCallResult { .. }))
        .unwrap();
    match &events[result] {
        StreamEvent::ToolCallResult { output, .. } => assert_eq!(output.len(), 2),
        _ => unreachable!(),
    }

    let first_text = events
        .iter()
        .position(|e| matches!(e, StreamEvent::TextDelta { .. }))
        .unwrap();
    assert!(start < result && result < first_text);
    assert_eq!(ctx.search.calls()[0].query, "rust 2024 edition");
}

#[tokio::test]
async fn test_failed_search_still_completes() {
    let ctx = setup_test_server(
        5,
        vec![
            ResponseTemplate::tool_call("call_1", "searchWeb", serde_json::json!({ "query": "x" })),
            ResponseTemplate::new("I could not search, but here is what I know"),
        ],
        StaticSearchProvider::failing("upstream returned 503"),
    );

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&chat_body("news?"))
        .await;

    let events: Vec<StreamEvent> = parse_sse(&response.text())
        .into_iter()
        .map(|(_, e)| e)
        .collect();
    let output = events
        .iter()
        .find_map(|e| match e {
            StreamEvent::ToolCallResult { output, .. } => Some(output.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(output.len(), 1);
    assert!(output[0].is_error());
    assert!(matches!(events.last(), Some(StreamEvent::Done { .. })));
}

#[tokio::test]
async fn test_model_failure_ends_stream_with_error_event() {
    let ctx = setup_test_server(
        5,
        vec![ResponseTemplate::failure(
            inference_providers::CompletionError::InvalidResponse("bad gateway".to_string()),
        )],
        StaticSearchProvider::new(vec![]),
    );

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&chat_body("hello"))
        .await;

    assert_eq!(response.status_code(), 200);
    let events = parse_sse(&response.text());
    let (name, last) = events.last().unwrap();
    assert_eq!(name, "error");
    assert!(matches!(last, StreamEvent::Error { .. }));
}

// ============================================
// Request validation
// ============================================

#[tokio::test]
async fn test_empty_conversation_is_bad_request() {
    let ctx = setup_test_server(5, vec![], StaticSearchProvider::new(vec![]));

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&serde_json::json!({ "messages": [] }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert!(body["error"].as_str().unwrap().contains("empty"));
    assert_eq!(ctx.provider.call_count().await, 0);
}

#[tokio::test]
async fn test_unparseable_body_is_bad_request() {
    let ctx = setup_test_server(5, vec![], StaticSearchProvider::new(vec![]));

    let response = ctx
        .server
        .post("/v1/chat")
        .add_header("Authorization", format!("Bearer {USER_TOKEN}"))
        .json(&serde_json::json!({ "messages": "not a list" }))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: serde_json::Value = response.json();
    assert!(body["error"].is_string());
}
