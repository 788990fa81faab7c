use client::{
    BannerKind, Block, ChatClient, ClientError, ConversationView, RequestFailure, RequestStatus,
};
use domain::{FinishReason, StreamEvent, ToolName, ToolResultItem};
use httpmock::prelude::*;
use tokio_util::sync::CancellationToken;

const TOKEN: &str = "sess_test";
const MSG: &str = "msg_abc";

fn sse(events: &[StreamEvent]) -> String {
    events
        .iter()
        .map(|e| {
            format!(
                "event: {}\ndata: {}\n\n",
                e.event_type(),
                serde_json::to_string(e).unwrap()
            )
        })
        .collect()
}

fn text(delta: &str) -> StreamEvent {
    StreamEvent::TextDelta {
        message_id: MSG.to_string(),
        delta: delta.to_string(),
    }
}

fn done() -> StreamEvent {
    StreamEvent::Done {
        message_id: MSG.to_string(),
        finish_reason: FinishReason::Stop,
    }
}

async fn serve_stream(server: &MockServer, body: String) -> httpmock::Mock<'_> {
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat")
                .header("authorization", format!("Bearer {TOKEN}"));
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        })
        .await
}

#[tokio::test]
async fn test_search_answer_is_folded_into_view() {
    let server = MockServer::start_async().await;
    let results: Vec<ToolResultItem> = (1..=3)
        .map(|i| ToolResultItem::new(format!("Hit {i}"), format!("https://example.com/{i}"), "s"))
        .collect();
    let body = sse(&[
        StreamEvent::ToolCallStart {
            message_id: MSG.to_string(),
            tool_call_id: "call_1".to_string(),
            tool_name: ToolName::SearchWeb,
            input: serde_json::json!({ "query": "rust release" }),
        },
        StreamEvent::ToolCallResult {
            message_id: MSG.to_string(),
            tool_call_id: "call_1".to_string(),
            output: results,
        },
        StreamEvent::StepBoundary {
            message_id: MSG.to_string(),
            step: 1,
        },
        text("Rust 1.85 "),
        text("is out."),
        done(),
    ]);
    let mock = serve_stream(&server, body).await;

    let client = ChatClient::new(server.base_url(), TOKEN).unwrap();
    let mut view = ConversationView::new();
    let finish = client
        .submit(&mut view, "latest rust release?", CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(finish, FinishReason::Stop);
    assert_eq!(*view.state().status(), RequestStatus::Ready);

    let model = view.render();
    assert!(model.banner.is_none());
    assert!(model.can_submit);
    assert_eq!(model.messages.len(), 2);

    let answer = &model.messages[1];
    assert!(!answer.tool_running);
    match &answer.blocks[0] {
        Block::SearchResults {
            badge, expanded, ..
        } => {
            assert_eq!(badge, "3 results");
            assert!(!expanded);
        }
        other => panic!("expected results, got {other:?}"),
    }
    assert_eq!(answer.blocks[1], Block::Text("Rust 1.85 is out.".to_string()));
}

#[tokio::test]
async fn test_conversation_is_sent_with_the_request() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat")
                .body_contains("what time is it in Oslo");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(sse(&[text("Noon."), done()]));
        })
        .await;

    let client = ChatClient::new(server.base_url(), TOKEN).unwrap();
    let mut view = ConversationView::new();
    client
        .submit(&mut view, "what time is it in Oslo", CancellationToken::new())
        .await
        .unwrap();

    mock.assert_async().await;
}

#[tokio::test]
async fn test_quota_refusal_shows_banner() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat");
            then.status(429)
                .json_body(serde_json::json!({ "error": "Daily request limit reached" }));
        })
        .await;

    let client = ChatClient::new(server.base_url(), TOKEN).unwrap();
    let mut view = ConversationView::new();
    let err = client
        .submit(&mut view, "hello", CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::QuotaExceeded(_)));
    let model = view.render();
    let banner = model.banner.unwrap();
    assert_eq!(banner.kind, BannerKind::Rejected);
    assert_eq!(banner.message, "Daily request limit reached");
    assert!(model.can_submit);
    assert_eq!(model.messages.len(), 1, "the user's message stays visible");
}

#[tokio::test]
async fn test_dropped_stream_keeps_partial_text() {
    let server = MockServer::start_async().await;
    serve_stream(&server, sse(&[text("The answer "), text("is probably")])).await;

    let client = ChatClient::new(server.base_url(), TOKEN).unwrap();
    let mut view = ConversationView::new();
    let err = client
        .submit(&mut view, "question", CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Interrupted(_)));
    assert!(matches!(
        view.state().status(),
        RequestStatus::Error(RequestFailure::Interrupted { .. })
    ));
    assert_eq!(view.state().message(MSG).unwrap().text(), "The answer is probably");
    assert!(view.state().is_failed(MSG));

    let model = view.render();
    assert_eq!(model.banner.unwrap().kind, BannerKind::Interrupted);
    assert!(model.messages[1].failed);
}

#[tokio::test]
async fn test_server_error_event_ends_request() {
    let server = MockServer::start_async().await;
    serve_stream(
        &server,
        sse(&[
            text("Working"),
            StreamEvent::Error {
                message_id: MSG.to_string(),
                message: "Request timed out".to_string(),
            },
        ]),
    )
    .await;

    let client = ChatClient::new(server.base_url(), TOKEN).unwrap();
    let mut view = ConversationView::new();
    let err = client
        .submit(&mut view, "slow question", CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Stream(ref m) if m == "Request timed out"));
    let banner = view.render().banner.unwrap();
    assert_eq!(banner.kind, BannerKind::ServerError);
    assert_eq!(view.state().message(MSG).unwrap().text(), "Working");
}

#[tokio::test]
async fn test_cancelled_before_sending() {
    let server = MockServer::start_async().await;
    let mock = serve_stream(&server, sse(&[done()])).await;

    let client = ChatClient::new(server.base_url(), TOKEN).unwrap();
    let mut view = ConversationView::new();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client.submit(&mut view, "never mind", cancel).await.unwrap_err();

    assert!(matches!(err, ClientError::Cancelled));
    assert!(view.state().can_submit());
    mock.assert_hits_async(0).await;
}
