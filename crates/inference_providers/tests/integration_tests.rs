//! Integration tests for the inference providers
//!
//! Everything runs against `MockProvider` or a local `httpmock` server.

use futures_util::StreamExt;
use inference_providers::{
    mock::{RequestMatcher, ResponseTemplate},
    ChatCompletionChunk, ChatCompletionParams, ChatMessage, CompletionError, FinishReason,
    InferenceProvider, MockProvider, OpenAiCompatibleConfig, OpenAiCompatibleProvider,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Text and tool calls reassembled from a chunk stream
#[derive(Debug, Default)]
struct Assembled {
    text: String,
    tool_calls: BTreeMap<i64, (Option<String>, String, String)>,
    finish_reason: Option<FinishReason>,
}

async fn assemble(
    provider: &dyn InferenceProvider,
    params: ChatCompletionParams,
) -> Result<Assembled, CompletionError> {
    let mut stream = provider.chat_completion_stream(params).await?;
    let mut out = Assembled::default();

    while let Some(chunk) = stream.next().await {
        let chunk: ChatCompletionChunk = chunk?;
        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                out.finish_reason = Some(reason);
            }
            let Some(delta) = choice.delta else { continue };
            if let Some(content) = delta.content {
                out.text.push_str(&content);
            }
            for call in delta.tool_calls.unwrap_or_default() {
                let entry = out.tool_calls.entry(call.index.unwrap_or(0)).or_default();
                if call.id.is_some() {
                    entry.0 = call.id;
                }
                if let Some(function) = call.function {
                    if let Some(name) = function.name {
                        entry.1.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.2.push_str(&arguments);
                    }
                }
            }
        }
    }
    Ok(out)
}

fn params(prompt: &str) -> ChatCompletionParams {
    ChatCompletionParams::new(
        "test-model",
        vec![
            ChatMessage::system("You are helpful."),
            ChatMessage::user(prompt),
        ],
    )
}

#[tokio::test]
async fn test_mock_text_reassembles() {
    let provider: Arc<dyn InferenceProvider> = Arc::new(MockProvider::scripted([
        ResponseTemplate::new("The capital of France is Paris."),
    ]));

    let out = assemble(provider.as_ref(), params("Capital of France?"))
        .await
        .unwrap();

    assert_eq!(out.text, "The capital of France is Paris.");
    assert_eq!(out.finish_reason, Some(FinishReason::Stop));
    assert!(out.tool_calls.is_empty());
}

#[tokio::test]
async fn test_mock_tool_call_reassembles() {
    let provider = MockProvider::scripted([ResponseTemplate::tool_call(
        "call_7",
        "searchWeb",
        serde_json::json!({ "query": "weather in Lisbon" }),
    )]);

    let out = assemble(&provider, params("Weather in Lisbon?")).await.unwrap();

    assert_eq!(out.finish_reason, Some(FinishReason::ToolCalls));
    let (id, name, arguments) = &out.tool_calls[&0];
    assert_eq!(id.as_deref(), Some("call_7"));
    assert_eq!(name, "searchWeb");
    let arguments: serde_json::Value = serde_json::from_str(arguments).unwrap();
    assert_eq!(arguments["query"], "weather in Lisbon");
}

#[tokio::test]
async fn test_mock_expectation_matches_last_user_message() {
    let provider = MockProvider::new();
    provider
        .when(RequestMatcher::LastUserMessageContains("weather".to_string()))
        .respond_with(ResponseTemplate::new("Sunny."))
        .await;

    let matched = assemble(&provider, params("What's the weather?")).await.unwrap();
    assert_eq!(matched.text, "Sunny.");

    let fallback = assemble(&provider, params("Tell me a joke")).await.unwrap();
    assert_ne!(fallback.text, "Sunny.");
    assert_eq!(provider.call_count().await, 2);
}

#[tokio::test]
async fn test_mock_disconnect_has_no_finish_reason() {
    let provider = MockProvider::scripted([
        ResponseTemplate::new("one two three four").with_disconnect_after(2)
    ]);

    let out = assemble(&provider, params("count")).await.unwrap();
    assert_eq!(out.finish_reason, None);
}

#[tokio::test]
async fn test_remote_tool_call_split_across_chunks() {
    use httpmock::prelude::*;

    let server = MockServer::start_async().await;
    let chunk = |delta: serde_json::Value, finish: Option<&str>| {
        format!(
            "data: {}\n\n",
            serde_json::json!({
                "id": "c1",
                "object": "chat.completion.chunk",
                "created": 1,
                "model": "m",
                "choices": [{ "index": 0, "delta": delta, "finish_reason": finish }]
            })
        )
    };
    let body = [
        chunk(
            serde_json::json!({ "tool_calls": [{ "index": 0, "id": "call_1", "type": "function",
                "function": { "name": "searchWeb", "arguments": "{\"que" } }] }),
            None,
        ),
        chunk(
            serde_json::json!({ "tool_calls": [{ "index": 0,
                "function": { "arguments": "ry\":\"rust\"}" } }] }),
            None,
        ),
        chunk(serde_json::json!({}), Some("tool_calls")),
        "data: [DONE]\n\n".to_string(),
    ]
    .concat();

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .header("content-type", "text/event-stream")
                .body(body);
        })
        .await;

    let provider = OpenAiCompatibleProvider::new(OpenAiCompatibleConfig::new(
        server.base_url(),
        None,
        Some(5),
    ))
    .unwrap();

    let out = assemble(&provider, params("search rust")).await.unwrap();
    assert_eq!(out.finish_reason, Some(FinishReason::ToolCalls));
    assert_eq!(out.tool_calls[&0].2, "{\"query\":\"rust\"}");
}
