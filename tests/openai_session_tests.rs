//! End-to-end tests of a session talking to a mocked OpenAI-compatible API.
//!
//! Run: cargo test --test openai_session_tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use llm_session::testing::WordTokenizer;
use llm_session::{
    ChatSession, Error, GenerationParams, ModerationPolicy, OpenAiAdapter, RetryPolicy, Role,
};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "chatcmpl-test",
        "object": "chat.completion",
        "created": 1234567890,
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }]
    })
}

fn session(server: &MockServer) -> llm_session::ChatSessionBuilder {
    let adapter = OpenAiAdapter::new("sk-test").unwrap().with_base_url(server.uri());
    ChatSession::builder()
        .model("gpt-4")
        .backend(Arc::new(adapter))
        .tokenizer(Arc::new(WordTokenizer))
}

#[tokio::test]
async fn test_prompt_sends_transcript_and_params() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({
            "model": "gpt-4",
            "temperature": 0.2,
            "messages": [
                {"role": "system", "content": "You are terse"},
                {"role": "user", "content": "Hello"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Hi")))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session(&server)
        .params(GenerationParams::new().with_temperature(0.2))
        .build()
        .unwrap();
    session.set_instruction("You are terse").unwrap();

    assert_eq!(session.prompt("Hello").await.unwrap(), "Hi");
    let history = session.export_history(true);
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].role, Role::Assistant);
}

#[tokio::test]
async fn test_server_errors_are_retried_until_success() {
    let server = MockServer::start().await;
    let request_count = Arc::new(AtomicUsize::new(0));
    let counter = request_count.clone();

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(move |_req: &wiremock::Request| {
            let count = counter.fetch_add(1, Ordering::SeqCst);
            if count < 2 {
                ResponseTemplate::new(503).set_body_json(serde_json::json!({
                    "error": {"message": "Service Unavailable", "type": "server_error"}
                }))
            } else {
                ResponseTemplate::new(200).set_body_json(completion("Hello!"))
            }
        })
        .expect(3)
        .mount(&server)
        .await;

    let mut session = session(&server)
        .retry(RetryPolicy::new(3, Duration::ZERO))
        .build()
        .unwrap();

    assert_eq!(session.prompt("Hi").await.unwrap(), "Hello!");
    assert_eq!(request_count.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unauthorized_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session(&server)
        .retry(RetryPolicy::new(3, Duration::ZERO))
        .build()
        .unwrap();

    let err = session.prompt("Hi").await.unwrap_err();
    assert!(err.is_configuration_error());
    assert_eq!(err.status_code(), Some(401));
}

#[tokio::test]
async fn test_streamed_reply_is_committed() {
    let server = MockServer::start().await;
    let body = concat!(
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(serde_json::json!({"stream": true})))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session(&server).build().unwrap();
    let text = session.prompt_stream("greet").unwrap().into_text().await.unwrap();

    assert_eq!(text, "Hello");
    assert_eq!(session.export_history(false)[1].content, "Hello");
}

#[tokio::test]
async fn test_moderation_endpoint_gates_input() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/moderations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id": "modr-1",
            "results": [{"flagged": true, "categories": {"harassment": true}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unreachable")))
        .expect(0)
        .mount(&server)
        .await;

    let adapter = Arc::new(OpenAiAdapter::new("sk-test").unwrap().with_base_url(server.uri()));
    let mut session = ChatSession::builder()
        .model("gpt-4")
        .backend(adapter.clone())
        .moderator(adapter)
        .tokenizer(Arc::new(WordTokenizer))
        .moderation(ModerationPolicy::input_only())
        .build()
        .unwrap();

    let err = session.prompt("rude words").await.unwrap_err();
    assert!(matches!(err, Error::ModerationRejected { .. }));
    assert!(session.export_history(true).is_empty());
}
