//! Integration tests for the HTTP transport against an in-process server.
//!
//! The server streams its answer as a chunked body split at arbitrary
//! points, the way a real proxy would deliver it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures_util::StreamExt;
use serde_json::{json, Value};

use kbase_chat::session::state::SessionOutcome;
use kbase_chat::session::Orchestrator;
use kbase_chat::transport::http::HttpTransport;
use kbase_chat::transport::{ChatTransport, StreamRequest};
use kbase_chat::AppError;

use super::test_helpers::{frame, test_config, RecordingSink};

/// Serve `router` on an ephemeral port, returning its base URL.
async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{addr}")
}

/// Answer body cut into uneven slices with short pauses in between.
fn streamed_answer() -> Response {
    let body = [
        frame("meta", &json!({"conversationId": 7, "assistantMessageId": 42})),
        frame("chunk", &json!({"delta": "Hello"})),
        frame("chunk", &json!({"delta": " wörld"})),
        frame("done", &json!({})),
    ]
    .concat()
    .into_bytes();

    let slices: Vec<Bytes> = body.chunks(11).map(Bytes::copy_from_slice).collect();
    let stream = futures_util::stream::iter(slices).then(|slice| async move {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Ok::<_, std::io::Error>(slice)
    });

    Response::builder()
        .header("content-type", "text/event-stream")
        .body(Body::from_stream(stream))
        .expect("valid response")
}

fn chat_router(captured: Arc<Mutex<Option<Value>>>) -> Router {
    Router::new()
        .route(
            "/api/chat/stream",
            post(move |Json(body): Json<Value>| {
                let captured = Arc::clone(&captured);
                async move {
                    *captured.lock().unwrap() = Some(body);
                    streamed_answer()
                }
            }),
        )
        .route(
            "/api/chat/conversation/{id}",
            get(|| async {
                Json(json!({
                    "id": 7,
                    "title": "Greetings",
                    "messages": [
                        {"id": 41, "role": "user", "content": "Say hello"},
                        {"id": 42, "role": "assistant", "content": "Hello wörld"}
                    ]
                }))
            }),
        )
}

#[tokio::test]
async fn streams_answer_end_to_end_over_http() {
    let captured = Arc::new(Mutex::new(None));
    let base_url = spawn_server(chat_router(Arc::clone(&captured))).await;
    let orch = Orchestrator::from_config(test_config(&base_url)).expect("orchestrator builds");
    let sink = RecordingSink::default();

    let turn = orch.ask("Say hello", None, &sink).await.expect("turn runs");

    assert_eq!(turn.outcome, SessionOutcome::Completed);
    let assistant = turn.assistant.expect("answer is committed");
    assert_eq!(assistant.id, "42");
    assert_eq!(assistant.content, "Hello wörld");

    let detail = turn.conversation.expect("conversation refreshed");
    assert_eq!(detail.conversation.title, "Greetings");
    assert_eq!(detail.messages.len(), 2);

    let body = captured.lock().unwrap().clone().expect("request captured");
    assert_eq!(body["question"], "Say hello");
    assert_eq!(body["conversationId"], Value::Null);
    assert_eq!(body["topK"], 4);
    assert_eq!(body["useSummarySearch"], false);
    assert_eq!(body["model"]["apiModel"], "qwen2:7b");
    assert_eq!(body["model"]["requiresApiKey"], false);
    assert!(body["model"].get("apiKey").is_none(), "absent key is omitted");
    assert_eq!(body["clientRequestId"], turn.request_id.as_str());
}

#[tokio::test]
async fn non_success_status_is_transport_error() {
    let router = Router::new().route(
        "/api/chat/stream",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading").into_response() }),
    );
    let base_url = spawn_server(router).await;
    let config = test_config(&base_url);
    let transport = HttpTransport::new(&config).expect("transport builds");
    let request = StreamRequest::new(&config, "q", None);

    let err = transport
        .open_stream(&request)
        .await
        .err()
        .expect("status is rejected");

    let AppError::Transport(msg) = err else {
        panic!("expected transport error, got {err}");
    };
    assert!(msg.contains("503"), "got: {msg}");
    assert!(msg.contains("model loading"), "got: {msg}");
}

#[tokio::test]
async fn unreachable_service_fails_turn() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);

    let orch = Orchestrator::from_config(test_config(&format!("http://{addr}")))
        .expect("orchestrator builds");
    let turn = orch
        .ask("q", None, &RecordingSink::default())
        .await
        .expect("turn runs");

    assert!(matches!(turn.outcome, SessionOutcome::Failed { .. }));
}

#[test]
fn transport_targets_configured_endpoint() {
    let config = test_config("http://127.0.0.1:8000/");
    let transport = HttpTransport::new(&config).expect("transport builds");
    assert_eq!(transport.stream_url(), "http://127.0.0.1:8000/api/chat/stream");
}
