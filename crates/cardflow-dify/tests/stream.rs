use std::sync::{Arc, Mutex};

use bytes::Bytes;
use cardflow_core::CardflowError;
use cardflow_dify::{ChatClient, DifyConfig, FakeBackend};

fn config() -> DifyConfig {
    DifyConfig::new("http://dify.local/v1/chat-messages", "app-test-key")
}

fn client_with(backend: Arc<FakeBackend>) -> ChatClient {
    ChatClient::with_backend(config(), backend)
}

/// Records every delivery so tests can assert on count and content.
fn recorder() -> (
    Arc<Mutex<Vec<String>>>,
    impl FnMut(String) -> std::future::Ready<Result<(), CardflowError>>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let deliver = move |text: String| {
        sink.lock().unwrap().push(text);
        std::future::ready(Ok(()))
    };
    (calls, deliver)
}

fn chunks(parts: &[&str]) -> Vec<Bytes> {
    parts.iter().map(|p| Bytes::from(p.to_string())).collect()
}

// ── Accumulation ─────────────────────────────────────────────────

#[tokio::test]
async fn concatenates_answer_fields_in_order() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&[
            "data: {\"answer\":\"Hello\"}\n",
            "data: {\"answer\":\" world\"}\n",
        ]),
    );
    let (calls, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "Hello world");
    let calls = calls.lock().unwrap();
    assert!(!calls.is_empty());
    assert_eq!(calls.last().unwrap(), "Hello world");
}

#[tokio::test]
async fn chunk_boundaries_do_not_affect_the_result() {
    // Same records as above, split mid-line and mid-token.
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&[
            "data: {\"ans",
            "wer\":\"Hello\"}",
            "\ndata: {\"answer\":\" wo",
            "rld\"}\n",
        ]),
    );
    let (_, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "Hello world");
}

#[tokio::test]
async fn unterminated_final_record_is_processed() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&["data: {\"answer\":\"partial\"}\ndata: {\"answer\":\" tail\"}"]),
    );
    let (_, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "partial tail");
}

#[tokio::test]
async fn non_data_lines_are_ignored() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&[
            "event: ping\n",
            ": keep-alive\n",
            "\n",
            "data: {\"answer\":\"ok\"}\n",
        ]),
    );
    let (_, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "ok");
}

#[tokio::test]
async fn records_without_answer_are_skipped() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&[
            "data: {\"event\":\"message_end\"}\n",
            "data: {\"answer\":null}\n",
            "data: {\"answer\":\"text\"}\n",
        ]),
    );
    let (_, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "text");
}

#[tokio::test]
async fn malformed_json_line_does_not_abort_the_stream() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&[
            "data: {\"answer\":\"before\"}\n",
            "data: {not json at all\n",
            "data: {\"answer\":\" after\"}\n",
        ]),
    );
    let (_, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "before after");
}

// ── Flush policy ─────────────────────────────────────────────────

#[tokio::test]
async fn delivery_count_is_bounded_by_threshold() {
    // Ten 7-character pieces, 70 characters total, default threshold 20.
    let backend = Arc::new(FakeBackend::new());
    let records: Vec<String> = (0..10)
        .map(|_| "data: {\"answer\":\"aaaaaaa\"}\n".to_string())
        .collect();
    backend.push_stream(
        200,
        records.iter().map(|r| Bytes::from(r.clone())).collect(),
    );
    let (calls, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full.len(), 70);
    let calls = calls.lock().unwrap();
    // ceil(70 / 20) + 1
    assert!(calls.len() <= 4 + 1, "got {} deliveries", calls.len());
    assert!(calls.len() >= 2, "expected intermediate deliveries");
    assert_eq!(calls.last().unwrap().len(), 70);
    // Each delivery extends the previous one.
    for pair in calls.windows(2) {
        assert!(pair[1].starts_with(pair[0].as_str()));
    }
}

#[tokio::test]
async fn no_redundant_delivery_when_threshold_covers_the_end() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(200, chunks(&["data: {\"answer\":\"123456\"}\n"]));
    let (calls, deliver) = recorder();

    let client = ChatClient::with_backend(config().with_flush_threshold(5), backend);
    let full = client.stream_chat("hi", deliver).await.unwrap();

    assert_eq!(full, "123456");
    // The threshold flush already covered the full length; no extra call.
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn final_delivery_covers_the_tail() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&["data: {\"answer\":\"123456\"}\n", "data: {\"answer\":\"78\"}\n"]),
    );
    let (calls, deliver) = recorder();

    let client = ChatClient::with_backend(config().with_flush_threshold(5), backend);
    let full = client.stream_chat("hi", deliver).await.unwrap();

    assert_eq!(full, "12345678");
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0], "123456");
    assert_eq!(calls[1], "12345678");
}

#[tokio::test]
async fn short_answer_is_delivered_exactly_once_at_the_end() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(200, chunks(&["data: {\"answer\":\"short\"}\n"]));
    let (calls, deliver) = recorder();

    let full = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap();

    assert_eq!(full, "short");
    assert_eq!(calls.lock().unwrap().as_slice(), ["short"]);
}

#[tokio::test]
async fn threshold_counts_characters_not_bytes() {
    // Six 4-byte characters: 24 bytes but only 6 characters, below a
    // threshold of 10 — no intermediate delivery.
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(200, chunks(&["data: {\"answer\":\"😀😀😀😀😀😀\"}\n"]));
    let (calls, deliver) = recorder();

    let client = ChatClient::with_backend(config().with_flush_threshold(10), backend);
    let full = client.stream_chat("hi", deliver).await.unwrap();

    assert_eq!(full.chars().count(), 6);
    assert_eq!(calls.lock().unwrap().len(), 1);
}

// ── Error handling ───────────────────────────────────────────────

#[tokio::test]
async fn non_ok_status_fails_before_any_delivery() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(500, chunks(&["server error"]));
    let (calls, deliver) = recorder();

    let err = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap_err();

    match err {
        CardflowError::Upstream { status, body } => {
            assert_eq!(status, 500);
            assert_eq!(body, "server error");
        }
        other => panic!("expected Upstream, got {other:?}"),
    }
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn transport_error_mid_stream_delivers_partial_then_fails() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream_then_error(
        200,
        chunks(&["data: {\"answer\":\"partial\"}\n"]),
        CardflowError::Model("connection reset".into()),
    );
    let (calls, deliver) = recorder();

    let err = client_with(backend)
        .stream_chat("hi", deliver)
        .await
        .unwrap_err();

    assert!(matches!(err, CardflowError::Model(_)));
    let calls = calls.lock().unwrap();
    assert_eq!(calls.as_slice(), ["partial"]);
}

#[tokio::test]
async fn callback_error_aborts_the_stream() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(
        200,
        chunks(&[
            "data: {\"answer\":\"123456\"}\n",
            "data: {\"answer\":\"this should never be read\"}\n",
        ]),
    );

    let client = ChatClient::with_backend(config().with_flush_threshold(5), backend);
    let err = client
        .stream_chat("hi", |_| {
            std::future::ready(Err(CardflowError::CardSurface("update rejected".into())))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, CardflowError::CardSurface(_)));
}

#[tokio::test]
async fn empty_endpoint_is_rejected() {
    let backend = Arc::new(FakeBackend::new());
    let client = ChatClient::with_backend(DifyConfig::new("", "key"), backend);
    let (calls, deliver) = recorder();

    let err = client.stream_chat("hi", deliver).await.unwrap_err();

    assert!(matches!(err, CardflowError::Config(_)));
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn empty_api_key_is_rejected() {
    let backend = Arc::new(FakeBackend::new());
    let client = ChatClient::with_backend(DifyConfig::new("http://dify.local", ""), backend);
    let (_, deliver) = recorder();

    let err = client.stream_chat("hi", deliver).await.unwrap_err();

    assert!(matches!(err, CardflowError::Config(_)));
}

// ── Request shape ────────────────────────────────────────────────

#[tokio::test]
async fn request_carries_bearer_token_and_streaming_body() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(200, chunks(&["data: {\"answer\":\"x\"}\n"]));
    let (_, deliver) = recorder();

    client_with(backend.clone())
        .stream_chat("what is up", deliver)
        .await
        .unwrap();

    let requests = backend.requests().await;
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, "http://dify.local/v1/chat-messages");
    assert!(request
        .headers
        .iter()
        .any(|(k, v)| k == "Authorization" && v == "Bearer app-test-key"));
    assert_eq!(request.body["query"], "what is up");
    assert_eq!(request.body["response_mode"], "streaming");
    assert_eq!(request.body["conversation_id"], "");
    assert_eq!(request.body["user"], "abc-123");
    assert!(request.body["inputs"].as_object().unwrap().is_empty());
}

#[tokio::test]
async fn empty_query_is_forwarded_as_is() {
    let backend = Arc::new(FakeBackend::new());
    backend.push_stream(200, chunks(&[]));
    let (calls, deliver) = recorder();

    let full = client_with(backend.clone())
        .stream_chat("", deliver)
        .await
        .unwrap();

    assert_eq!(full, "");
    // Nothing accumulated, nothing flushed: no delivery at all.
    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(backend.requests().await[0].body["query"], "");
}
