use std::future::Future;
use std::sync::Arc;

use cardflow_core::CardflowError;
use futures::StreamExt;
use serde_json::{json, Value};

use crate::backend::{ByteStream, ChatBackend, ChatHttpRequest, HttpBackend};

/// Minimum growth in accumulated characters required to trigger a delivery.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 20;

const DEFAULT_USER: &str = "abc-123";
const DATA_PREFIX: &str = "data: ";

/// Connection settings for a Dify `chat-messages` endpoint.
#[derive(Debug, Clone)]
pub struct DifyConfig {
    /// Full URL of the `chat-messages` endpoint.
    pub endpoint: String,
    /// Application API key, sent as a bearer token.
    pub api_key: String,
    /// Fixed end-user identifier forwarded with every request.
    pub user: String,
    /// Character-growth threshold between intermediate deliveries.
    pub flush_threshold: usize,
}

impl DifyConfig {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            user: DEFAULT_USER.to_string(),
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn with_flush_threshold(mut self, threshold: usize) -> Self {
        self.flush_threshold = threshold;
        self
    }

    fn validate(&self) -> Result<(), CardflowError> {
        if self.endpoint.is_empty() {
            return Err(CardflowError::Config("Dify endpoint is empty".to_string()));
        }
        if self.api_key.is_empty() {
            return Err(CardflowError::Config("Dify API key is empty".to_string()));
        }
        Ok(())
    }
}

/// Streaming chat client.
///
/// One [`stream_chat`](ChatClient::stream_chat) call performs one request and
/// owns its accumulation state exclusively; the client itself is stateless
/// and can serve any number of concurrent calls.
pub struct ChatClient {
    config: DifyConfig,
    backend: Arc<dyn ChatBackend>,
}

impl ChatClient {
    pub fn new(config: DifyConfig) -> Self {
        Self::with_backend(config, Arc::new(HttpBackend::new()))
    }

    /// Construct with a custom transport (used by tests).
    pub fn with_backend(config: DifyConfig, backend: Arc<dyn ChatBackend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &DifyConfig {
        &self.config
    }

    /// Send `query` and stream the answer, invoking `deliver` with the full
    /// accumulated text each time it has grown by more than the configured
    /// threshold since the previous delivery, plus once at stream end when
    /// the last delivery did not already cover the final length.
    ///
    /// Returns the complete accumulated answer. A non-OK initial status
    /// fails with [`CardflowError::Upstream`] before any delivery; an error
    /// raised by `deliver` aborts the stream and propagates.
    pub async fn stream_chat<F, Fut>(
        &self,
        query: &str,
        mut deliver: F,
    ) -> Result<String, CardflowError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<(), CardflowError>>,
    {
        self.config.validate()?;

        let request = self.build_request(query);
        let response = self.backend.open_stream(request).await?;
        if response.status != 200 {
            let body = read_body_text(response.body).await;
            return Err(CardflowError::Upstream {
                status: response.status,
                body,
            });
        }

        let mut answer = Accumulator::new(self.config.flush_threshold);
        let mut carry: Vec<u8> = Vec::new();
        let mut body = response.body;

        let stream_result = loop {
            match body.next().await {
                Some(Ok(chunk)) => {
                    carry.extend_from_slice(&chunk);
                    while let Some(pos) = carry.iter().position(|&b| b == b'\n') {
                        let line: Vec<u8> = carry.drain(..=pos).collect();
                        if answer.ingest_line(&line[..line.len() - 1]) {
                            deliver(answer.text().to_string()).await?;
                            answer.mark_flushed();
                        }
                    }
                }
                Some(Err(e)) => break Err(e),
                None => {
                    // End of stream terminates a trailing unterminated record.
                    if !carry.is_empty() {
                        let line = std::mem::take(&mut carry);
                        if answer.ingest_line(&line) {
                            deliver(answer.text().to_string()).await?;
                            answer.mark_flushed();
                        }
                    }
                    break Ok(());
                }
            }
        };

        match stream_result {
            Ok(()) => {
                if !answer.fully_flushed() {
                    deliver(answer.text().to_string()).await?;
                    answer.mark_flushed();
                }
                tracing::debug!(chars = answer.chars(), "chat stream complete");
                Ok(answer.into_text())
            }
            Err(e) => {
                // Surface what was accumulated before failing, best effort.
                if !answer.fully_flushed() {
                    if let Err(cb_err) = deliver(answer.text().to_string()).await {
                        tracing::warn!(error = %cb_err, "partial delivery after stream error failed");
                    }
                }
                Err(e)
            }
        }
    }

    fn build_request(&self, query: &str) -> ChatHttpRequest {
        ChatHttpRequest {
            url: self.config.endpoint.clone(),
            headers: vec![
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.config.api_key),
                ),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body: json!({
                "inputs": {},
                "query": query,
                "response_mode": "streaming",
                "conversation_id": "",
                "user": self.config.user,
            }),
        }
    }
}

/// Growing answer buffer plus flush bookkeeping, owned by one call.
struct Accumulator {
    text: String,
    chars: usize,
    flushed_chars: usize,
    threshold: usize,
}

impl Accumulator {
    fn new(threshold: usize) -> Self {
        Self {
            text: String::new(),
            chars: 0,
            flushed_chars: 0,
            threshold,
        }
    }

    /// Process one record line. Returns `true` when a delivery is due.
    fn ingest_line(&mut self, line: &[u8]) -> bool {
        let Ok(line) = std::str::from_utf8(line) else {
            tracing::warn!("skipping non-UTF-8 stream line");
            return false;
        };
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return false;
        };
        match serde_json::from_str::<Value>(payload) {
            Ok(event) => {
                let Some(piece) = event.get("answer").and_then(Value::as_str) else {
                    return false;
                };
                self.text.push_str(piece);
                self.chars += piece.chars().count();
                self.chars - self.flushed_chars > self.threshold
            }
            Err(e) => {
                tracing::warn!(line = payload, error = %e, "skipping malformed stream line");
                false
            }
        }
    }

    fn mark_flushed(&mut self) {
        self.flushed_chars = self.chars;
    }

    fn fully_flushed(&self) -> bool {
        self.flushed_chars == self.chars
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn chars(&self) -> usize {
        self.chars
    }

    fn into_text(self) -> String {
        self.text
    }
}

/// Drain a byte stream into text, for non-OK error bodies.
async fn read_body_text(mut body: ByteStream) -> String {
    let mut buf = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        buf.extend_from_slice(&chunk);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
