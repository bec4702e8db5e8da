use std::{collections::VecDeque, pin::Pin, sync::Arc};

use async_trait::async_trait;
use cardflow_core::CardflowError;
use futures::Stream;
use serde_json::Value;
use tokio::sync::Mutex;

/// An outbound chat request ready to be sent: URL, headers, JSON body.
#[derive(Debug, Clone)]
pub struct ChatHttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<bytes::Bytes, CardflowError>> + Send>>;

/// A streamed response: the initial status plus the body as a byte stream.
///
/// The status is available before a single body byte is read, so callers can
/// reject non-OK responses without touching the stream machinery.
pub struct StreamedResponse {
    pub status: u16,
    pub body: ByteStream,
}

/// Transport seam for the chat client.
///
/// Production uses [`HttpBackend`]; tests script [`FakeBackend`] with queued
/// (status, chunks) pairs to exercise the flush policy without network.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn open_stream(&self, request: ChatHttpRequest) -> Result<StreamedResponse, CardflowError>;
}

/// Production backend using reqwest.
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn open_stream(&self, request: ChatHttpRequest) -> Result<StreamedResponse, CardflowError> {
        use futures::StreamExt;

        let mut builder = self.client.post(&request.url);
        for (key, value) in &request.headers {
            builder = builder.header(key, value);
        }
        builder = builder.json(&request.body);

        let response = builder
            .send()
            .await
            .map_err(|e| CardflowError::Model(format!("HTTP stream request failed: {e}")))?;

        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|result| result.map_err(|e| CardflowError::Model(format!("stream error: {e}"))));

        Ok(StreamedResponse {
            status,
            body: Box::pin(body),
        })
    }
}

type ScriptedStream = Result<(u16, Vec<Result<bytes::Bytes, CardflowError>>), CardflowError>;

/// Test backend with queued scripted responses.
pub struct FakeBackend {
    responses: Arc<Mutex<VecDeque<ScriptedStream>>>,
    requests: Arc<Mutex<Vec<ChatHttpRequest>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queue a response: initial status plus body chunks, delivered in order.
    pub fn push_stream(&self, status: u16, chunks: Vec<bytes::Bytes>) -> &Self {
        self.push_stream_items(status, chunks.into_iter().map(Ok).collect())
    }

    /// Queue a response whose body yields the given chunks, then fails.
    pub fn push_stream_then_error(
        &self,
        status: u16,
        chunks: Vec<bytes::Bytes>,
        error: CardflowError,
    ) -> &Self {
        let mut items: Vec<Result<bytes::Bytes, CardflowError>> =
            chunks.into_iter().map(Ok).collect();
        items.push(Err(error));
        self.push_stream_items(status, items)
    }

    /// Queue a transport-level error for the next request.
    pub fn push_error(&self, error: CardflowError) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Err(error));
        self
    }

    fn push_stream_items(
        &self,
        status: u16,
        items: Vec<Result<bytes::Bytes, CardflowError>>,
    ) -> &Self {
        self.responses
            .try_lock()
            .expect("not concurrent during setup")
            .push_back(Ok((status, items)));
        self
    }

    /// Requests observed so far, in order.
    pub async fn requests(&self) -> Vec<ChatHttpRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatBackend for FakeBackend {
    async fn open_stream(&self, request: ChatHttpRequest) -> Result<StreamedResponse, CardflowError> {
        self.requests.lock().await.push(request);
        let next = self
            .responses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(CardflowError::Model("FakeBackend exhausted".to_string())));
        let (status, items) = next?;
        let body = futures::stream::iter(items);
        Ok(StreamedResponse {
            status,
            body: Box::pin(body),
        })
    }
}
