//! Streaming client for a Dify `chat-messages` endpoint.
//!
//! [`ChatClient::stream_chat`] performs one streaming request, accumulates
//! the `answer` fields of the `data: {json}` records in the response body,
//! and invokes a caller-supplied async callback with the full accumulated
//! text whenever it has grown past a configurable threshold — bounding the
//! number of downstream UI updates regardless of how finely the network
//! chunks the response.
//!
//! The HTTP transport sits behind the [`ChatBackend`] trait so the flush
//! policy is testable with a scripted [`FakeBackend`].

mod backend;
mod stream;

pub use backend::{ByteStream, ChatBackend, ChatHttpRequest, FakeBackend, HttpBackend, StreamedResponse};
pub use stream::{ChatClient, DifyConfig, DEFAULT_FLUSH_THRESHOLD};
