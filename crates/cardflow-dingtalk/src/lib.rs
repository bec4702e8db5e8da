//! DingTalk open-platform integration for the cardflow relay.
//!
//! Three narrow surfaces:
//!
//! - [`gateway`] — the stream-mode (WebSocket) gateway listener that delivers
//!   inbound robot messages to a [`gateway::MessageHandler`]
//! - [`AiCardReplier`] — AI interactive cards: create-and-deliver plus
//!   in-place streaming updates
//! - [`WebhookClient`] — plain-text replies through a message's session
//!   webhook, used when no card exists

mod auth;
pub mod api;
pub mod gateway;
mod replier;

pub use api::card::CardSpace;
pub use api::webhook::WebhookClient;
pub use replier::AiCardReplier;

use std::sync::Arc;

use auth::TokenCache;

const DEFAULT_API_BASE: &str = "https://api.dingtalk.com";

/// DingTalk application credentials and API base.
#[derive(Debug, Clone)]
pub struct DingTalkConfig {
    /// AppKey (client id) of the application.
    pub client_id: String,
    /// AppSecret (client secret) of the application.
    pub client_secret: String,
    /// Open-platform API base URL.
    pub api_base: String,
}

impl DingTalkConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub(crate) fn token_cache(&self) -> TokenCache {
        TokenCache::new(Arc::new(self.clone()))
    }
}
