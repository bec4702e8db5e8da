use serde_json::Value;

use cardflow_core::CardflowError;

use crate::api::card::{CardApi, CardSpace};
use crate::DingTalkConfig;

/// Default card element receiving the streamed text.
const DEFAULT_CONTENT_KEY: &str = "content";

/// AI-card replier bound to one card template.
///
/// Lifecycle per conversation turn: [`create_and_deliver`] places a
/// placeholder card and returns its instance id, then
/// [`streaming_update`] repeatedly replaces the content element with the
/// growing text, finalizing or failing the card on the last call.
///
/// [`create_and_deliver`]: AiCardReplier::create_and_deliver
/// [`streaming_update`]: AiCardReplier::streaming_update
pub struct AiCardReplier {
    api: CardApi,
    template_id: String,
    content_key: String,
}

impl AiCardReplier {
    pub fn new(config: DingTalkConfig, template_id: impl Into<String>) -> Self {
        Self {
            api: CardApi::new(config),
            template_id: template_id.into(),
            content_key: DEFAULT_CONTENT_KEY.to_string(),
        }
    }

    pub fn with_content_key(mut self, key: impl Into<String>) -> Self {
        self.content_key = key.into();
        self
    }

    /// Deliver a new card instance into `space` showing `initial_content`.
    /// Returns the instance id all further updates must carry.
    pub async fn create_and_deliver(
        &self,
        space: &CardSpace,
        initial_content: &str,
    ) -> Result<String, CardflowError> {
        let mut card_param_map = serde_json::Map::new();
        card_param_map.insert(
            self.content_key.clone(),
            Value::String(initial_content.to_string()),
        );
        self.api
            .create_and_deliver(&self.template_id, space, &Value::Object(card_param_map))
            .await
    }

    /// Replace the card's content element with the full `content` text.
    pub async fn streaming_update(
        &self,
        instance_id: &str,
        content: &str,
        finished: bool,
        failed: bool,
    ) -> Result<(), CardflowError> {
        self.api
            .streaming_update(instance_id, &self.content_key, content, false, finished, failed)
            .await
    }
}
