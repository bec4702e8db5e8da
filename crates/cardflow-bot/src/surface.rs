use std::sync::Arc;

use async_trait::async_trait;
use cardflow_core::CardflowError;
use cardflow_dingtalk::gateway::RobotMessage;
use cardflow_dingtalk::{AiCardReplier, CardSpace, WebhookClient};

use crate::orchestrator::CardSurface;

/// Binds the shared card replier and webhook client to one inbound
/// message's delivery space and session webhook.
pub struct DingTalkCardTarget {
    replier: Arc<AiCardReplier>,
    webhook: Arc<WebhookClient>,
    space: CardSpace,
    session_webhook: String,
}

impl DingTalkCardTarget {
    pub fn new(
        replier: Arc<AiCardReplier>,
        webhook: Arc<WebhookClient>,
        message: &RobotMessage,
    ) -> Self {
        Self {
            replier,
            webhook,
            space: CardSpace::from_message(message),
            session_webhook: message.session_webhook.clone(),
        }
    }
}

#[async_trait]
impl CardSurface for DingTalkCardTarget {
    async fn create(&self, initial_content: &str) -> Result<String, CardflowError> {
        self.replier
            .create_and_deliver(&self.space, initial_content)
            .await
    }

    async fn update(
        &self,
        instance_id: &str,
        content: &str,
        finished: bool,
        failed: bool,
    ) -> Result<(), CardflowError> {
        self.replier
            .streaming_update(instance_id, content, finished, failed)
            .await
    }

    async fn reply_text(&self, text: &str) -> Result<(), CardflowError> {
        self.webhook.reply_text(&self.session_webhook, text).await
    }
}
