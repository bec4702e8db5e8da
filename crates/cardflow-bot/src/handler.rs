use std::sync::Arc;

use async_trait::async_trait;
use cardflow_core::CardflowError;
use cardflow_dify::ChatClient;
use cardflow_dingtalk::gateway::{MessageHandler, RobotMessage};
use cardflow_dingtalk::{AiCardReplier, WebhookClient};

use crate::orchestrator::{run_card_cycle, OrchestratorOptions};
use crate::registry::TaskRegistry;
use crate::surface::DingTalkCardTarget;

const DEFAULT_NON_TEXT_REPLY: &str = "I can only read text messages.";

/// Gateway message handler: text messages become supervised card cycles,
/// anything else gets a short plain-text notice.
pub struct CardBotHandler {
    chat: Arc<ChatClient>,
    replier: Arc<AiCardReplier>,
    webhook: Arc<WebhookClient>,
    registry: Arc<TaskRegistry>,
    options: OrchestratorOptions,
    non_text_reply: String,
}

impl CardBotHandler {
    pub fn new(
        chat: Arc<ChatClient>,
        replier: Arc<AiCardReplier>,
        webhook: Arc<WebhookClient>,
        registry: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            chat,
            replier,
            webhook,
            registry,
            options: OrchestratorOptions::default(),
            non_text_reply: DEFAULT_NON_TEXT_REPLY.to_string(),
        }
    }

    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_non_text_reply(mut self, text: impl Into<String>) -> Self {
        self.non_text_reply = text.into();
        self
    }
}

#[async_trait]
impl MessageHandler for CardBotHandler {
    async fn handle(&self, message: RobotMessage) -> Result<(), CardflowError> {
        if !message.is_text() {
            if let Err(e) = self
                .webhook
                .reply_text(&message.session_webhook, &self.non_text_reply)
                .await
            {
                tracing::warn!(error = %e, "non-text notice reply failed");
            }
            return Ok(());
        }

        let query = message.text().to_string();
        let surface =
            DingTalkCardTarget::new(self.replier.clone(), self.webhook.clone(), &message);
        let chat = self.chat.clone();
        let options = self.options.clone();
        let msg_id = message.msg_id.clone();

        let task_id = self.registry.spawn(async move {
            let outcome = run_card_cycle(&surface, &chat, &query, &options).await;
            tracing::info!(msg_id = %msg_id, ?outcome, "card cycle ended");
        });
        tracing::debug!(task_id, "card cycle dispatched");
        Ok(())
    }
}
