use serde::Deserialize;

use cardflow_core::CardflowError;

/// Decoded inbound robot message (the payload of a chatbot CALLBACK frame).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RobotMessage {
    #[serde(default, rename = "msgId")]
    pub msg_id: String,
    #[serde(default, rename = "msgtype")]
    pub msg_type: String,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default, rename = "senderStaffId")]
    pub sender_staff_id: String,
    #[serde(default, rename = "senderNick")]
    pub sender_nick: String,
    /// `"1"` private, `"2"` group.
    #[serde(default, rename = "conversationType")]
    pub conversation_type: String,
    #[serde(default, rename = "conversationId")]
    pub conversation_id: String,
    #[serde(default, rename = "robotCode")]
    pub robot_code: String,
    /// Short-lived reply webhook for this conversation.
    #[serde(default, rename = "sessionWebhook")]
    pub session_webhook: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub content: String,
}

impl RobotMessage {
    pub fn from_json(data: &str) -> Result<Self, CardflowError> {
        serde_json::from_str(data)
            .map_err(|e| CardflowError::Gateway(format!("robot message parse: {e}")))
    }

    pub fn is_text(&self) -> bool {
        self.msg_type == "text"
    }

    pub fn is_group(&self) -> bool {
        self.conversation_type == "2"
    }

    /// Text payload, trimmed (mentions leave leading whitespace).
    pub fn text(&self) -> &str {
        self.text
            .as_ref()
            .map(|t| t.content.trim())
            .unwrap_or_default()
    }
}
