use serde_json::{json, Value};

use cardflow_core::CardflowError;

/// Body for a plain-text session-webhook reply.
pub fn build_text_reply(text: &str) -> Value {
    json!({
        "msgtype": "text",
        "text": { "content": text },
    })
}

/// Replies through a message's session webhook.
///
/// Session webhooks are self-authorizing short-lived URLs carried on each
/// inbound robot message; no access token is involved.
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Send a plain-text reply into the conversation the webhook belongs to.
    pub async fn reply_text(&self, webhook_url: &str, text: &str) -> Result<(), CardflowError> {
        let resp: Value = self
            .client
            .post(webhook_url)
            .json(&build_text_reply(text))
            .send()
            .await
            .map_err(|e| CardflowError::CardSurface(format!("webhook reply: {e}")))?
            .json()
            .await
            .map_err(|e| CardflowError::CardSurface(format!("webhook reply parse: {e}")))?;
        let errcode = resp["errcode"].as_i64().unwrap_or(-1);
        if errcode != 0 {
            return Err(CardflowError::CardSurface(format!(
                "webhook reply error errcode={errcode}: {}",
                resp["errmsg"].as_str().unwrap_or("unknown")
            )));
        }
        Ok(())
    }
}

impl Default for WebhookClient {
    fn default() -> Self {
        Self::new()
    }
}
