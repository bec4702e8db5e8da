use std::sync::Arc;
use std::time::{Duration, Instant};

use cardflow_core::CardflowError;
use tokio::sync::Mutex;

use crate::DingTalkConfig;

pub(crate) const TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

/// Cached access token with expiry tracking.
#[derive(Default)]
struct CachedToken {
    token: Option<String>,
    expires_at: Option<Instant>,
}

impl CachedToken {
    /// Returns `true` if the token is still valid (>300s remaining).
    fn is_valid(&self) -> bool {
        match (&self.token, &self.expires_at) {
            (Some(_), Some(exp)) => exp
                .checked_duration_since(Instant::now())
                .map(|remaining| remaining > Duration::from_secs(300))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Thread-safe cache for a DingTalk app access token.
///
/// Automatically refreshes when fewer than 300 seconds remain before expiry.
pub(crate) struct TokenCache {
    config: Arc<DingTalkConfig>,
    inner: Arc<Mutex<CachedToken>>,
    client: reqwest::Client,
}

impl TokenCache {
    pub fn new(config: Arc<DingTalkConfig>) -> Self {
        Self {
            config,
            inner: Arc::new(Mutex::new(CachedToken::default())),
            client: reqwest::Client::new(),
        }
    }

    /// Return a valid access token, refreshing if necessary.
    pub async fn get_token(&self) -> Result<String, CardflowError> {
        let mut guard = self.inner.lock().await;
        if guard.is_valid() {
            return Ok(guard.token.clone().unwrap());
        }
        // Refresh
        let url = format!("{}/v1.0/oauth2/accessToken", self.config.api_base);
        let body = serde_json::json!({
            "appKey": self.config.client_id,
            "appSecret": self.config.client_secret,
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CardflowError::Config(format!("DingTalk token request failed: {e}")))?;

        let json: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CardflowError::Config(format!("DingTalk token parse failed: {e}")))?;

        let token = json["accessToken"].as_str().ok_or_else(|| {
            CardflowError::Config(format!(
                "DingTalk auth error: {}",
                json["message"].as_str().unwrap_or("missing accessToken")
            ))
        })?;
        let expire_secs = json["expireIn"].as_u64().unwrap_or(7200);
        guard.token = Some(token.to_string());
        guard.expires_at = Some(Instant::now() + Duration::from_secs(expire_secs));

        tracing::debug!("DingTalk token refreshed, expires in {}s", expire_secs);
        Ok(token.to_string())
    }
}
