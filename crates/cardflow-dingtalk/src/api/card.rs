use serde_json::{json, Value};

use cardflow_core::CardflowError;

use crate::auth::{TokenCache, TOKEN_HEADER};
use crate::gateway::RobotMessage;
use crate::DingTalkConfig;

/// Where a card is delivered: a private robot session or a group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardSpace {
    Private {
        staff_id: String,
        robot_code: String,
    },
    Group {
        open_conversation_id: String,
        robot_code: String,
    },
}

impl CardSpace {
    /// Derive the delivery space from an inbound robot message.
    pub fn from_message(message: &RobotMessage) -> Self {
        if message.is_group() {
            Self::Group {
                open_conversation_id: message.conversation_id.clone(),
                robot_code: message.robot_code.clone(),
            }
        } else {
            Self::Private {
                staff_id: message.sender_staff_id.clone(),
                robot_code: message.robot_code.clone(),
            }
        }
    }

    /// Platform `openSpaceId` form for this space.
    pub fn open_space_id(&self) -> String {
        match self {
            Self::Private { staff_id, .. } => format!("dtv1.card//IM_ROBOT.{staff_id}"),
            Self::Group {
                open_conversation_id,
                ..
            } => format!("dtv1.card//IM_GROUP.{open_conversation_id}"),
        }
    }
}

/// Body for `POST /v1.0/card/instances/createAndDeliver`.
pub fn build_create_payload(
    template_id: &str,
    out_track_id: &str,
    space: &CardSpace,
    card_param_map: &Value,
) -> Value {
    let mut body = json!({
        "cardTemplateId": template_id,
        "outTrackId": out_track_id,
        "cardData": { "cardParamMap": card_param_map },
        "openSpaceId": space.open_space_id(),
    });
    match space {
        CardSpace::Group { robot_code, .. } => {
            body["imGroupOpenSpaceModel"] = json!({ "supportForward": true });
            body["imGroupOpenDeliverModel"] = json!({ "robotCode": robot_code });
        }
        CardSpace::Private { robot_code, .. } => {
            body["imRobotOpenSpaceModel"] = json!({ "supportForward": true });
            body["imRobotOpenDeliverModel"] = json!({
                "spaceType": "IM_ROBOT",
                "robotCode": robot_code,
            });
        }
    }
    body
}

/// Body for `PUT /v1.0/card/streaming`.
///
/// `append = false` replaces the element's content with the full text
/// (`isFull: true`); `finished` / `failed` map to the platform's
/// `isFinalize` / `isError` terminal flags.
pub fn build_streaming_payload(
    out_track_id: &str,
    guid: &str,
    key: &str,
    content: &str,
    append: bool,
    finished: bool,
    failed: bool,
) -> Value {
    json!({
        "outTrackId": out_track_id,
        "guid": guid,
        "key": key,
        "content": content,
        "isFull": !append,
        "isFinalize": finished,
        "isError": failed,
    })
}

/// Internal HTTP helper for the DingTalk card API.
///
/// ## AI-card flow
///
/// 1. [`create_and_deliver`](CardApi::create_and_deliver) — deliver a card
///    instance from a template → its `outTrackId` becomes the instance id
/// 2. [`streaming_update`](CardApi::streaming_update) — stream the full
///    accumulated text into one card element, finalizing or failing it on
///    the last call
pub(crate) struct CardApi {
    token_cache: TokenCache,
    base_url: String,
    client: reqwest::Client,
}

impl CardApi {
    pub fn new(config: DingTalkConfig) -> Self {
        let base_url = config.api_base.clone();
        Self {
            token_cache: config.token_cache(),
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a card instance from `template_id` and deliver it into `space`.
    /// Returns the client-generated `outTrackId` identifying the instance.
    pub async fn create_and_deliver(
        &self,
        template_id: &str,
        space: &CardSpace,
        card_param_map: &Value,
    ) -> Result<String, CardflowError> {
        let out_track_id = uuid::Uuid::new_v4().to_string();
        let token = self.token_cache.get_token().await?;
        let url = format!("{}/v1.0/card/instances/createAndDeliver", self.base_url);
        let body = build_create_payload(template_id, &out_track_id, space, card_param_map);
        let resp = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, &token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CardflowError::CardSurface(format!("card create: {e}")))?;
        check_response(resp, "card create").await?;
        Ok(out_track_id)
    }

    /// Stream `content` into the card element identified by `key`.
    pub async fn streaming_update(
        &self,
        out_track_id: &str,
        key: &str,
        content: &str,
        append: bool,
        finished: bool,
        failed: bool,
    ) -> Result<(), CardflowError> {
        let guid = uuid::Uuid::new_v4().to_string();
        let token = self.token_cache.get_token().await?;
        let url = format!("{}/v1.0/card/streaming", self.base_url);
        let body =
            build_streaming_payload(out_track_id, &guid, key, content, append, finished, failed);
        let resp = self
            .client
            .put(&url)
            .header(TOKEN_HEADER, &token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CardflowError::CardSurface(format!("card streaming: {e}")))?;
        check_response(resp, "card streaming").await?;
        Ok(())
    }
}

async fn check_response(resp: reqwest::Response, ctx: &str) -> Result<Value, CardflowError> {
    let status = resp.status();
    let body: Value = resp
        .json()
        .await
        .map_err(|e| CardflowError::CardSurface(format!("{ctx} parse: {e}")))?;
    if !status.is_success() || body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(CardflowError::CardSurface(format!(
            "DingTalk card API error ({ctx}) status={}: {}",
            status.as_u16(),
            body["message"].as_str().unwrap_or("unknown")
        )));
    }
    Ok(body)
}
