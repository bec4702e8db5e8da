use serde_json::{json, Value};

use cardflow_core::CardflowError;

/// Topic of inbound robot (chatbot) messages.
pub const TOPIC_ROBOT_MESSAGE: &str = "/v1.0/im/bot/messages/get";

pub const FRAME_TYPE_SYSTEM: &str = "SYSTEM";
pub const FRAME_TYPE_CALLBACK: &str = "CALLBACK";

pub const TOPIC_PING: &str = "ping";
pub const TOPIC_DISCONNECT: &str = "disconnect";

/// One decoded gateway frame.
///
/// The gateway wraps every push in the same envelope: a frame type, routing
/// headers, and a `data` field holding the payload as a JSON *string*.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayFrame {
    pub frame_type: String,
    pub topic: String,
    pub message_id: String,
    pub data: String,
}

/// Decode a raw text frame.
pub fn parse_frame(text: &str) -> Result<GatewayFrame, CardflowError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| CardflowError::Gateway(format!("frame parse: {e}")))?;
    Ok(GatewayFrame {
        frame_type: value["type"].as_str().unwrap_or("").to_string(),
        topic: value["headers"]["topic"].as_str().unwrap_or("").to_string(),
        message_id: value["headers"]["messageId"]
            .as_str()
            .unwrap_or("")
            .to_string(),
        data: value["data"].as_str().unwrap_or("").to_string(),
    })
}

/// Reply to a SYSTEM `ping`: code 200 echoing the frame's data.
pub fn build_pong_frame(frame: &GatewayFrame) -> Value {
    json!({
        "code": 200,
        "headers": {
            "messageId": frame.message_id,
            "contentType": "application/json",
        },
        "message": "OK",
        "data": frame.data,
    })
}

/// Acknowledge a CALLBACK frame as successfully received.
///
/// Sent before the message is processed, so processing time never delays
/// the ack or triggers gateway redelivery.
pub fn build_callback_ack(message_id: &str) -> Value {
    json!({
        "code": 200,
        "headers": {
            "messageId": message_id,
            "contentType": "application/json",
        },
        "message": "OK",
        "data": json!({ "status": "SUCCESS", "message": "OK" }).to_string(),
    })
}
