//! Stream-mode gateway listener.
//!
//! Opens a long connection against the open-platform gateway, answers its
//! keepalive pings, and dispatches robot-message callbacks to a registered
//! [`MessageHandler`]. Every callback is acked before it is processed, so a
//! slow handler never delays the ack or triggers redelivery.

mod frame;
mod message;

pub use frame::{
    build_callback_ack, build_pong_frame, parse_frame, GatewayFrame, FRAME_TYPE_CALLBACK,
    FRAME_TYPE_SYSTEM, TOPIC_DISCONNECT, TOPIC_PING, TOPIC_ROBOT_MESSAGE,
};
pub use message::{RobotMessage, TextContent};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cardflow_core::CardflowError;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::DingTalkConfig;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Receives inbound robot messages.
///
/// `handle` should return quickly; long-running work belongs on a spawned
/// task so the gateway read loop keeps draining frames.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: RobotMessage) -> Result<(), CardflowError>;
}

/// Long-connection listener for the stream-mode gateway.
pub struct StreamGatewayListener {
    config: DingTalkConfig,
    handler: Option<Arc<dyn MessageHandler>>,
    reconnect_delay: Duration,
    client: reqwest::Client,
}

impl StreamGatewayListener {
    pub fn new(config: DingTalkConfig) -> Self {
        Self {
            config,
            handler: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_message_handler(mut self, handler: impl MessageHandler + 'static) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Connect and serve until the process is stopped.
    ///
    /// A failure to open the very first connection is returned (startup
    /// misconfiguration); once connected, closed or broken connections are
    /// logged and reopened after a short delay.
    pub async fn run(&self) -> Result<(), CardflowError> {
        let handler = self
            .handler
            .clone()
            .ok_or_else(|| CardflowError::Config("no message handler registered".to_string()))?;

        let mut connected_once = false;
        loop {
            let url = match self.open_connection().await {
                Ok(url) => url,
                Err(e) if !connected_once => return Err(e),
                Err(e) => {
                    tracing::warn!(error = %e, "gateway connection open failed, retrying");
                    tokio::time::sleep(self.reconnect_delay).await;
                    continue;
                }
            };
            connected_once = true;

            match self.serve(&url, &handler).await {
                Ok(()) => tracing::info!("gateway connection closed, reconnecting"),
                Err(e) => tracing::warn!(error = %e, "gateway connection error, reconnecting"),
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// POST `/v1.0/gateway/connections/open` → `wss://{endpoint}?ticket=`.
    async fn open_connection(&self) -> Result<String, CardflowError> {
        let url = format!("{}/v1.0/gateway/connections/open", self.config.api_base);
        let body = json!({
            "clientId": self.config.client_id,
            "clientSecret": self.config.client_secret,
            "ua": format!("cardflow/{}", env!("CARGO_PKG_VERSION")),
            "subscriptions": [
                { "type": "CALLBACK", "topic": TOPIC_ROBOT_MESSAGE }
            ],
        });
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| CardflowError::Gateway(format!("connection open: {e}")))?;
        let status = resp.status();
        let value: Value = resp
            .json()
            .await
            .map_err(|e| CardflowError::Gateway(format!("connection open parse: {e}")))?;
        if !status.is_success() {
            return Err(CardflowError::Gateway(format!(
                "connection open status={}: {}",
                status.as_u16(),
                value["message"].as_str().unwrap_or("unknown")
            )));
        }
        let endpoint = value["endpoint"]
            .as_str()
            .ok_or_else(|| CardflowError::Gateway("connection open: missing endpoint".to_string()))?;
        let ticket = value["ticket"]
            .as_str()
            .ok_or_else(|| CardflowError::Gateway("connection open: missing ticket".to_string()))?;
        Ok(format!("{endpoint}?ticket={ticket}"))
    }

    async fn serve(
        &self,
        url: &str,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<(), CardflowError> {
        let (mut ws, _) = connect_async(url)
            .await
            .map_err(|e| CardflowError::Gateway(format!("websocket connect: {e}")))?;
        tracing::info!("gateway connected");

        while let Some(next) = ws.next().await {
            let msg = next.map_err(|e| CardflowError::Gateway(format!("websocket read: {e}")))?;
            match msg {
                Message::Text(text) => {
                    let frame = match parse_frame(&text) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping undecodable gateway frame");
                            continue;
                        }
                    };
                    if let FrameFlow::Stop = self.dispatch_frame(&mut ws, frame, handler).await? {
                        return Ok(());
                    }
                }
                Message::Ping(payload) => {
                    ws.send(Message::Pong(payload))
                        .await
                        .map_err(|e| CardflowError::Gateway(format!("websocket send: {e}")))?;
                }
                Message::Close(_) => return Ok(()),
                _ => continue,
            }
        }
        Ok(())
    }

    async fn dispatch_frame(
        &self,
        ws: &mut WsStream,
        frame: GatewayFrame,
        handler: &Arc<dyn MessageHandler>,
    ) -> Result<FrameFlow, CardflowError> {
        match (frame.frame_type.as_str(), frame.topic.as_str()) {
            (FRAME_TYPE_SYSTEM, TOPIC_PING) => {
                send_json(ws, &build_pong_frame(&frame)).await?;
            }
            (FRAME_TYPE_SYSTEM, TOPIC_DISCONNECT) => {
                tracing::info!("gateway requested disconnect");
                return Ok(FrameFlow::Stop);
            }
            (FRAME_TYPE_CALLBACK, TOPIC_ROBOT_MESSAGE) => {
                send_json(ws, &build_callback_ack(&frame.message_id)).await?;
                match RobotMessage::from_json(&frame.data) {
                    Ok(message) => {
                        tracing::debug!(
                            msg_id = %message.msg_id,
                            msg_type = %message.msg_type,
                            "robot message received"
                        );
                        if let Err(e) = handler.handle(message).await {
                            tracing::error!(error = %e, "message handler failed");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "undecodable robot message"),
                }
            }
            (FRAME_TYPE_CALLBACK, topic) => {
                // Ack anyway so the gateway stops redelivering.
                send_json(ws, &build_callback_ack(&frame.message_id)).await?;
                tracing::debug!(topic, "no handler for callback topic");
            }
            _ => {
                tracing::debug!(
                    frame_type = %frame.frame_type,
                    topic = %frame.topic,
                    "ignoring gateway frame"
                );
            }
        }
        Ok(FrameFlow::Continue)
    }
}

enum FrameFlow {
    Continue,
    Stop,
}

async fn send_json(ws: &mut WsStream, value: &Value) -> Result<(), CardflowError> {
    ws.send(Message::Text(value.to_string()))
        .await
        .map_err(|e| CardflowError::Gateway(format!("websocket send: {e}")))
}
