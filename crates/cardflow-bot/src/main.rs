use std::sync::Arc;

use clap::Parser;

use cardflow_bot::{CardBotHandler, OrchestratorOptions, TaskRegistry};
use cardflow_core::CardflowError;
use cardflow_dify::{ChatClient, DifyConfig};
use cardflow_dingtalk::gateway::StreamGatewayListener;
use cardflow_dingtalk::{AiCardReplier, DingTalkConfig, WebhookClient};

#[derive(Parser, Debug)]
#[command(
    name = "cardflow",
    about = "DingTalk AI-card relay bot: streams generated answers into interactive cards"
)]
struct Args {
    /// DingTalk AppKey. Falls back to DINGTALK_CLIENT_ID.
    #[arg(long)]
    client_id: Option<String>,

    /// DingTalk AppSecret. Falls back to DINGTALK_CLIENT_SECRET.
    #[arg(long)]
    client_secret: Option<String>,

    /// Dify chat-messages endpoint URL. Falls back to DIFY_ENDPOINT.
    #[arg(long)]
    dify_endpoint: Option<String>,

    /// Dify application API key. Falls back to DIFY_API_KEY.
    #[arg(long)]
    dify_api_key: Option<String>,

    /// Fixed end-user id sent upstream. Falls back to DIFY_USER.
    #[arg(long)]
    dify_user: Option<String>,

    /// AI card template id. Falls back to DINGTALK_CARD_TEMPLATE_ID.
    #[arg(long)]
    card_template_id: Option<String>,

    /// Maximum concurrently processed messages.
    #[arg(long, default_value_t = 32)]
    max_in_flight: usize,

    /// Also mark the card finished when a cycle fails
    /// (by default a failed card stays open).
    #[arg(long)]
    finish_on_failure: bool,
}

fn required(cli: Option<String>, env_key: &str, flag: &str) -> Result<String, CardflowError> {
    cli.or_else(|| std::env::var(env_key).ok())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| CardflowError::Config(format!("missing {flag} (or {env_key})")))
}

fn optional(cli: Option<String>, env_key: &str) -> Option<String> {
    cli.or_else(|| std::env::var(env_key).ok())
        .filter(|value| !value.is_empty())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let client_id = required(args.client_id, "DINGTALK_CLIENT_ID", "--client-id")?;
    let client_secret = required(args.client_secret, "DINGTALK_CLIENT_SECRET", "--client-secret")?;
    let dify_endpoint = required(args.dify_endpoint, "DIFY_ENDPOINT", "--dify-endpoint")?;
    let dify_api_key = required(args.dify_api_key, "DIFY_API_KEY", "--dify-api-key")?;
    let template_id = required(
        args.card_template_id,
        "DINGTALK_CARD_TEMPLATE_ID",
        "--card-template-id",
    )?;

    let dingtalk = DingTalkConfig::new(&client_id, &client_secret);
    let mut dify = DifyConfig::new(dify_endpoint, dify_api_key);
    if let Some(user) = optional(args.dify_user, "DIFY_USER") {
        dify = dify.with_user(user);
    }

    let chat = Arc::new(ChatClient::new(dify));
    let replier = Arc::new(AiCardReplier::new(dingtalk.clone(), template_id));
    let webhook = Arc::new(WebhookClient::new());
    let registry = Arc::new(TaskRegistry::new(args.max_in_flight));
    let options = OrchestratorOptions::new().with_finish_on_failure(args.finish_on_failure);

    let handler = CardBotHandler::new(chat, replier, webhook, registry).with_options(options);

    tracing::info!(client_id = %client_id, "starting cardflow bot");
    StreamGatewayListener::new(dingtalk)
        .with_message_handler(handler)
        .run()
        .await?;
    Ok(())
}
