use async_trait::async_trait;
use cardflow_core::CardflowError;
use cardflow_dify::ChatClient;

/// The card rendering target of one orchestration cycle.
///
/// Narrow seam over the platform's card lifecycle so the state machine is
/// testable against a fake.
#[async_trait]
pub trait CardSurface: Send + Sync {
    /// Create the placeholder card. Returns the instance id every later
    /// update must carry.
    async fn create(&self, initial_content: &str) -> Result<String, CardflowError>;

    /// Update the card's content and terminal flags.
    async fn update(
        &self,
        instance_id: &str,
        content: &str,
        finished: bool,
        failed: bool,
    ) -> Result<(), CardflowError>;

    /// Plain-text reply outside any card (used when no card exists).
    async fn reply_text(&self, text: &str) -> Result<(), CardflowError>;
}

/// User-facing texts and policies of the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    /// Initial card content shown while the answer is generated.
    pub placeholder: String,
    /// Card content on the failure path.
    pub error_text: String,
    /// Plain-text reply when card creation itself fails.
    pub fallback_text: String,
    /// Whether the failure update also marks the card finished.
    /// `false` leaves the failed card open.
    pub finish_on_failure: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            placeholder: String::new(),
            error_text: String::new(),
            fallback_text: "Something went wrong, please try again later.".to_string(),
            finish_on_failure: false,
        }
    }
}

impl OrchestratorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = text.into();
        self
    }

    pub fn with_error_text(mut self, text: impl Into<String>) -> Self {
        self.error_text = text.into();
        self
    }

    pub fn with_fallback_text(mut self, text: impl Into<String>) -> Self {
        self.fallback_text = text.into();
        self
    }

    pub fn with_finish_on_failure(mut self, finish: bool) -> Self {
        self.finish_on_failure = finish;
        self
    }
}

/// Terminal state of one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Stream completed; card finalized with the full answer.
    Finished,
    /// Stream or an update failed; card driven to its failure state.
    Failed,
    /// Card creation failed; a plain-text reply was sent instead.
    Fallback,
}

/// Drive one complete request → stream → render cycle.
///
/// `create → streaming → finished | failed`, with a `fallback` exit when
/// creation fails. Errors never escape: every path degrades to a
/// best-effort card update or text reply and a log line.
pub async fn run_card_cycle<S: CardSurface + ?Sized>(
    surface: &S,
    chat: &ChatClient,
    query: &str,
    options: &OrchestratorOptions,
) -> CycleOutcome {
    let instance_id = match surface.create(&options.placeholder).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!(error = %e, "card creation failed, falling back to text reply");
            if let Err(reply_err) = surface.reply_text(&options.fallback_text).await {
                tracing::error!(error = %reply_err, "fallback reply failed");
            }
            return CycleOutcome::Fallback;
        }
    };

    let streamed = chat
        .stream_chat(query, |content| {
            let id = instance_id.clone();
            async move { surface.update(&id, &content, false, false).await }
        })
        .await;

    match streamed {
        Ok(full) => {
            if let Err(e) = surface.update(&instance_id, &full, true, false).await {
                tracing::error!(error = %e, "finishing card update failed");
            }
            CycleOutcome::Finished
        }
        Err(e) => {
            tracing::error!(error = %e, "chat stream failed");
            if let Err(update_err) = surface
                .update(
                    &instance_id,
                    &options.error_text,
                    options.finish_on_failure,
                    true,
                )
                .await
            {
                tracing::error!(error = %update_err, "failure card update failed");
            }
            CycleOutcome::Failed
        }
    }
}
