use thiserror::Error;

/// Unified error type for the cardflow relay.
#[derive(Error, Debug)]
pub enum CardflowError {
    /// The generation API answered with a non-OK status.
    ///
    /// Carries the HTTP status and the response body text so the failure is
    /// diagnosable from the log line alone.
    #[error("upstream error (status {status}): {body}")]
    Upstream { status: u16, body: String },

    /// Transport-level failure talking to the generation API.
    #[error("model error: {0}")]
    Model(String),

    /// A payload could not be decoded.
    #[error("parsing error: {0}")]
    Parsing(String),

    /// Card creation or update against the messaging platform failed.
    #[error("card surface error: {0}")]
    CardSurface(String),

    /// Stream-mode gateway failure (connection open, socket, frames).
    #[error("gateway error: {0}")]
    Gateway(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
