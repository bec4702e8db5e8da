//! Relay bot core: the card-update orchestrator and its wiring.
//!
//! One inbound text message drives one complete cycle:
//! create a placeholder card, stream the generated answer into it, and
//! finalize it — or drive it into a failure state, or fall back to a
//! plain-text reply when the card could not be created at all. Cycles run
//! as supervised tasks under a bounded concurrency limit.

pub mod handler;
pub mod orchestrator;
pub mod registry;
pub mod surface;

pub use handler::CardBotHandler;
pub use orchestrator::{run_card_cycle, CardSurface, CycleOutcome, OrchestratorOptions};
pub use registry::TaskRegistry;
pub use surface::DingTalkCardTarget;
