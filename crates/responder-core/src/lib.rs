pub mod commands;
pub mod completion;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod pipeline;
pub mod session;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::{CommandDispatcher, DispatchOutcome, OwnerCommand};
pub use completion::{Completer, CompletionClient, CompletionError, compose_prompt};
pub use config::{Acknowledgements, CompletionConfig, DEFAULT_PERSONA_PROMPT, ResponderConfig};
pub use context::{ContextBuilder, ConversationTurn, Role};
pub use error::PipelineError;
pub use message::{ConversationId, ConversationKind, HistoryEntry, InboundMessage, MessageContent};
pub use pipeline::{AutoReplyPipeline, PipelineOutcome, SkipReason, run_inbound};
pub use session::{Connector, DisconnectReason, Presence, ReconnectPolicy, SessionProvider, supervise};
pub use state::AutoReplyState;

#[must_use]
pub fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
