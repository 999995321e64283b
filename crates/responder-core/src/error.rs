use thiserror::Error;

use crate::message::ConversationId;

/// Failure of one message's trip through the auto-reply pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("fetching history for {conversation} failed: {error:#}")]
    History {
        conversation: ConversationId,
        error: anyhow::Error,
    },
    #[error("sending reply to {conversation} failed: {error:#}")]
    Send {
        conversation: ConversationId,
        error: anyhow::Error,
    },
}
