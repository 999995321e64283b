use core::fmt;
use std::sync::Arc;

use tokio::{
    sync::mpsc,
    task::{JoinError, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    commands::{CommandDispatcher, DispatchOutcome},
    completion::Completer,
    config::ResponderConfig,
    context::ContextBuilder,
    error::PipelineError,
    message::{ConversationId, ConversationKind, InboundMessage},
    session::{Presence, SessionProvider},
    state::AutoReplyState,
    truncate,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyText,
    SelfOriginated,
    Inactive,
    GroupConversation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Command,
    Skipped(SkipReason),
    Replied,
}

/// Command dispatch followed by auto-reply for everything that is admitted.
pub struct AutoReplyPipeline {
    session: Arc<dyn SessionProvider>,
    completer: Arc<dyn Completer>,
    dispatcher: CommandDispatcher,
    context: ContextBuilder,
    state: AutoReplyState,
}

impl fmt::Debug for AutoReplyPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoReplyPipeline")
            .field("dispatcher", &self.dispatcher)
            .field("context", &self.context)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl AutoReplyPipeline {
    pub fn new(
        config: &ResponderConfig,
        state: AutoReplyState,
        session: Arc<dyn SessionProvider>,
        completer: Arc<dyn Completer>,
    ) -> Self {
        Self {
            session,
            completer,
            dispatcher: CommandDispatcher::new(config, state.clone()),
            context: ContextBuilder::new(config.context_window),
            state,
        }
    }

    /// Handles one message, logging the outcome. Never fails.
    pub async fn process(&self, message: &InboundMessage) {
        log_incoming(message);
        log_outcome(message, self.handle_inbound(message).await);
    }

    /// # Errors
    ///
    /// Returns the first failing stage once the message has been admitted.
    pub async fn handle_inbound(
        &self,
        message: &InboundMessage,
    ) -> Result<PipelineOutcome, PipelineError> {
        match self.screen(message).await {
            Screened::Done(outcome) => Ok(outcome),
            Screened::Admitted(text) => self.respond(message, &text).await,
        }
    }

    /// Runs the owner command path and the admission rules. Admission reads the
    /// auto-reply state at this point, so later commands do not affect it.
    async fn screen(&self, message: &InboundMessage) -> Screened {
        if self.dispatcher.dispatch(self.session.as_ref(), message).await == DispatchOutcome::Handled {
            return Screened::Done(PipelineOutcome::Command);
        }
        match self.admit(message) {
            Ok(text) => Screened::Admitted(text.to_owned()),
            Err(reason) => Screened::Done(PipelineOutcome::Skipped(reason)),
        }
    }

    fn admit<'a>(&self, message: &'a InboundMessage) -> Result<&'a str, SkipReason> {
        let text = message.text().ok_or(SkipReason::EmptyText)?;
        if message.from_me {
            return Err(SkipReason::SelfOriginated);
        }
        if !self.state.is_active() {
            return Err(SkipReason::Inactive);
        }
        if message.kind == ConversationKind::Group {
            return Err(SkipReason::GroupConversation);
        }
        Ok(text)
    }

    async fn respond(
        &self,
        message: &InboundMessage,
        text: &str,
    ) -> Result<PipelineOutcome, PipelineError> {
        let conversation = &message.conversation;
        self.signal(conversation, Presence::Composing).await;
        let result = self.reply(message, text).await;
        self.signal(conversation, Presence::Paused).await;
        result.map(|()| PipelineOutcome::Replied)
    }

    async fn reply(&self, message: &InboundMessage, text: &str) -> Result<(), PipelineError> {
        let conversation = &message.conversation;
        let transcript = self
            .context
            .build_context(self.session.as_ref(), conversation, &message.id, text)
            .await?;
        let reply = self.completer.complete(&transcript).await;
        self.session
            .send_message(conversation, &reply)
            .await
            .map_err(|error| PipelineError::Send {
                conversation: conversation.clone(),
                error,
            })
    }

    async fn signal(&self, conversation: &ConversationId, presence: Presence) {
        if let Err(e) = self.session.send_presence(conversation, presence).await {
            debug!(error = %e, conversation = %conversation, ?presence, "Presence update failed");
        }
    }
}

enum Screened {
    Done(PipelineOutcome),
    Admitted(String),
}

fn log_incoming(message: &InboundMessage) {
    info!(
        conversation = %message.conversation,
        sender = %message.sender,
        from_me = message.from_me,
        body = ?message.text().map(|t| truncate(t, 200)),
        "Incoming message"
    );
}

fn log_outcome(message: &InboundMessage, result: Result<PipelineOutcome, PipelineError>) {
    match result {
        Ok(PipelineOutcome::Replied) => {
            info!(conversation = %message.conversation, "Auto-reply sent");
        }
        Ok(outcome) => {
            debug!(conversation = %message.conversation, ?outcome, "No auto-reply");
        }
        Err(e) => {
            warn!(error = %e, conversation = %message.conversation, "Auto-reply failed");
        }
    }
}

/// Drains the inbound channel in arrival order.
///
/// Commands and admission run inline, so they always see messages in order.
/// Admitted replies run as separate tasks: a slow or hung reply holds up only
/// its own conversation turn, and a panic inside one is logged instead of
/// tearing down the loop.
pub async fn run_inbound(pipeline: Arc<AutoReplyPipeline>, mut inbound: mpsc::Receiver<InboundMessage>) {
    let mut replies = JoinSet::new();
    loop {
        tokio::select! {
            received = inbound.recv() => {
                let Some(message) = received else { break };
                log_incoming(&message);
                match pipeline.screen(&message).await {
                    Screened::Done(outcome) => log_outcome(&message, Ok(outcome)),
                    Screened::Admitted(text) => {
                        let pipeline = Arc::clone(&pipeline);
                        replies.spawn(async move {
                            let result = pipeline.respond(&message, &text).await;
                            log_outcome(&message, result);
                        });
                    }
                }
            }
            Some(joined) = replies.join_next(), if !replies.is_empty() => {
                log_join(joined);
            }
        }
    }
    info!(pending = replies.len(), "Inbound channel closed");
    while let Some(joined) = replies.join_next().await {
        log_join(joined);
    }
}

fn log_join(joined: Result<(), JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "Reply task aborted");
    }
}
