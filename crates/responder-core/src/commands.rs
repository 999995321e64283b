use tracing::{debug, info, warn};

use crate::{
    config::{Acknowledgements, ResponderConfig},
    message::InboundMessage,
    session::SessionProvider,
    state::AutoReplyState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The message was an owner command; it must not reach auto-reply.
    Handled,
    Passthrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerCommand {
    Activate,
    Deactivate,
    Status,
}

impl OwnerCommand {
    /// Parses the text that follows the command prefix. Case-insensitive.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "activate" | "activateai" => Some(Self::Activate),
            "deactivate" | "deactivateai" => Some(Self::Deactivate),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Recognizes owner commands and applies them to the shared [`AutoReplyState`].
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    owner: String,
    prefix: String,
    acks: Acknowledgements,
    state: AutoReplyState,
}

impl CommandDispatcher {
    #[must_use]
    pub fn new(config: &ResponderConfig, state: AutoReplyState) -> Self {
        Self {
            owner: config.owner.clone(),
            prefix: config.command_prefix.clone(),
            acks: config.acknowledgements.clone(),
            state,
        }
    }

    /// The text after the prefix when `message` is an owner command attempt.
    fn command_text<'a>(&self, message: &'a InboundMessage) -> Option<&'a str> {
        if message.sender != self.owner {
            return None;
        }
        message.text()?.strip_prefix(self.prefix.as_str())
    }

    pub async fn dispatch(
        &self,
        session: &dyn SessionProvider,
        message: &InboundMessage,
    ) -> DispatchOutcome {
        let Some(raw) = self.command_text(message) else {
            return DispatchOutcome::Passthrough;
        };

        let Some(command) = OwnerCommand::parse(raw) else {
            debug!(command = %raw.trim(), "Ignoring unknown owner command");
            return DispatchOutcome::Handled;
        };

        let reply = match command {
            OwnerCommand::Activate => {
                let was = self.state.set(true);
                info!(was_active = was, "Auto-reply activated by owner");
                self.acks.activated.clone()
            }
            OwnerCommand::Deactivate => {
                let was = self.state.set(false);
                info!(was_active = was, "Auto-reply deactivated by owner");
                self.acks.deactivated.clone()
            }
            OwnerCommand::Status => {
                if self.state.is_active() {
                    self.acks.status_on.clone()
                } else {
                    self.acks.status_off.clone()
                }
            }
        };

        if let Err(e) = session.send_message(&message.conversation, &reply).await {
            warn!(error = %e, conversation = %message.conversation, ?command, "Failed to acknowledge owner command");
        }
        DispatchOutcome::Handled
    }
}
