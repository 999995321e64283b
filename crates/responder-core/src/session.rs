use core::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::message::{ConversationId, HistoryEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Composing,
    Paused,
}

/// Outbound side of a chat-network session.
///
/// Inbound messages do not go through this trait: the adapter pushes them into
/// a channel consumed by [`crate::run_inbound`].
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn send_message(&self, conversation: &ConversationId, text: &str) -> Result<()>;

    async fn send_presence(&self, conversation: &ConversationId, presence: Presence) -> Result<()>;

    /// Up to `count` of the most recent messages, oldest first.
    async fn fetch_recent_messages(
        &self,
        conversation: &ConversationId,
        count: usize,
    ) -> Result<Vec<HistoryEntry>>;
}

/// Why a session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisconnectReason {
    #[error("session is invalid")]
    BadSession,
    #[error("session was replaced by another login")]
    ConnectionReplaced,
    #[error("logged out")]
    LoggedOut,
    #[error("transport failure: {0}")]
    Transport(String),
}

impl DisconnectReason {
    /// Terminal reasons need a fresh login; retrying with the same session is pointless.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::BadSession | Self::ConnectionReplaced | Self::LoggedOut)
    }
}

/// Runs one session until it closes.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn run_session(&self) -> DisconnectReason;
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: None,
        }
    }
}

/// Keeps a session running, reconnecting after non-terminal disconnects.
///
/// Returns the reason that ended supervision: a terminal disconnect, or the
/// last transport failure once `max_attempts` reconnects have been used up.
pub async fn supervise(connector: &dyn Connector, policy: &ReconnectPolicy) -> DisconnectReason {
    let mut attempts: u32 = 0;
    loop {
        let reason = connector.run_session().await;
        if reason.is_terminal() {
            error!(reason = %reason, "Session closed; not reconnecting");
            return reason;
        }
        attempts = attempts.saturating_add(1);
        if policy.max_attempts.is_some_and(|max| attempts > max) {
            error!(reason = %reason, attempts, "Reconnect attempts exhausted");
            return reason;
        }
        warn!(
            reason = %reason,
            attempt = attempts,
            delay_ms = u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
            "Session closed; reconnecting"
        );
        tokio::time::sleep(policy.delay).await;
        info!(attempt = attempts, "Reconnecting session");
    }
}
