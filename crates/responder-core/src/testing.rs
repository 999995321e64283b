use std::sync::Mutex;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::{
    completion::Completer,
    context::ConversationTurn,
    message::{ConversationId, ConversationKind, HistoryEntry, InboundMessage, MessageContent},
    session::{Presence, SessionProvider},
};

pub const OWNER: &str = "@owner:example.org";

pub fn inbound(sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: "$event".to_owned(),
        conversation: ConversationId::from("!dm:example.org"),
        kind: ConversationKind::Direct,
        sender: sender.to_owned(),
        from_me: false,
        content: MessageContent::Text(text.to_owned()),
        timestamp: None,
    }
}

pub fn history(from_me: bool, text: &str) -> HistoryEntry {
    HistoryEntry {
        id: format!("${text}"),
        from_me,
        content: MessageContent::Text(text.to_owned()),
        timestamp: None,
    }
}

/// In-memory session that records everything sent through it.
#[derive(Debug, Default)]
pub struct FakeSession {
    pub history: Vec<HistoryEntry>,
    pub fail_history: bool,
    pub fail_send: bool,
    pub sent: Mutex<Vec<(ConversationId, String)>>,
    pub presence: Mutex<Vec<Presence>>,
    pub requested_counts: Mutex<Vec<usize>>,
}

impl FakeSession {
    pub fn with_history(history: Vec<HistoryEntry>) -> Self {
        Self {
            history,
            ..Self::default()
        }
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn presence_updates(&self) -> Vec<Presence> {
        self.presence.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionProvider for FakeSession {
    async fn send_message(&self, conversation: &ConversationId, text: &str) -> Result<()> {
        if self.fail_send {
            return Err(anyhow!("send rejected"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((conversation.clone(), text.to_owned()));
        Ok(())
    }

    async fn send_presence(&self, _conversation: &ConversationId, presence: Presence) -> Result<()> {
        self.presence.lock().unwrap().push(presence);
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        _conversation: &ConversationId,
        count: usize,
    ) -> Result<Vec<HistoryEntry>> {
        self.requested_counts.lock().unwrap().push(count);
        if self.fail_history {
            return Err(anyhow!("history unavailable"));
        }
        Ok(self.history.clone())
    }
}

/// Completer returning a canned reply and remembering every transcript.
#[derive(Debug)]
pub struct FakeCompleter {
    pub reply: String,
    pub calls: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl FakeCompleter {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_owned(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Completer for FakeCompleter {
    async fn complete(&self, transcript: &[ConversationTurn]) -> String {
        self.calls.lock().unwrap().push(transcript.to_vec());
        self.reply.clone()
    }
}
