use core::fmt;

/// Opaque key of a conversation on the chat network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationKind {
    Direct,
    Group,
}

/// Text carried by a message, resolved once when the event is ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Caption(String),
    Empty,
}

impl MessageContent {
    /// Text or caption, `None` when there is nothing readable.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Text(text) | Self::Caption(text) => Some(text.as_str()),
            Self::Empty => None,
        }
    }
}

/// A normalized inbound event. Produced by the session adapter, read-only to the core.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: String,
    pub conversation: ConversationId,
    pub kind: ConversationKind,
    pub sender: String,
    pub from_me: bool,
    pub content: MessageContent,
    /// Milliseconds since the unix epoch, when the network reports one.
    pub timestamp: Option<u64>,
}

impl InboundMessage {
    /// Readable text with surrounding whitespace removed; `None` if blank.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content
            .text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }
}

/// One entry of a conversation's recent history.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub id: String,
    pub from_me: bool,
    pub content: MessageContent,
    pub timestamp: Option<u64>,
}
