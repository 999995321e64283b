use tracing::debug;

use crate::{
    error::PipelineError,
    message::{ConversationId, HistoryEntry},
    session::SessionProvider,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when the transcript is flattened into a prompt.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Turns a conversation's recent history into a role-tagged transcript.
#[derive(Debug, Clone)]
pub struct ContextBuilder {
    window: usize,
}

impl ContextBuilder {
    #[must_use]
    pub const fn new(window: usize) -> Self {
        Self { window }
    }

    /// Fetches recent history and appends `latest_text` as the final user turn.
    ///
    /// The provider may already return the triggering message (`latest_id`);
    /// it is dropped from the history so it appears exactly once.
    pub async fn build_context(
        &self,
        session: &dyn SessionProvider,
        conversation: &ConversationId,
        latest_id: &str,
        latest_text: &str,
    ) -> Result<Vec<ConversationTurn>, PipelineError> {
        let history = session
            .fetch_recent_messages(conversation, self.window)
            .await
            .map_err(|error| PipelineError::History {
                conversation: conversation.clone(),
                error,
            })?;

        let mut turns = transcript_from_history(history, latest_id, self.window);
        debug!(conversation = %conversation, turns = turns.len(), "Built context from history");
        turns.push(ConversationTurn::user(latest_text));
        Ok(turns)
    }
}

fn transcript_from_history(
    mut history: Vec<HistoryEntry>,
    latest_id: &str,
    window: usize,
) -> Vec<ConversationTurn> {
    history.retain(|entry| entry.id != latest_id);
    if history.iter().all(|entry| entry.timestamp.is_some()) {
        history.sort_by_key(|entry| entry.timestamp);
    }

    let mut turns: Vec<ConversationTurn> = history
        .into_iter()
        .filter_map(|entry| {
            let text = entry.content.text()?.trim();
            if text.is_empty() {
                return None;
            }
            Some(if entry.from_me {
                ConversationTurn::assistant(text)
            } else {
                ConversationTurn::user(text)
            })
        })
        .collect();

    let excess = turns.len().saturating_sub(window);
    turns.drain(..excess);
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        message::MessageContent,
        testing::{FakeSession, history},
    };

    #[tokio::test]
    async fn history_is_role_tagged_and_latest_appended() {
        let session = FakeSession::with_history(vec![history(false, "hi"), history(true, "yo")]);
        let builder = ContextBuilder::new(5);

        let turns = builder
            .build_context(&session, &ConversationId::from("!dm:example.org"), "$event", "hello")
            .await
            .unwrap();

        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("yo"),
                ConversationTurn::user("hello"),
            ]
        );
        assert_eq!(*session.requested_counts.lock().unwrap(), vec![5]);
    }

    #[tokio::test]
    async fn entries_without_text_are_dropped() {
        let mut image = history(false, "unused");
        image.content = MessageContent::Empty;
        let mut blank = history(true, "unused");
        blank.content = MessageContent::Text("  ".to_owned());
        let mut captioned = history(false, "unused");
        captioned.content = MessageContent::Caption("my cat".to_owned());

        let session = FakeSession::with_history(vec![image, blank, captioned]);
        let turns = ContextBuilder::new(5)
            .build_context(&session, &ConversationId::from("!dm:example.org"), "$event", "cute")
            .await
            .unwrap();

        assert_eq!(
            turns,
            vec![ConversationTurn::user("my cat"), ConversationTurn::user("cute")]
        );
    }

    #[tokio::test]
    async fn history_failure_is_propagated() {
        let session = FakeSession {
            fail_history: true,
            ..FakeSession::default()
        };
        let err = ContextBuilder::new(5)
            .build_context(&session, &ConversationId::from("!dm:example.org"), "$event", "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::History { .. }));
    }

    #[test]
    fn timestamps_reorder_history_oldest_first() {
        let mut newer = history(true, "second");
        newer.timestamp = Some(2_000);
        let mut older = history(false, "first");
        older.timestamp = Some(1_000);

        let turns = transcript_from_history(vec![newer, older], "$event", 5);
        assert_eq!(
            turns,
            vec![ConversationTurn::user("first"), ConversationTurn::assistant("second")]
        );
    }

    #[test]
    fn window_keeps_most_recent_entries() {
        let entries = (0..8).map(|i| history(false, &format!("m{i}"))).collect();
        let turns = transcript_from_history(entries, "$event", 3);
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["m5", "m6", "m7"]);
    }

    #[test]
    fn provider_order_kept_when_a_timestamp_is_missing() {
        let mut late = history(false, "late");
        late.timestamp = Some(9_000);
        let mut early = history(true, "early");
        early.timestamp = Some(1_000);
        let undated = history(false, "undated");

        let turns = transcript_from_history(vec![late, undated, early], "$event", 5);
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["late", "undated", "early"]);
    }

    #[tokio::test]
    async fn triggering_message_in_history_is_not_repeated() {
        let mut trigger = history(false, "hello");
        trigger.id = "$trigger".to_owned();
        let session = FakeSession::with_history(vec![history(false, "hi"), history(true, "yo"), trigger]);

        let turns = ContextBuilder::new(5)
            .build_context(&session, &ConversationId::from("!dm:example.org"), "$trigger", "hello")
            .await
            .unwrap();

        assert_eq!(
            turns,
            vec![
                ConversationTurn::user("hi"),
                ConversationTurn::assistant("yo"),
                ConversationTurn::user("hello"),
            ]
        );
    }

    #[test]
    fn same_text_with_other_id_is_kept() {
        let turns = transcript_from_history(vec![history(false, "hello")], "$trigger", 5);
        assert_eq!(turns, vec![ConversationTurn::user("hello")]);
    }
}
