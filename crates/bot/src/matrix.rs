use core::time::Duration;

use anyhow::{Context as _, Result, anyhow};
use async_trait::async_trait;
use matrix_sdk::{
    Client,
    config::SyncSettings,
    room::{MessagesOptions, Room},
    ruma::{
        MilliSecondsSinceUnixEpoch, RoomId, UserId,
        api::client::error::ErrorKind,
        events::{
            AnySyncMessageLikeEvent, AnySyncTimelineEvent,
            room::{
                member::{MembershipState, StrippedRoomMemberEvent},
                message::{
                    MessageType, OriginalSyncRoomMessageEvent, RoomMessageEventContent,
                    SyncRoomMessageEvent,
                },
            },
        },
        serde::Raw,
    },
};
use responder_core::{
    Connector, ConversationId, ConversationKind, DisconnectReason, HistoryEntry, InboundMessage,
    MessageContent, Presence, SessionProvider,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// [`SessionProvider`] backed by a logged-in matrix-sdk client.
///
/// Conversation ids are room ids (`!room:server`). A user id (`@user:server`)
/// addresses the direct room shared with that user.
#[derive(Debug, Clone)]
pub(crate) struct MatrixSession {
    client: Client,
}

impl MatrixSession {
    pub(crate) const fn new(client: Client) -> Self {
        Self { client }
    }

    fn room(&self, conversation: &ConversationId) -> Result<Room> {
        let id = conversation.as_str();
        if id.starts_with('@') {
            let user_id = UserId::parse(id).with_context(|| format!("invalid user id {id}"))?;
            return self
                .client
                .get_dm_room(&user_id)
                .ok_or_else(|| anyhow!("no direct room with {id}"));
        }
        let room_id = RoomId::parse(id).with_context(|| format!("invalid room id {id}"))?;
        self.client
            .get_room(&room_id)
            .ok_or_else(|| anyhow!("room {id} is not known to this session"))
    }
}

#[async_trait]
impl SessionProvider for MatrixSession {
    async fn send_message(&self, conversation: &ConversationId, text: &str) -> Result<()> {
        let room = self.room(conversation)?;
        room.send(RoomMessageEventContent::text_plain(text))
            .await
            .context("sending message")?;
        Ok(())
    }

    async fn send_presence(&self, conversation: &ConversationId, presence: Presence) -> Result<()> {
        let room = self.room(conversation)?;
        room.typing_notice(presence == Presence::Composing)
            .await
            .context("sending typing notice")?;
        Ok(())
    }

    async fn fetch_recent_messages(
        &self,
        conversation: &ConversationId,
        count: usize,
    ) -> Result<Vec<HistoryEntry>> {
        let room = self.room(conversation)?;
        let own_id = self.client.user_id();

        let mut options = MessagesOptions::backward();
        options.limit = u32::try_from(count).unwrap_or(u32::MAX).into();
        let response = room.messages(options).await.context("fetching room messages")?;

        let entries = history_from_page(response.chunk.into_iter().map(|event| event.into_raw()), own_id);
        debug!(conversation = %conversation, fetched = entries.len(), "Fetched recent messages");
        Ok(entries)
    }
}

/// Turns a backward `/messages` page (newest first) into oldest-first entries.
fn history_from_page(
    page: impl IntoIterator<Item = Raw<AnySyncTimelineEvent>>,
    own_id: Option<&UserId>,
) -> Vec<HistoryEntry> {
    let mut entries: Vec<HistoryEntry> = page
        .into_iter()
        .filter_map(|raw| history_entry(raw, own_id))
        .collect();
    entries.reverse();
    entries
}

fn history_entry(raw: Raw<AnySyncTimelineEvent>, own_id: Option<&UserId>) -> Option<HistoryEntry> {
    let event = raw.deserialize().ok()?;
    let AnySyncTimelineEvent::MessageLike(message_like) = event else {
        return None;
    };
    let AnySyncMessageLikeEvent::RoomMessage(SyncRoomMessageEvent::Original(msg)) = message_like
    else {
        return None;
    };
    Some(HistoryEntry {
        id: msg.event_id.to_string(),
        from_me: own_id == Some(&*msg.sender),
        content: message_content(&msg.content.msgtype),
        timestamp: Some(u64::from(msg.origin_server_ts.get())),
    })
}

fn message_content(msgtype: &MessageType) -> MessageContent {
    match msgtype {
        MessageType::Text(inner) => MessageContent::Text(inner.body.clone()),
        MessageType::Notice(inner) => MessageContent::Text(inner.body.clone()),
        MessageType::Emote(inner) => MessageContent::Text(inner.body.clone()),
        MessageType::Image(inner) => caption(inner.caption()),
        MessageType::File(inner) => caption(inner.caption()),
        MessageType::Audio(inner) => caption(inner.caption()),
        MessageType::Video(inner) => caption(inner.caption()),
        _ => MessageContent::Empty,
    }
}

fn caption(text: Option<&str>) -> MessageContent {
    text.map_or(MessageContent::Empty, |t| MessageContent::Caption(t.to_owned()))
}

async fn conversation_kind(room: &Room) -> ConversationKind {
    let direct = room.is_direct().await.unwrap_or(false);
    kind_for(direct, room.joined_members_count())
}

/// Rooms flagged direct, or with at most two joined members, are one-to-one.
const fn kind_for(is_direct: bool, joined_members: u64) -> ConversationKind {
    if is_direct || joined_members <= 2 {
        ConversationKind::Direct
    } else {
        ConversationKind::Group
    }
}

async fn inbound_message(
    event: &OriginalSyncRoomMessageEvent,
    room: &Room,
    own_id: Option<&UserId>,
) -> InboundMessage {
    InboundMessage {
        id: event.event_id.to_string(),
        conversation: ConversationId::new(room.room_id().as_str()),
        kind: conversation_kind(room).await,
        sender: event.sender.to_string(),
        from_me: own_id == Some(&*event.sender),
        content: message_content(&event.content.msgtype),
        timestamp: Some(u64::from(event.origin_server_ts.get())),
    }
}

/// Forwards room messages into `inbound` and, when `autojoin` is set, accepts
/// invites addressed to the bot.
///
/// Messages older than the moment of registration are dropped so the initial
/// sync does not replay the backlog.
pub(crate) fn register_handlers(client: &Client, inbound: mpsc::Sender<InboundMessage>, autojoin: bool) {
    let since = MilliSecondsSinceUnixEpoch::now();

    client.add_event_handler(move |ev: OriginalSyncRoomMessageEvent, room: Room, client: Client| {
        let inbound = inbound.clone();
        async move {
            if ev.origin_server_ts < since {
                return;
            }
            let message = inbound_message(&ev, &room, client.user_id()).await;
            if inbound.send(message).await.is_err() {
                warn!(room_id = %room.room_id(), "Inbound channel closed; dropping message");
            }
        }
    });

    if autojoin {
        client.add_event_handler(async move |ev: StrippedRoomMemberEvent, room: Room, client: Client| {
            if ev.content.membership != MembershipState::Invite {
                return;
            }
            let Some(own_id) = client.user_id() else {
                return;
            };
            if ev.state_key != own_id.as_str() {
                return;
            }
            info!(room_id = %room.room_id(), inviter = %ev.sender, "Auto-joining invited room");
            if let Err(e) = room.join().await {
                warn!(error = %e, "Failed to accept invite");
            }
        });
    }
}

/// Maps a sync failure onto the reconnect decision.
pub(crate) fn classify_sync_error(err: &matrix_sdk::Error) -> DisconnectReason {
    disconnect_reason(err.client_api_error_kind(), err.to_string())
}

fn disconnect_reason(kind: Option<&ErrorKind>, detail: String) -> DisconnectReason {
    match kind {
        Some(ErrorKind::UnknownToken { soft_logout: true } | ErrorKind::MissingToken) => {
            DisconnectReason::BadSession
        }
        Some(ErrorKind::UnknownToken { .. } | ErrorKind::UserDeactivated) => {
            DisconnectReason::LoggedOut
        }
        Some(_) | None => DisconnectReason::Transport(detail),
    }
}

/// One sync session per [`Connector::run_session`] call.
#[derive(Debug)]
pub(crate) struct MatrixConnector {
    client: Client,
    sync_timeout: Duration,
    owner: ConversationId,
    startup_notice: Option<String>,
}

impl MatrixConnector {
    pub(crate) fn new(
        client: Client,
        sync_timeout: Duration,
        owner: &str,
        startup_notice: Option<String>,
    ) -> Self {
        Self {
            client,
            sync_timeout,
            owner: ConversationId::new(owner),
            startup_notice,
        }
    }

    async fn announce(&self) {
        let Some(notice) = self.startup_notice.as_deref() else {
            return;
        };
        let session = MatrixSession::new(self.client.clone());
        if let Err(e) = session.send_message(&self.owner, notice).await {
            warn!(error = %e, owner = %self.owner, "Failed to notify owner");
        }
    }
}

#[async_trait]
impl Connector for MatrixConnector {
    async fn run_session(&self) -> DisconnectReason {
        let settings = SyncSettings::new().timeout(self.sync_timeout);
        let response = match self.client.sync_once(settings.clone()).await {
            Ok(response) => response,
            Err(e) => return classify_sync_error(&e),
        };
        info!(user = ?self.client.user_id(), "Connected; initial sync complete");
        self.announce().await;

        match self.client.sync(settings.token(response.next_batch)).await {
            Ok(()) => DisconnectReason::Transport("sync loop ended".to_owned()),
            Err(e) => classify_sync_error(&e),
        }
    }
}
