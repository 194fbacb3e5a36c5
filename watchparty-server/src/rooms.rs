//! Room registry and per-room state.
//!
//! Rooms are created on first join and hold the authoritative view the
//! clients mirror: roster, bounded chat history, and playback state.
//! Every mutation broadcasts the corresponding event to all connected
//! participants; playback mutations are gated on the sender's control
//! permission, with a per-sender `error` event on rejection.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

use watchparty_proto::client::ClientEvent;
use watchparty_proto::envelope;
use watchparty_proto::message::HistoryMessage;
use watchparty_proto::server::{
    ChatBroadcastPayload, ErrorPayload, PermissionChangedPayload, RoomInitPayload, ServerEvent,
    UserJoinedPayload, UserLeftPayload, UserStatusPayload, VideoChangedPayload, VideoStatePayload,
};
use watchparty_proto::user::{Participant, Role, UserRef, VideoSource};
use watchparty_proto::video::VideoState;

/// Default bound on per-room chat history.
pub const DEFAULT_HISTORY_CAP: usize = 100;

/// Directory of live rooms, keyed by room code.
pub struct RoomRegistry {
    rooms: RwLock<HashMap<String, Arc<Room>>>,
    history_cap: usize,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry with the default history bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_HISTORY_CAP)
    }

    /// Creates an empty registry retaining at most `history_cap` chat
    /// messages per room.
    #[must_use]
    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            history_cap: history_cap.max(1),
        }
    }

    /// Returns the room for `code`, creating it on first join.
    pub async fn get_or_create(&self, code: &str) -> Arc<Room> {
        let mut rooms = self.rooms.write().await;
        Arc::clone(rooms.entry(code.to_string()).or_insert_with(|| {
            tracing::info!(room = %code, "creating room");
            Arc::new(Room::new(code, self.history_cap))
        }))
    }

    /// Returns the room for `code`, if it exists.
    pub async fn get(&self, code: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Drops the room when its last participant has left.
    pub async fn remove_if_empty(&self, code: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(room) = rooms.get(code)
            && room.is_empty().await
        {
            rooms.remove(code);
            tracing::info!(room = %code, "removed empty room");
        }
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

struct Member {
    participant: Participant,
    sender: mpsc::UnboundedSender<Message>,
}

struct RoomInner {
    members: Vec<Member>,
    history: VecDeque<HistoryMessage>,
    video: VideoState,
}

/// One live room: roster, history, authoritative playback state.
pub struct Room {
    code: String,
    history_cap: usize,
    inner: RwLock<RoomInner>,
}

impl Room {
    fn new(code: &str, history_cap: usize) -> Self {
        Self {
            code: code.to_string(),
            history_cap,
            inner: RwLock::new(RoomInner {
                members: Vec::new(),
                history: VecDeque::new(),
                video: VideoState::default(),
            }),
        }
    }

    /// Room code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Whether the room has no participants.
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.members.is_empty()
    }

    /// Number of participants.
    pub async fn member_count(&self) -> usize {
        self.inner.read().await.members.len()
    }

    /// Adds a participant and returns their server-assigned identity.
    ///
    /// The first joiner becomes host with control permission. The new
    /// participant receives `room:init`; everyone is told `user:joined`.
    pub async fn join(&self, username: &str, sender: mpsc::UnboundedSender<Message>) -> Participant {
        let mut inner = self.inner.write().await;
        let is_first = inner.members.is_empty();
        let participant = Participant {
            id: uuid::Uuid::now_v7().to_string(),
            username: username.to_string(),
            avatar_url: None,
            is_online: true,
            role: if is_first { Role::Host } else { Role::Member },
            has_control_permission: is_first,
        };
        tracing::info!(
            room = %self.code,
            user = %participant.username,
            id = %participant.id,
            host = is_first,
            "participant joined"
        );

        let init = ServerEvent::RoomInit(RoomInitPayload {
            participants: inner
                .members
                .iter()
                .map(|m| m.participant.clone())
                .chain(std::iter::once(participant.clone()))
                .collect(),
            recent_messages: inner.history.iter().cloned().collect(),
            video_state: Some(inner.video.clone()),
        });
        send_event(&sender, init);

        inner.members.push(Member {
            participant: participant.clone(),
            sender,
        });
        let joined = ServerEvent::UserJoined(UserJoinedPayload {
            user: participant.clone(),
            user_count: inner.members.len(),
        });
        broadcast(&inner.members, &joined);
        participant
    }

    /// Removes a participant, broadcasting `user:left` to the rest.
    pub async fn leave(&self, participant_id: &str) {
        let mut inner = self.inner.write().await;
        let Some(position) = inner
            .members
            .iter()
            .position(|m| m.participant.id == participant_id)
        else {
            return;
        };
        let member = inner.members.remove(position);
        tracing::info!(
            room = %self.code,
            user = %member.participant.username,
            "participant left"
        );
        let left = ServerEvent::UserLeft(UserLeftPayload {
            user_id: member.participant.id,
            username: member.participant.username,
            user_count: inner.members.len(),
        });
        broadcast(&inner.members, &left);
    }

    /// Marks a participant online or offline, broadcasting `user:status`.
    ///
    /// Presence hook for the embedding application (e.g. tab
    /// visibility); the socket lifecycle itself uses join and leave.
    /// Unknown ids are a no-op.
    pub async fn set_online(&self, participant_id: &str, is_online: bool) {
        let mut inner = self.inner.write().await;
        let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.participant.id == participant_id)
        else {
            return;
        };
        member.participant.is_online = is_online;
        let status = ServerEvent::UserStatus(UserStatusPayload {
            user_id: participant_id.to_string(),
            is_online,
        });
        broadcast(&inner.members, &status);
    }

    /// Appends a chat message to history and broadcasts it with a
    /// server-assigned id and timestamp.
    pub async fn chat(&self, participant_id: &str, content: &str) {
        let mut inner = self.inner.write().await;
        let Some(user) = inner
            .members
            .iter()
            .find(|m| m.participant.id == participant_id)
            .map(|m| user_ref(&m.participant))
        else {
            return;
        };

        let id = uuid::Uuid::now_v7().to_string();
        let timestamp = envelope::now_millis();
        inner.history.push_back(HistoryMessage {
            id: id.clone(),
            user: user.clone(),
            content: content.to_string(),
            timestamp,
        });
        while inner.history.len() > self.history_cap {
            inner.history.pop_front();
        }

        let broadcast_event = ServerEvent::ChatMessage(ChatBroadcastPayload {
            id: Some(id),
            user,
            message: content.to_string(),
            timestamp,
        });
        broadcast(&inner.members, &broadcast_event);
    }

    /// Applies a playback control from a participant.
    ///
    /// Without control permission the sender gets an `error` event and
    /// the room state is untouched. Otherwise the authoritative state
    /// updates and `video:state` fans out with the actor's id.
    pub async fn video_control(&self, participant_id: &str, event: &ClientEvent) {
        let mut inner = self.inner.write().await;
        if !self.check_permission(&inner, participant_id) {
            return;
        }

        match *event {
            ClientEvent::Play => inner.video.is_playing = true,
            ClientEvent::Pause => inner.video.is_playing = false,
            ClientEvent::Seek { current_time } => inner.video.current_time = current_time,
            ClientEvent::Sync {
                current_time,
                is_playing,
                playback_rate,
            } => {
                inner.video.current_time = current_time;
                inner.video.is_playing = is_playing;
                inner.video.playback_rate = playback_rate;
            }
            ClientEvent::Chat { .. } | ClientEvent::ChangeVideo { .. } => return,
        }

        let state = ServerEvent::VideoState(VideoStatePayload {
            state: inner.video.clone(),
            triggered_by: participant_id.to_string(),
        });
        broadcast(&inner.members, &state);
    }

    /// Switches the room's video, resetting playback state.
    pub async fn change_video(&self, participant_id: &str, video_id: &str) {
        let mut inner = self.inner.write().await;
        if !self.check_permission(&inner, participant_id) {
            return;
        }

        inner.video = VideoState::default();
        tracing::info!(room = %self.code, video = video_id, "video changed");
        let changed = ServerEvent::VideoChanged(VideoChangedPayload {
            video: VideoSource {
                id: video_id.to_string(),
                url: None,
                title: None,
            },
            changed_by: participant_id.to_string(),
        });
        broadcast(&inner.members, &changed);
    }

    /// Grants or revokes a participant's control permission,
    /// broadcasting `permission:changed`.
    pub async fn set_permission(&self, participant_id: &str, allowed: bool) {
        let mut inner = self.inner.write().await;
        let Some(member) = inner
            .members
            .iter_mut()
            .find(|m| m.participant.id == participant_id)
        else {
            return;
        };
        member.participant.has_control_permission = allowed;
        let changed = ServerEvent::PermissionChanged(PermissionChangedPayload {
            user_id: participant_id.to_string(),
            has_control_permission: allowed,
        });
        broadcast(&inner.members, &changed);
    }

    /// Permission gate for playback mutations. Rejections go to the
    /// sender only.
    fn check_permission(&self, inner: &RoomInner, participant_id: &str) -> bool {
        let Some(member) = inner
            .members
            .iter()
            .find(|m| m.participant.id == participant_id)
        else {
            return false;
        };
        if member.participant.has_control_permission {
            return true;
        }
        tracing::debug!(
            room = %self.code,
            user = %member.participant.username,
            "rejected playback control without permission"
        );
        send_event(
            &member.sender,
            ServerEvent::Error(ErrorPayload {
                code: "NO_CONTROL_PERMISSION".to_string(),
                message: "you do not have permission to control playback".to_string(),
            }),
        );
        false
    }
}

fn user_ref(participant: &Participant) -> UserRef {
    UserRef {
        id: participant.id.clone(),
        username: participant.username.clone(),
        role: participant.role,
        avatar_url: participant.avatar_url.clone(),
    }
}

/// Encodes an event and sends it to every member. Send failures are
/// ignored here; the member's connection task notices and leaves.
fn broadcast(members: &[Member], event: &ServerEvent) {
    match event.clone().into_envelope().and_then(|e| envelope::encode(&e)) {
        Ok(text) => {
            for member in members {
                let _ = member.sender.send(Message::Text(text.clone().into()));
            }
        }
        Err(e) => tracing::error!(err = %e, "failed to encode broadcast"),
    }
}

/// Encodes an event and sends it to a single member.
fn send_event(sender: &mpsc::UnboundedSender<Message>, event: ServerEvent) {
    match event.into_envelope().and_then(|e| envelope::encode(&e)) {
        Ok(text) => {
            let _ = sender.send(Message::Text(text.into()));
        }
        Err(e) => tracing::error!(err = %e, "failed to encode event"),
    }
}
