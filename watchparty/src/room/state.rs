//! Room state reconciliation.
//!
//! [`RoomState`] is a pure reducer over inbound [`ServerEvent`]s: roster,
//! bounded chat history, and the mirrored playback state. Events apply
//! strictly in arrival order; the server's `room:init` snapshot replaces
//! local state wholesale on (re)join.

use std::collections::VecDeque;

use watchparty_proto::message::ChatMessage;
use watchparty_proto::server::ServerEvent;
use watchparty_proto::user::Participant;
use watchparty_proto::video::VideoState;

/// Default bound on retained chat messages.
pub const DEFAULT_MESSAGE_CAP: usize = 100;

/// Reconciled client-side room state.
///
/// Loss of connection does not clear this state — it stays visible as
/// stale data until the next `room:init` resynchronizes it.
#[derive(Debug, Clone)]
pub struct RoomState {
    participants: Vec<Participant>,
    messages: VecDeque<ChatMessage>,
    video: Option<VideoState>,
    message_cap: usize,
}

impl Default for RoomState {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_CAP)
    }
}

impl RoomState {
    /// Creates an empty room state retaining at most `message_cap`
    /// chat messages.
    #[must_use]
    pub fn new(message_cap: usize) -> Self {
        Self {
            participants: Vec::new(),
            messages: VecDeque::new(),
            video: None,
            message_cap: message_cap.max(1),
        }
    }

    /// Current roster, in insertion order.
    #[must_use]
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Retained chat messages, oldest first.
    #[must_use]
    pub const fn messages(&self) -> &VecDeque<ChatMessage> {
        &self.messages
    }

    /// Mirrored playback state, when a video is bound.
    #[must_use]
    pub const fn video(&self) -> Option<&VideoState> {
        self.video.as_ref()
    }

    /// Looks up a participant by id.
    #[must_use]
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    /// Whether the participant with `id` may control shared playback.
    /// Unknown ids have no permission.
    #[must_use]
    pub fn has_control_permission(&self, id: &str) -> bool {
        self.participant(id)
            .is_some_and(|p| p.has_control_permission)
    }

    /// Applies one inbound server event.
    ///
    /// The `error` event carries no state; it is surfaced separately by
    /// the session layer and is a no-op here.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::RoomInit(init) => {
                self.participants = init.participants.clone();
                self.messages = init
                    .recent_messages
                    .iter()
                    .cloned()
                    .map(ChatMessage::from)
                    .collect();
                while self.messages.len() > self.message_cap {
                    self.messages.pop_front();
                }
                // Wholesale replacement: a snapshot without a bound
                // video clears any stale playback mirror.
                self.video = init.video_state.clone();
            }
            ServerEvent::UserJoined(joined) => {
                // Duplicate join for a known id is a no-op.
                if self.participant(&joined.user.id).is_none() {
                    self.participants.push(joined.user.clone());
                }
            }
            ServerEvent::UserLeft(left) => {
                self.participants.retain(|p| p.id != left.user_id);
            }
            ServerEvent::UserStatus(status) => {
                if let Some(p) = self
                    .participants
                    .iter_mut()
                    .find(|p| p.id == status.user_id)
                {
                    p.is_online = status.is_online;
                }
            }
            ServerEvent::ChatMessage(broadcast) => {
                let message = ChatMessage {
                    id: broadcast
                        .id
                        .clone()
                        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
                    user_id: broadcast.user.id.clone(),
                    username: broadcast.user.username.clone(),
                    content: broadcast.message.clone(),
                    timestamp_ms: broadcast.timestamp,
                    is_host: broadcast.user.is_host(),
                };
                self.messages.push_back(message);
                while self.messages.len() > self.message_cap {
                    self.messages.pop_front();
                }
            }
            ServerEvent::VideoState(snapshot) => {
                self.video = Some(snapshot.state.clone());
            }
            ServerEvent::VideoChanged(_) => {
                self.video = Some(VideoState::default());
            }
            ServerEvent::PermissionChanged(change) => {
                if let Some(p) = self
                    .participants
                    .iter_mut()
                    .find(|p| p.id == change.user_id)
                {
                    p.has_control_permission = change.has_control_permission;
                }
            }
            ServerEvent::Error(_) => {}
        }
    }
}
