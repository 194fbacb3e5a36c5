//! Server-to-client events.
//!
//! The server pushes these over the room connection; clients reconcile
//! them into local room state in arrival order. Unknown type strings and
//! malformed payloads surface as [`ProtocolError`] and must be logged
//! and dropped by the receiver — they are never fatal to the connection.

use serde::{Deserialize, Serialize};

use crate::envelope::{CodecError, Envelope};
use crate::message::HistoryMessage;
use crate::user::{Participant, UserRef, VideoSource};
use crate::video::VideoState;

/// Error raised while interpreting a decoded envelope.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The `type` string is outside the agreed event set.
    #[error("unknown event type: {0}")]
    UnknownType(String),

    /// The payload does not match the shape declared by the type.
    #[error("invalid payload for {event_type}: {detail}")]
    Payload {
        /// The event type whose payload failed to parse.
        event_type: String,
        /// Parser error detail.
        detail: String,
    },
}

/// Payload of `room:init` — the authoritative snapshot sent on join.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInitPayload {
    /// Full roster replacing any local copy.
    #[serde(default)]
    pub participants: Vec<Participant>,
    /// Recent chat history, oldest first.
    #[serde(default)]
    pub recent_messages: Vec<HistoryMessage>,
    /// Current playback state, when a video is bound.
    #[serde(default)]
    pub video_state: Option<VideoState>,
}

/// Payload of `user:joined`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserJoinedPayload {
    /// The joining participant.
    pub user: Participant,
    /// Roster size after the join.
    #[serde(default)]
    pub user_count: usize,
}

/// Payload of `user:left`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLeftPayload {
    /// Id of the departed participant.
    pub user_id: String,
    /// Display name of the departed participant.
    pub username: String,
    /// Roster size after the departure.
    #[serde(default)]
    pub user_count: usize,
}

/// Payload of `user:status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusPayload {
    /// Id of the affected participant.
    pub user_id: String,
    /// New online flag.
    pub is_online: bool,
}

/// Payload of the server-broadcast `chat:message`.
///
/// Note the distinct shape from the client-sent event of the same name:
/// the broadcast nests the sender and carries a server timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatBroadcastPayload {
    /// Server-assigned message id, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Sender reference.
    pub user: UserRef,
    /// Message body.
    pub message: String,
    /// Server receive time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
}

/// Payload of `video:state` — a wholesale authoritative snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatePayload {
    /// The full replacement playback state.
    #[serde(flatten)]
    pub state: VideoState,
    /// Id of the participant whose intent produced this snapshot.
    #[serde(default)]
    pub triggered_by: String,
}

/// Payload of `video:changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoChangedPayload {
    /// The newly bound video.
    pub video: VideoSource,
    /// Id of the participant who switched the video.
    #[serde(default)]
    pub changed_by: String,
}

/// Payload of `permission:changed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionChangedPayload {
    /// Id of the affected participant.
    pub user_id: String,
    /// New control-permission flag.
    pub has_control_permission: bool,
}

/// Payload of `error` — an application error that leaves the connection open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

/// Events pushed from the synchronization server to room clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Authoritative room snapshot (`room:init`).
    RoomInit(RoomInitPayload),
    /// A participant joined (`user:joined`).
    UserJoined(UserJoinedPayload),
    /// A participant left (`user:left`).
    UserLeft(UserLeftPayload),
    /// A participant's online flag changed (`user:status`).
    UserStatus(UserStatusPayload),
    /// A chat message was broadcast (`chat:message`).
    ChatMessage(ChatBroadcastPayload),
    /// Authoritative playback snapshot (`video:state`).
    VideoState(VideoStatePayload),
    /// The room switched to a different video (`video:changed`).
    VideoChanged(VideoChangedPayload),
    /// A participant's control permission changed (`permission:changed`).
    PermissionChanged(PermissionChangedPayload),
    /// Server-pushed application error (`error`).
    Error(ErrorPayload),
}

impl ServerEvent {
    /// The wire `type` string for this event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::RoomInit(_) => "room:init",
            Self::UserJoined(_) => "user:joined",
            Self::UserLeft(_) => "user:left",
            Self::UserStatus(_) => "user:status",
            Self::ChatMessage(_) => "chat:message",
            Self::VideoState(_) => "video:state",
            Self::VideoChanged(_) => "video:changed",
            Self::PermissionChanged(_) => "permission:changed",
            Self::Error(_) => "error",
        }
    }

    /// Parses a typed server event out of a decoded envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownType`] for type strings outside
    /// the server event set, or [`ProtocolError::Payload`] when the
    /// payload does not match the declared type.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, ProtocolError> {
        fn parse<T: serde::de::DeserializeOwned>(
            envelope: &Envelope,
        ) -> Result<T, ProtocolError> {
            serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                ProtocolError::Payload {
                    event_type: envelope.event_type.clone(),
                    detail: e.to_string(),
                }
            })
        }

        match envelope.event_type.as_str() {
            "room:init" => Ok(Self::RoomInit(parse(envelope)?)),
            "user:joined" => Ok(Self::UserJoined(parse(envelope)?)),
            "user:left" => Ok(Self::UserLeft(parse(envelope)?)),
            "user:status" => Ok(Self::UserStatus(parse(envelope)?)),
            "chat:message" => Ok(Self::ChatMessage(parse(envelope)?)),
            "video:state" => Ok(Self::VideoState(parse(envelope)?)),
            "video:changed" => Ok(Self::VideoChanged(parse(envelope)?)),
            "permission:changed" => Ok(Self::PermissionChanged(parse(envelope)?)),
            "error" => Ok(Self::Error(parse(envelope)?)),
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }

    /// Wraps this event into an [`Envelope`] stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Serialization`] if the payload cannot be
    /// serialized.
    pub fn into_envelope(self) -> Result<Envelope, CodecError> {
        let event_type = self.event_type();
        let payload = match self {
            Self::RoomInit(p) => serde_json::to_value(p),
            Self::UserJoined(p) => serde_json::to_value(p),
            Self::UserLeft(p) => serde_json::to_value(p),
            Self::UserStatus(p) => serde_json::to_value(p),
            Self::ChatMessage(p) => serde_json::to_value(p),
            Self::VideoState(p) => serde_json::to_value(p),
            Self::VideoChanged(p) => serde_json::to_value(p),
            Self::PermissionChanged(p) => serde_json::to_value(p),
            Self::Error(p) => serde_json::to_value(p),
        }
        .map_err(|e| CodecError::Serialization(e.to_string()))?;
        Ok(Envelope::new(event_type, payload))
    }
}
