//! Client-to-server events.
//!
//! These are the only event types a client may place on the wire. Each
//! variant maps to a fixed `type` string and payload shape; the server
//! side parses them back with [`ClientEvent::from_envelope`].

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::envelope::Envelope;
use crate::server::ProtocolError;

/// Events sent from a room client to the synchronization server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Start shared playback (`video:play`).
    Play,
    /// Pause shared playback (`video:pause`).
    Pause,
    /// Seek shared playback to a position (`video:seek`).
    Seek {
        /// Target playhead position in seconds.
        current_time: f64,
    },
    /// Report a full local playback snapshot (`video:sync`).
    Sync {
        /// Playhead position in seconds.
        current_time: f64,
        /// Whether playback is running locally.
        is_playing: bool,
        /// Playback speed multiplier.
        playback_rate: f64,
    },
    /// Send a chat message (`chat:message`).
    Chat {
        /// Message body.
        message: String,
    },
    /// Switch the room to a different video (`video:change`).
    ChangeVideo {
        /// Identifier of the new video source.
        video_id: String,
    },
}

/// Payload for `video:seek`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeekPayload {
    current_time: f64,
}

/// Payload for `video:sync`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncPayload {
    current_time: f64,
    is_playing: bool,
    playback_rate: f64,
}

/// Payload for the client-sent `chat:message` (distinct from the
/// server broadcast of the same name).
#[derive(Debug, Serialize, Deserialize)]
struct ChatSendPayload {
    message: String,
}

/// Payload for `video:change`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeVideoPayload {
    video_id: String,
}

impl ClientEvent {
    /// The wire `type` string for this event.
    #[must_use]
    pub const fn event_type(&self) -> &'static str {
        match self {
            Self::Play => "video:play",
            Self::Pause => "video:pause",
            Self::Seek { .. } => "video:seek",
            Self::Sync { .. } => "video:sync",
            Self::Chat { .. } => "chat:message",
            Self::ChangeVideo { .. } => "video:change",
        }
    }

    /// Whether this event controls shared playback (and is therefore
    /// subject to the control-permission gate).
    #[must_use]
    pub const fn is_playback_control(&self) -> bool {
        matches!(
            self,
            Self::Play | Self::Pause | Self::Seek { .. } | Self::Sync { .. }
        )
    }

    /// Wraps this event into an [`Envelope`] stamped with the current time.
    #[must_use]
    pub fn into_envelope(self) -> Envelope {
        let event_type = self.event_type();
        let payload = match self {
            Self::Play | Self::Pause => json!({}),
            Self::Seek { current_time } => json!({ "currentTime": current_time }),
            Self::Sync {
                current_time,
                is_playing,
                playback_rate,
            } => json!({
                "currentTime": current_time,
                "isPlaying": is_playing,
                "playbackRate": playback_rate,
            }),
            Self::Chat { message } => json!({ "message": message }),
            Self::ChangeVideo { video_id } => json!({ "videoId": video_id }),
        };
        Envelope::new(event_type, payload)
    }

    /// Parses a typed client event out of a decoded envelope.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownType`] for type strings outside
    /// the client event set, or [`ProtocolError::Payload`] when the
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
            "video:play" => Ok(Self::Play),
            "video:pause" => Ok(Self::Pause),
            "video:seek" => {
                let p: SeekPayload = parse(envelope)?;
                Ok(Self::Seek {
                    current_time: p.current_time,
                })
            }
            "video:sync" => {
                let p: SyncPayload = parse(envelope)?;
                Ok(Self::Sync {
                    current_time: p.current_time,
                    is_playing: p.is_playing,
                    playback_rate: p.playback_rate,
                })
            }
            "chat:message" => {
                let p: ChatSendPayload = parse(envelope)?;
                Ok(Self::Chat { message: p.message })
            }
            "video:change" => {
                let p: ChangeVideoPayload = parse(envelope)?;
                Ok(Self::ChangeVideo {
                    video_id: p.video_id,
                })
            }
            other => Err(ProtocolError::UnknownType(other.to_string())),
        }
    }
}
