//! Participant and video-source types shared across room events.

use serde::{Deserialize, Serialize};

/// Role of a participant within a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Room creator; always holds playback control permission.
    Host,
    /// Regular authenticated member.
    #[default]
    Member,
    /// Unauthenticated viewer.
    Guest,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Member => write!(f, "member"),
            Self::Guest => write!(f, "guest"),
        }
    }
}

/// A member of a room's roster.
///
/// Participants are only ever created from server events; the client
/// never fabricates roster entries on its own. `id` is unique within a
/// room's roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Server-assigned unique identifier.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Optional avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Whether the participant currently has a live connection.
    #[serde(default = "default_true")]
    pub is_online: bool,
    /// Role within the room.
    #[serde(default)]
    pub role: Role,
    /// Whether this participant may control shared playback.
    #[serde(default)]
    pub has_control_permission: bool,
}

impl Participant {
    /// Whether this participant is the room host.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// Slim user reference embedded in chat payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRef {
    /// Server-assigned unique identifier.
    pub id: String,
    /// Display name.
    pub username: String,
    /// Role within the room.
    #[serde(default)]
    pub role: Role,
    /// Optional avatar reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl UserRef {
    /// Whether this user is the room host.
    #[must_use]
    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }
}

/// The video currently bound to a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    /// Identifier of the video (server-side catalogue id or swarm hash).
    pub id: String,
    /// Resolvable playback URL, when the source is server-hosted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Human-readable title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

const fn default_true() -> bool {
    true
}
