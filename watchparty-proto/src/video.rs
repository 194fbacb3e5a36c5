//! Shared playback state for a room.

use serde::{Deserialize, Serialize};

/// The reconciled playback state of a room's shared video.
///
/// The authoritative copy lives server-side; clients hold a mirror that
/// is only mutated by inbound state events. Invariants: `current_time`
/// is non-negative, `playback_rate` is positive and `volume` lies in
/// `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    /// Playhead position in seconds.
    #[serde(default)]
    pub current_time: f64,
    /// Whether playback is running.
    #[serde(default)]
    pub is_playing: bool,
    /// Playback speed multiplier.
    #[serde(default = "default_rate")]
    pub playback_rate: f64,
    /// Volume in `[0, 1]`.
    #[serde(default = "default_volume")]
    pub volume: f64,
}

impl Default for VideoState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            is_playing: false,
            playback_rate: 1.0,
            volume: 1.0,
        }
    }
}

const fn default_rate() -> f64 {
    1.0
}

const fn default_volume() -> f64 {
    1.0
}
