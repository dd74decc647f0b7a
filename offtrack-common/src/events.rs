//! Event types for the Offtrack event stream
//!
//! Events are broadcast inside the player process and forwarded to the UI
//! over Server-Sent Events. In a server deployment the media element lives in
//! the browser, so commands aimed at it travel the same way as
//! [`PlayerEvent::Transport`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Playback session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
}

/// What happens when a track reaches its natural end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EndPolicy {
    /// Advance to the next track, wrapping from the last to the first
    #[default]
    LoopAll,
    /// Replay the same track
    LoopOne,
    /// Stop after the track
    Single,
}

impl EndPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndPolicy::LoopAll => "loop-all",
            EndPolicy::LoopOne => "loop-one",
            EndPolicy::Single => "single",
        }
    }
}

impl fmt::Display for EndPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EndPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loop-all" => Ok(EndPolicy::LoopAll),
            "loop-one" => Ok(EndPolicy::LoopOne),
            "single" => Ok(EndPolicy::Single),
            other => Err(format!("unknown end policy: {}", other)),
        }
    }
}

/// Instruction for the media element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum TransportCommand {
    /// Point the element at a new source
    Load { source: String },
    /// Detach the current source
    Clear,
    Play,
    Pause,
    Seek { position: f64 },
    SetRate { rate: f64 },
    SetPreservePitch { preserve_pitch: bool },
}

/// Player event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PlayerEvent {
    /// Session state or current track changed
    PlaybackStateChanged {
        state: PlaybackState,
        index: Option<usize>,
        track_id: Option<i64>,
        timestamp: DateTime<Utc>,
    },

    /// Command for the remote media element
    ///
    /// `generation` identifies the load the command belongs to; reports sent
    /// back for an older generation are ignored.
    Transport {
        generation: u64,
        command: TransportCommand,
        timestamp: DateTime<Utc>,
    },

    /// A load could not start playing
    PlaybackFault {
        track_id: i64,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Tracks were added, removed, reordered, or edited
    LibraryChanged { timestamp: DateTime<Utc> },

    /// A playlist or its membership changed
    PlaylistsChanged {
        playlist_id: Option<i64>,
        timestamp: DateTime<Utc>,
    },

    /// The active view switched between the library and a playlist
    ViewChanged {
        playlist_id: Option<i64>,
        timestamp: DateTime<Utc>,
    },

    EndPolicyChanged {
        policy: EndPolicy,
        timestamp: DateTime<Utc>,
    },
}

impl PlayerEvent {
    /// Event name used for the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            PlayerEvent::PlaybackStateChanged { .. } => "PlaybackStateChanged",
            PlayerEvent::Transport { .. } => "Transport",
            PlayerEvent::PlaybackFault { .. } => "PlaybackFault",
            PlayerEvent::LibraryChanged { .. } => "LibraryChanged",
            PlayerEvent::PlaylistsChanged { .. } => "PlaylistsChanged",
            PlayerEvent::ViewChanged { .. } => "ViewChanged",
            PlayerEvent::EndPolicyChanged { .. } => "EndPolicyChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_policy_parses_its_own_names() {
        for policy in [EndPolicy::LoopAll, EndPolicy::LoopOne, EndPolicy::Single] {
            assert_eq!(policy.as_str().parse::<EndPolicy>().unwrap(), policy);
        }
        assert!("shuffle".parse::<EndPolicy>().is_err());
        assert_eq!(EndPolicy::default(), EndPolicy::LoopAll);
    }

    #[test]
    fn test_end_policy_serializes_kebab_case() {
        let json = serde_json::to_string(&EndPolicy::LoopOne).unwrap();
        assert_eq!(json, "\"loop-one\"");
    }

    #[test]
    fn test_transport_event_is_tagged() {
        let event = PlayerEvent::Transport {
            generation: 3,
            command: TransportCommand::Seek { position: 12.5 },
            timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "Transport");
        assert_eq!(value["generation"], 3);
        assert_eq!(value["command"]["command"], "seek");
        assert_eq!(value["command"]["position"], 12.5);
        assert_eq!(event.event_type(), "Transport");
    }
}
