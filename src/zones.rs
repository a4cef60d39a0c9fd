//! Zone and playback domain types.
//!
//! These types mirror the media core's zone model: a zone is an
//! independently controllable playback output with its own state and
//! now-playing metadata. They double as the wire shapes for the zone
//! subscription stream.

use serde::{Deserialize, Serialize};

/// Playback state of a zone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Paused,
    Loading,
    Playing,
}

impl std::fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Paused => write!(f, "paused"),
            Self::Loading => write!(f, "loading"),
            Self::Playing => write!(f, "playing"),
        }
    }
}

/// Two-line track description as the core renders it (title / artist).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TwoLine {
    #[serde(default)]
    pub line1: String,
    #[serde(default)]
    pub line2: String,
}

/// Now playing information for a zone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NowPlaying {
    pub two_line: TwoLine,

    /// Total track length in seconds
    #[serde(default)]
    pub length: u64,

    /// Current seek position in seconds
    #[serde(default)]
    pub seek_position: u64,
}

/// Snapshot of a single playback zone as pushed by the media core.
///
/// Ephemeral: zones only exist as the latest snapshot in the tracker's
/// zone set, nothing is persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackZone {
    pub zone_id: String,
    pub display_name: String,
    pub state: PlaybackState,
    #[serde(default)]
    pub now_playing: Option<NowPlaying>,
}

/// Events delivered over the media core's zone subscription.
///
/// `Subscribed` carries the full snapshot once after subscribing,
/// `Changed` carries incremental deltas. `Paired`/`Unpaired` bracket the
/// session; `Unpaired` is also synthesized locally when the connection
/// drops.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum CoreEvent {
    Paired {
        core_name: String,
    },
    Unpaired,
    Subscribed {
        zones: Vec<PlaybackZone>,
    },
    Changed {
        #[serde(default)]
        zones_added: Vec<PlaybackZone>,
        #[serde(default)]
        zones_changed: Vec<PlaybackZone>,
        #[serde(default)]
        zones_removed: Vec<String>,
    },
}

/// Resolved status of the active zone, emitted once per processed core
/// event when a zone can be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ZoneStatus {
    /// The active zone with its current snapshot
    Zone(PlaybackZone),
    /// The active zone went away; treat as a definitive stop
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_state_display() {
        assert_eq!(PlaybackState::Playing.to_string(), "playing");
        assert_eq!(PlaybackState::Loading.to_string(), "loading");
    }

    #[test]
    fn test_zone_deserialization() {
        let json = r#"{
            "zone_id": "z1",
            "display_name": "Living Room",
            "state": "playing",
            "now_playing": {
                "two_line": { "line1": "Song", "line2": "Artist" },
                "length": 180,
                "seek_position": 30
            }
        }"#;

        let zone: PlaybackZone = serde_json::from_str(json).unwrap();
        assert_eq!(zone.zone_id, "z1");
        assert_eq!(zone.state, PlaybackState::Playing);
        let np = zone.now_playing.unwrap();
        assert_eq!(np.two_line.line1, "Song");
        assert_eq!(np.length, 180);
        assert_eq!(np.seek_position, 30);
    }

    #[test]
    fn test_zone_without_now_playing() {
        let json = r#"{"zone_id": "z2", "display_name": "Kitchen", "state": "stopped"}"#;
        let zone: PlaybackZone = serde_json::from_str(json).unwrap();
        assert_eq!(zone.state, PlaybackState::Stopped);
        assert!(zone.now_playing.is_none());
    }

    #[test]
    fn test_changed_event_defaults_missing_fields() {
        let json = r#"{"event": "Changed", "zones_removed": ["z1"]}"#;
        let event: CoreEvent = serde_json::from_str(json).unwrap();
        match event {
            CoreEvent::Changed {
                zones_added,
                zones_changed,
                zones_removed,
            } => {
                assert!(zones_added.is_empty());
                assert!(zones_changed.is_empty());
                assert_eq!(zones_removed, vec!["z1".to_string()]);
            }
            other => panic!("Expected Changed event, got {:?}", other),
        }
    }

    #[test]
    fn test_paired_event_deserialization() {
        let json = r#"{"event": "Paired", "core_name": "Study Core"}"#;
        let event: CoreEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            CoreEvent::Paired {
                core_name: "Study Core".to_string()
            }
        );
    }
}
