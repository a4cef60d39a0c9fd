//! Mapping from zone status to presence activity payloads.
//!
//! Pure functions, no I/O: given the resolved zone status and the
//! current time, produce either an activity payload or the clear
//! sentinel.

use crate::zones::{PlaybackState, ZoneStatus};

/// Discord caps details/state strings at 128 characters.
pub const TEXT_LIMIT: usize = 128;

const LARGE_IMAGE_KEY: &str = "roon-main";
const SMALL_IMAGE_PLAYING: &str = "play-symbol";
const SMALL_IMAGE_LOADING: &str = "roon-small";
const SMALL_IMAGE_TEXT: &str = "Roon";

/// A single presence update: either a full activity or a clear.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceUpdate {
    Activity(PresencePayload),
    Clear,
}

/// Activity payload forwarded to the presence transport.
///
/// Constructed fresh per update, never mutated after construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PresencePayload {
    pub details: String,
    pub state: Option<String>,
    /// Track start, epoch seconds
    pub start_timestamp: Option<i64>,
    /// Expected track end, epoch seconds
    pub end_timestamp: Option<i64>,
    pub large_image: &'static str,
    pub large_text: String,
    pub small_image: &'static str,
    pub small_text: &'static str,
}

/// Map a zone status to a presence update.
///
/// `now_epoch_secs` is the current wall clock in whole seconds;
/// sub-second precision is not meaningful to the presence protocol.
///
/// Paused zones deliberately map to a clear rather than a distinct
/// paused presence. A playing or paused zone without now-playing
/// metadata is treated as stopped instead of being an error.
pub fn map_status(status: &ZoneStatus, now_epoch_secs: i64) -> PresenceUpdate {
    let zone = match status {
        ZoneStatus::Stopped => return PresenceUpdate::Clear,
        ZoneStatus::Zone(zone) => zone,
    };

    match zone.state {
        PlaybackState::Stopped | PlaybackState::Paused => PresenceUpdate::Clear,
        PlaybackState::Loading => PresenceUpdate::Activity(PresencePayload {
            details: "Loading...".to_string(),
            state: None,
            start_timestamp: None,
            end_timestamp: None,
            large_image: LARGE_IMAGE_KEY,
            large_text: format!("Zone: {}", zone.display_name),
            small_image: SMALL_IMAGE_LOADING,
            small_text: SMALL_IMAGE_TEXT,
        }),
        PlaybackState::Playing => {
            let Some(now_playing) = &zone.now_playing else {
                return PresenceUpdate::Clear;
            };

            let start = now_epoch_secs - now_playing.seek_position as i64;
            let end = start + now_playing.length as i64;

            PresenceUpdate::Activity(PresencePayload {
                details: truncate(&now_playing.two_line.line1, TEXT_LIMIT),
                state: Some(truncate(&now_playing.two_line.line2, TEXT_LIMIT)),
                start_timestamp: Some(start),
                end_timestamp: Some(end),
                large_image: LARGE_IMAGE_KEY,
                large_text: format!("Zone: {}", zone.display_name),
                small_image: SMALL_IMAGE_PLAYING,
                small_text: SMALL_IMAGE_TEXT,
            })
        }
    }
}

/// Truncate to at most `max` characters, never splitting a char.
fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => s[..cut].to_string(),
        None => s.to_string(),
    }
}
