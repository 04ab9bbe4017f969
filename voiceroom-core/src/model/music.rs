use serde::{Deserialize, Serialize};

use crate::{Timestamp, UserId};

/// A song in the shared music queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: String,
    pub url: String,
    pub name: String,
    pub artist: Option<String>,
    /// The length of the song in seconds, if known
    pub duration: Option<f32>,
    pub added_by: UserId,
    pub added_by_name: String,
}

/// The shared playback state of a room.
///
/// Every client derives the playback position from `music_time`, so no
/// client needs to broadcast its own position.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicState {
    pub is_enabled: bool,
    pub music_url: Option<String>,
    pub current_song_name: Option<String>,
    /// The length of the current song in seconds, if known
    pub current_song_duration: Option<f32>,
    pub played_by: Option<UserId>,
    pub is_playing: bool,
    /// The anchor: the instant the current song would have started if it was never paused
    pub music_time: Timestamp,
    /// When playback was paused, if it is paused
    pub paused_at: Option<Timestamp>,
    pub queue: Vec<Song>,
}

impl MusicState {
    /// Returns true if a song is loaded, playing or not
    pub fn has_track(&self) -> bool {
        self.music_url.is_some()
    }

    /// The position every client should be at, in seconds.
    /// Returns [None] if there is nothing loaded.
    pub fn expected_position(&self, now: Timestamp) -> Option<f64> {
        if !self.has_track() {
            return None;
        }

        let reference = match (self.is_playing, self.paused_at) {
            (false, Some(paused_at)) => paused_at,
            _ => now,
        };

        let elapsed = (reference - self.music_time).max(0);
        Some(elapsed as f64 / 1000.)
    }

    /// Returns true once the shared clock has passed the end of a song with a known length
    pub fn has_finished(&self, now: Timestamp) -> bool {
        match (self.current_song_duration, self.expected_position(now)) {
            (Some(duration), Some(position)) => self.is_playing && position >= duration as f64,
            _ => false,
        }
    }
}
