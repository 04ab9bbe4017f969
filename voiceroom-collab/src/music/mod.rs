mod sync;

use voiceroom_core::{MusicPatch, RoomDocument, RoomUpdate, Song, Timestamp};

use crate::{Authority, Denied};

pub use sync::*;

/// Plans changes to a room's shared music for one actor against one snapshot.
pub struct MusicControl<'a> {
    room: &'a RoomDocument,
    actor: &'a str,
    now: Timestamp,
}

impl<'a> MusicControl<'a> {
    pub fn new(room: &'a RoomDocument, actor: &'a str, now: Timestamp) -> Self {
        Self { room, actor, now }
    }

    /// Any member may queue a song. With nothing loaded and nothing queued, it starts right away.
    pub fn enqueue(&self, song: Song) -> Result<Vec<RoomUpdate>, Denied> {
        Authority::new(self.room, self.actor).require_member()?;

        let music = &self.room.music_state;

        if music.is_enabled && !music.has_track() && music.queue.is_empty() {
            return Ok(vec![RoomUpdate::PatchMusic(self.start(&song))]);
        }

        Ok(vec![RoomUpdate::EnqueueSong(song)])
    }

    /// Starts the head of the queue, or stops when the queue is empty
    pub fn play_next(&self) -> Result<Vec<RoomUpdate>, Denied> {
        Authority::new(self.room, self.actor).require_moderator("change the song")?;

        Ok(self.advance())
    }

    /// Moves on from a song that ended. Nothing happens if someone already did.
    pub fn finish(&self, ended_url: &str) -> Result<Vec<RoomUpdate>, Denied> {
        Authority::new(self.room, self.actor).require_moderator("change the song")?;

        if self.room.music_state.music_url.as_deref() != Some(ended_url) {
            return Ok(vec![]);
        }

        Ok(self.advance())
    }

    pub fn toggle_play_pause(&self) -> Result<Vec<RoomUpdate>, Denied> {
        Authority::new(self.room, self.actor).require_moderator("pause the music")?;

        let music = &self.room.music_state;

        if !music.has_track() {
            return Err(Denied::NothingPlaying);
        }

        let patch = if music.is_playing {
            MusicPatch {
                is_playing: Some(false),
                paused_at: Some(Some(self.now)),
                ..Default::default()
            }
        } else {
            // Shift the anchor by the time spent paused, so the position carries on
            let paused_for = music
                .paused_at
                .map(|paused_at| (self.now - paused_at).max(0))
                .unwrap_or_default();

            MusicPatch {
                is_playing: Some(true),
                music_time: Some(music.music_time + paused_for),
                paused_at: Some(None),
                ..Default::default()
            }
        };

        Ok(vec![RoomUpdate::PatchMusic(patch)])
    }

    pub fn stop(&self) -> Result<Vec<RoomUpdate>, Denied> {
        Authority::new(self.room, self.actor).require_moderator("stop the music")?;

        Ok(vec![RoomUpdate::PatchMusic(stopped())])
    }

    /// Removes a queued song. Members may remove what they queued themselves.
    pub fn remove(&self, song_id: &str) -> Result<Vec<RoomUpdate>, Denied> {
        let authority = Authority::new(self.room, self.actor);
        authority.require_member()?;

        let added_by_actor = self
            .room
            .music_state
            .queue
            .iter()
            .any(|s| s.id == song_id && s.added_by == self.actor);

        if !added_by_actor {
            authority.require_moderator("remove other people's songs")?;
        }

        Ok(vec![RoomUpdate::RemoveSong(song_id.to_string())])
    }

    fn advance(&self) -> Vec<RoomUpdate> {
        match self.room.music_state.queue.first() {
            Some(next) => vec![
                RoomUpdate::PatchMusic(self.start(next)),
                RoomUpdate::RemoveSong(next.id.clone()),
            ],
            None => vec![RoomUpdate::PatchMusic(stopped())],
        }
    }

    fn start(&self, song: &Song) -> MusicPatch {
        MusicPatch {
            music_url: Some(Some(song.url.clone())),
            current_song_name: Some(Some(song.name.clone())),
            current_song_duration: Some(song.duration),
            played_by: Some(Some(song.added_by.clone())),
            is_playing: Some(true),
            music_time: Some(self.now),
            paused_at: Some(None),
            ..Default::default()
        }
    }
}

fn stopped() -> MusicPatch {
    MusicPatch {
        music_url: Some(None),
        current_song_name: Some(None),
        current_song_duration: Some(None),
        played_by: Some(None),
        is_playing: Some(false),
        paused_at: Some(None),
        ..Default::default()
    }
}
