use thiserror::Error;

use crate::{Participant, Reaction, RoomDocument, Seat, Song, Timestamp, UserId};

/// A targeted mutation of a room document.
///
/// Clients never rewrite a whole room. Every write is a list of these,
/// which a store applies atomically, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum RoomUpdate {
    SetActive(bool),
    /// Array-union keyed by uid. Does nothing if the participant is already present.
    AddParticipant(Participant),
    /// Array-remove keyed by uid.
    RemoveParticipant(UserId),
    PatchParticipant {
        uid: UserId,
        patch: ParticipantPatch,
    },
    AddAdmin(UserId),
    RemoveAdmin(UserId),
    LockSeat(u8),
    UnlockSeat(u8),
    RecordKick {
        uid: UserId,
        at: Timestamp,
    },
    PatchMusic(MusicPatch),
    /// Appends a song to the end of the queue
    EnqueueSong(Song),
    /// Removes a song from the queue by id
    RemoveSong(String),
}

/// Fields of a participant to overwrite. `None` leaves a field untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParticipantPatch {
    pub is_muted: Option<bool>,
    pub is_host_muted: Option<bool>,
    pub seat_index: Option<Seat>,
    pub joined_at: Option<Timestamp>,
    pub last_seen: Option<Timestamp>,
    pub reaction: Option<Option<Reaction>>,
}

/// Fields of the music state to overwrite. `None` leaves a field untouched.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MusicPatch {
    pub is_enabled: Option<bool>,
    pub music_url: Option<Option<String>>,
    pub current_song_name: Option<Option<String>>,
    pub current_song_duration: Option<Option<f32>>,
    pub played_by: Option<Option<UserId>>,
    pub is_playing: Option<bool>,
    pub music_time: Option<Timestamp>,
    pub paused_at: Option<Option<Timestamp>>,
}

/// A write the store refuses to apply
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateRejected {
    #[error("{seat} is already occupied by {occupant}")]
    SeatOccupied { seat: Seat, occupant: UserId },
}

impl RoomUpdate {
    /// Applies the update to a room document.
    ///
    /// A participant with `is_host_muted` set always ends up with `is_muted` set,
    /// and a seat can never be given to a second participant.
    pub fn apply(&self, room: &mut RoomDocument) -> Result<(), UpdateRejected> {
        match self {
            RoomUpdate::SetActive(active) => room.active = *active,
            RoomUpdate::AddParticipant(participant) => {
                if !room.is_present(&participant.uid) {
                    check_seat_free(room, &participant.uid, participant.seat_index)?;

                    let mut participant = participant.clone();
                    normalize(&mut participant);
                    room.participants.push(participant);
                }
            }
            RoomUpdate::RemoveParticipant(uid) => room.participants.retain(|p| &p.uid != uid),
            RoomUpdate::PatchParticipant { uid, patch } => {
                if let Some(seat) = patch.seat_index {
                    check_seat_free(room, uid, seat)?;
                }

                if let Some(participant) = room.participants.iter_mut().find(|p| &p.uid == uid) {
                    patch.apply(participant);
                }
            }
            RoomUpdate::AddAdmin(uid) => {
                room.admins.insert(uid.clone());
            }
            RoomUpdate::RemoveAdmin(uid) => {
                room.admins.remove(uid);
            }
            RoomUpdate::LockSeat(index) => {
                room.locked_seats.insert(*index);
            }
            RoomUpdate::UnlockSeat(index) => {
                room.locked_seats.remove(index);
            }
            RoomUpdate::RecordKick { uid, at } => {
                room.kicked_users.insert(uid.clone(), *at);
            }
            RoomUpdate::PatchMusic(patch) => patch.apply(room),
            RoomUpdate::EnqueueSong(song) => room.music_state.queue.push(song.clone()),
            RoomUpdate::RemoveSong(id) => room.music_state.queue.retain(|s| &s.id != id),
        }

        Ok(())
    }
}

impl ParticipantPatch {
    fn apply(&self, participant: &mut Participant) {
        if let Some(is_muted) = self.is_muted {
            participant.is_muted = is_muted;
        }

        if let Some(is_host_muted) = self.is_host_muted {
            participant.is_host_muted = is_host_muted;
        }

        if let Some(seat) = self.seat_index {
            participant.seat_index = seat;
        }

        if let Some(joined_at) = self.joined_at {
            participant.joined_at = joined_at;
        }

        if let Some(last_seen) = self.last_seen {
            participant.last_seen = last_seen;
        }

        if let Some(reaction) = &self.reaction {
            participant.reaction = reaction.clone();
        }

        normalize(participant);
    }
}

impl MusicPatch {
    fn apply(&self, room: &mut RoomDocument) {
        let music = &mut room.music_state;

        if let Some(is_enabled) = self.is_enabled {
            music.is_enabled = is_enabled;
        }
        if let Some(url) = &self.music_url {
            music.music_url = url.clone();
        }
        if let Some(name) = &self.current_song_name {
            music.current_song_name = name.clone();
        }
        if let Some(duration) = self.current_song_duration {
            music.current_song_duration = duration;
        }
        if let Some(played_by) = &self.played_by {
            music.played_by = played_by.clone();
        }
        if let Some(is_playing) = self.is_playing {
            music.is_playing = is_playing;
        }
        if let Some(music_time) = self.music_time {
            music.music_time = music_time;
        }
        if let Some(paused_at) = self.paused_at {
            music.paused_at = paused_at;
        }
    }
}

fn normalize(participant: &mut Participant) {
    if participant.is_host_muted {
        participant.is_muted = true;
    }
}

fn check_seat_free(room: &RoomDocument, uid: &str, seat: Seat) -> Result<(), UpdateRejected> {
    match room.occupant(seat) {
        Some(occupant) if occupant.uid != uid => Err(UpdateRejected::SeatOccupied {
            seat,
            occupant: occupant.uid.clone(),
        }),
        _ => Ok(()),
    }
}
