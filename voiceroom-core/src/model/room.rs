use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{MusicState, Participant, RoomId, Seat, Timestamp, UserId};

/// A voice room, stored as one shared document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDocument {
    pub id: RoomId,
    pub name: String,
    /// The host of the room
    pub created_by: UserId,
    pub active: bool,
    pub participants: Vec<Participant>,
    pub admins: BTreeSet<UserId>,
    pub locked_seats: BTreeSet<u8>,
    /// When each user was last kicked
    pub kicked_users: BTreeMap<UserId, Timestamp>,
    pub music_state: MusicState,
    pub background_image: Option<String>,
    pub password: Option<String>,
    pub is_paid_call: bool,
    /// What a listener pays per billing interval in a paid room
    pub call_rate_per_minute: Option<u32>,
}

/// What is needed to create a room
#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    /// The owner of the new room
    pub created_by: UserId,
    pub background_image: Option<String>,
    pub password: Option<String>,
    pub is_paid_call: bool,
    pub call_rate_per_minute: Option<u32>,
}

impl RoomDocument {
    pub fn new(id: RoomId, new_room: NewRoom) -> Self {
        Self {
            id,
            name: new_room.name,
            created_by: new_room.created_by,
            active: true,
            participants: vec![],
            admins: Default::default(),
            locked_seats: Default::default(),
            kicked_users: Default::default(),
            music_state: MusicState {
                is_enabled: true,
                ..Default::default()
            },
            background_image: new_room.background_image,
            password: new_room.password,
            is_paid_call: new_room.is_paid_call,
            call_rate_per_minute: new_room.call_rate_per_minute,
        }
    }

    pub fn participant(&self, uid: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.uid == uid)
    }

    pub fn is_present(&self, uid: &str) -> bool {
        self.participant(uid).is_some()
    }

    pub fn is_host(&self, uid: &str) -> bool {
        self.created_by == uid
    }

    pub fn is_admin(&self, uid: &str) -> bool {
        self.admins.contains(uid)
    }

    /// Returns true if the user may moderate the room
    pub fn has_authority(&self, uid: &str) -> bool {
        self.is_host(uid) || self.is_admin(uid)
    }

    /// Returns the participant sitting on the given seat, if any.
    /// Audience is never "occupied".
    pub fn occupant(&self, seat: Seat) -> Option<&Participant> {
        if !seat.is_occupying() {
            return None;
        }

        self.participants.iter().find(|p| p.seat_index == seat)
    }

    pub fn is_locked(&self, index: u8) -> bool {
        self.locked_seats.contains(&index)
    }

    /// The identities of everyone present, in document order
    pub fn participant_ids(&self) -> Vec<UserId> {
        self.participants.iter().map(|p| p.uid.clone()).collect()
    }

    /// Returns the time left on a user's kick, in milliseconds
    pub fn ban_remaining(&self, uid: &str, now: Timestamp, window: Timestamp) -> Option<Timestamp> {
        let kicked_at = self.kicked_users.get(uid)?;
        let remaining = kicked_at + window - now;

        (remaining > 0).then_some(remaining)
    }
}
