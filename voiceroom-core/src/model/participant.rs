use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{Timestamp, UserId};

/// Where a participant sits in a room.
///
/// Stored as a plain integer: `-1` for the audience, `0..=7` for a speaker seat
/// and `999` for the host seat.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Seat {
    #[default]
    Audience,
    Speaker(u8),
    Host,
}

impl Seat {
    pub const AUDIENCE_INDEX: i32 = -1;
    pub const HOST_INDEX: i32 = 999;

    /// Audience members don't occupy anything.
    pub fn is_occupying(&self) -> bool {
        !matches!(self, Seat::Audience)
    }
}

impl From<Seat> for i32 {
    fn from(seat: Seat) -> Self {
        match seat {
            Seat::Audience => Seat::AUDIENCE_INDEX,
            Seat::Speaker(index) => index as i32,
            Seat::Host => Seat::HOST_INDEX,
        }
    }
}

impl TryFrom<i32> for Seat {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            Seat::AUDIENCE_INDEX => Ok(Seat::Audience),
            Seat::HOST_INDEX => Ok(Seat::Host),
            index @ 0..=254 => Ok(Seat::Speaker(index as u8)),
            other => Err(format!("{other} is not a seat index")),
        }
    }
}

impl Display for Seat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Seat::Audience => write!(f, "audience"),
            Seat::Speaker(index) => write!(f, "seat {}", index + 1),
            Seat::Host => write!(f, "host seat"),
        }
    }
}

/// A short-lived emoji or sticker shown over a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub url: String,
    pub expires_at: Timestamp,
}

/// The identity a client joins a room with
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub uid: UserId,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub frame_url: Option<String>,
}

/// A member of a room, embedded in the room document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub uid: UserId,
    pub display_name: String,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub frame_url: Option<String>,
    pub is_muted: bool,
    /// Set by the host or an admin, forces `is_muted` while set
    pub is_host_muted: bool,
    pub seat_index: Seat,
    pub joined_at: Timestamp,
    pub last_seen: Timestamp,
    pub reaction: Option<Reaction>,
}

impl Participant {
    /// Creates a muted participant for the given profile
    pub fn new(profile: &Profile, seat: Seat, now: Timestamp) -> Self {
        Self {
            uid: profile.uid.clone(),
            display_name: profile.display_name.clone(),
            photo_url: profile.photo_url.clone(),
            frame_url: profile.frame_url.clone(),
            is_muted: true,
            is_host_muted: false,
            seat_index: seat,
            joined_at: now,
            last_seen: now,
            reaction: None,
        }
    }

    /// Returns true if the participant should currently be heard
    pub fn is_speaking(&self) -> bool {
        self.seat_index.is_occupying() && !self.is_muted && !self.is_host_muted
    }

    /// Returns the reaction if it hasn't expired yet
    pub fn active_reaction(&self, now: Timestamp) -> Option<&Reaction> {
        self.reaction.as_ref().filter(|r| r.expires_at > now)
    }
}
