use thiserror::Error;
use voiceroom_core::{Participant, RoomDocument, Seat, UserId};

/// What a user is allowed to do in a room, derived from the latest snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The creator of the room
    Host,
    Admin,
    Member,
    /// Not present in the room
    Outsider,
}

/// Why an action was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denied {
    #[error("The room is not active")]
    RoomInactive,
    #[error("You are not in this room")]
    NotInRoom,
    #[error("{0} is not in this room")]
    TargetNotInRoom(UserId),
    #[error("Only the host or an admin can {0}")]
    NotModerator(&'static str),
    #[error("Only the host can {0}")]
    NotHost(&'static str),
    #[error("You can only {0} yourself")]
    NotYourself(&'static str),
    #[error("The host cannot be moderated")]
    CannotModerateHost,
    #[error("Only the host can moderate an admin")]
    CannotModerateAdmin,
    #[error("There is no seat {0}")]
    InvalidSeat(Seat),
    #[error("The host seat is reserved for the creator of the room")]
    HostSeatReserved,
    #[error("{0} is locked")]
    SeatLocked(Seat),
    #[error("{seat} is occupied by {occupant}")]
    SeatOccupied { seat: Seat, occupant: UserId },
    #[error("You were muted by the host")]
    HostMuted,
    #[error("Take a seat before unmuting")]
    NotSeated,
    #[error("This invite is addressed to someone else")]
    NotInvited,
    #[error("Nothing is playing")]
    NothingPlaying,
}

/// The authorization predicate every mutating action goes through.
///
/// Checks are evaluated against a snapshot, so they are only as fresh as the
/// snapshot is. Concurrent writers are settled by the store, last write wins.
pub struct Authority<'a> {
    room: &'a RoomDocument,
    actor: &'a str,
}

impl<'a> Authority<'a> {
    pub fn new(room: &'a RoomDocument, actor: &'a str) -> Self {
        Self { room, actor }
    }

    pub fn role(&self) -> Role {
        if !self.room.is_present(self.actor) {
            Role::Outsider
        } else if self.room.is_host(self.actor) {
            Role::Host
        } else if self.room.is_admin(self.actor) {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn is_moderator(&self) -> bool {
        matches!(self.role(), Role::Host | Role::Admin)
    }

    /// The actor must be present in an active room
    pub fn require_member(&self) -> Result<&'a Participant, Denied> {
        if !self.room.active {
            return Err(Denied::RoomInactive);
        }

        self.room.participant(self.actor).ok_or(Denied::NotInRoom)
    }

    pub fn require_moderator(&self, action: &'static str) -> Result<(), Denied> {
        self.require_member()?;

        if self.is_moderator() {
            Ok(())
        } else {
            Err(Denied::NotModerator(action))
        }
    }

    pub fn require_host(&self, action: &'static str) -> Result<(), Denied> {
        self.require_member()?;

        if self.role() == Role::Host {
            Ok(())
        } else {
            Err(Denied::NotHost(action))
        }
    }

    /// The target must be present, and must be the actor unless the actor moderates
    pub fn require_self_or_moderator(
        &self,
        target: &str,
        action: &'static str,
    ) -> Result<&'a Participant, Denied> {
        self.require_member()?;

        let participant = self.require_target(target)?;

        if target != self.actor {
            self.require_moderator(action)?;
        }

        Ok(participant)
    }

    /// The target must be present and must be outranked by the actor
    pub fn require_can_moderate(
        &self,
        target: &str,
        action: &'static str,
    ) -> Result<&'a Participant, Denied> {
        self.require_moderator(action)?;

        let participant = self.require_target(target)?;

        if target == self.actor {
            return Ok(participant);
        }

        if self.room.is_host(target) {
            return Err(Denied::CannotModerateHost);
        }

        if self.room.is_admin(target) && self.role() != Role::Host {
            return Err(Denied::CannotModerateAdmin);
        }

        Ok(participant)
    }

    fn require_target(&self, target: &str) -> Result<&'a Participant, Denied> {
        self.room
            .participant(target)
            .ok_or_else(|| Denied::TargetNotInRoom(target.to_string()))
    }
}
