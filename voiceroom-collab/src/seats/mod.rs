mod map;

use voiceroom_core::{
    Config, Invite, ParticipantPatch, RoomDocument, RoomUpdate, Seat, Timestamp,
};

use crate::{Authority, Denied};

pub use map::*;

/// Plans seat and moderation changes for one actor against one snapshot.
///
/// Nothing here writes anything. Every transition returns the targeted
/// updates the caller should hand to the store, or why it was refused.
pub struct Seats<'a> {
    room: &'a RoomDocument,
    config: &'a Config,
    actor: &'a str,
    now: Timestamp,
}

impl<'a> Seats<'a> {
    pub fn new(room: &'a RoomDocument, config: &'a Config, actor: &'a str, now: Timestamp) -> Self {
        Self {
            room,
            config,
            actor,
            now,
        }
    }

    fn authority(&self) -> Authority<'a> {
        Authority::new(self.room, self.actor)
    }

    /// Puts `target` on `seat`. Moving anyone but yourself needs authority.
    pub fn take_seat(&self, target: &str, seat: Seat) -> Result<Vec<RoomUpdate>, Denied> {
        let authority = self.authority();
        authority.require_self_or_moderator(target, "move other people")?;

        self.place(target, seat, authority.is_moderator())
    }

    pub fn move_to_audience(&self, target: &str) -> Result<Vec<RoomUpdate>, Denied> {
        self.authority()
            .require_self_or_moderator(target, "move other people")?;

        self.place(target, Seat::Audience, false)
    }

    /// Accepts an invite addressed to the actor, re-validating the seat
    pub fn accept_invite(&self, invite: &Invite) -> Result<Vec<RoomUpdate>, Denied> {
        if invite.to != self.actor {
            return Err(Denied::NotInvited);
        }

        self.authority().require_member()?;

        // An invite from someone who still moderates may place the guest on a locked seat
        let may_override_lock = self.room.has_authority(&invite.from);
        self.place(self.actor, invite.seat_index, may_override_lock)
    }

    /// Builds an invite for a speaker seat. The seat must be free right now.
    pub fn invite(&self, to: &str, seat: Seat) -> Result<Invite, Denied> {
        let authority = self.authority();
        authority.require_moderator("invite people to speak")?;

        let inviter = authority.require_member()?;

        if !self.room.is_present(to) {
            return Err(Denied::TargetNotInRoom(to.to_string()));
        }

        let Seat::Speaker(index) = seat else {
            return Err(Denied::InvalidSeat(seat));
        };

        self.check_speaker_seat(to, index, true)?;

        Ok(Invite {
            to: to.to_string(),
            from: self.actor.to_string(),
            from_name: inviter.display_name.clone(),
            seat_index: seat,
        })
    }

    pub fn lock_seat(&self, index: u8) -> Result<Vec<RoomUpdate>, Denied> {
        self.authority().require_moderator("lock seats")?;
        self.require_valid(index)?;

        Ok(vec![RoomUpdate::LockSeat(index)])
    }

    pub fn unlock_seat(&self, index: u8) -> Result<Vec<RoomUpdate>, Denied> {
        self.authority().require_moderator("unlock seats")?;
        self.require_valid(index)?;

        Ok(vec![RoomUpdate::UnlockSeat(index)])
    }

    /// Anyone may be muted by a moderator, but only you can unmute yourself
    pub fn set_muted(&self, target: &str, muted: bool) -> Result<Vec<RoomUpdate>, Denied> {
        let authority = self.authority();

        let participant = if muted {
            authority.require_self_or_moderator(target, "mute other people")?
        } else {
            if target != self.actor {
                return Err(Denied::NotYourself("unmute"));
            }

            let participant = authority.require_member()?;

            if participant.is_host_muted {
                return Err(Denied::HostMuted);
            }

            if !participant.seat_index.is_occupying() {
                return Err(Denied::NotSeated);
            }

            participant
        };

        if participant.is_muted == muted {
            return Ok(vec![]);
        }

        Ok(vec![patch(
            target,
            ParticipantPatch {
                is_muted: Some(muted),
                ..Default::default()
            },
        )])
    }

    pub fn toggle_mute(&self) -> Result<Vec<RoomUpdate>, Denied> {
        let participant = self.authority().require_member()?;
        self.set_muted(self.actor, !participant.is_muted)
    }

    /// Setting a host mute also mutes. Lifting it leaves the participant muted.
    pub fn set_host_muted(
        &self,
        target: &str,
        host_muted: bool,
    ) -> Result<Vec<RoomUpdate>, Denied> {
        self.authority().require_can_moderate(target, "mute people")?;

        Ok(vec![patch(
            target,
            ParticipantPatch {
                is_host_muted: Some(host_muted),
                is_muted: host_muted.then_some(true),
                ..Default::default()
            },
        )])
    }

    /// Removes the target and starts their ban window
    pub fn kick(&self, target: &str) -> Result<Vec<RoomUpdate>, Denied> {
        if target == self.actor {
            return Err(Denied::NotYourself("leave, not kick"));
        }

        self.authority().require_can_moderate(target, "kick people")?;

        let mut updates = vec![
            RoomUpdate::RemoveParticipant(target.to_string()),
            RoomUpdate::RecordKick {
                uid: target.to_string(),
                at: self.now,
            },
        ];

        if self.room.is_admin(target) {
            updates.push(RoomUpdate::RemoveAdmin(target.to_string()));
        }

        Ok(updates)
    }

    pub fn promote_admin(&self, target: &str) -> Result<Vec<RoomUpdate>, Denied> {
        self.authority().require_host("appoint admins")?;

        if !self.room.is_present(target) {
            return Err(Denied::TargetNotInRoom(target.to_string()));
        }

        Ok(vec![RoomUpdate::AddAdmin(target.to_string())])
    }

    pub fn demote_admin(&self, target: &str) -> Result<Vec<RoomUpdate>, Denied> {
        self.authority().require_host("dismiss admins")?;

        Ok(vec![RoomUpdate::RemoveAdmin(target.to_string())])
    }

    fn place(
        &self,
        target: &str,
        seat: Seat,
        may_override_lock: bool,
    ) -> Result<Vec<RoomUpdate>, Denied> {
        let current = self
            .room
            .participant(target)
            .ok_or_else(|| Denied::TargetNotInRoom(target.to_string()))?;

        match seat {
            Seat::Audience => {}
            Seat::Host => {
                if !self.room.is_host(target) {
                    return Err(Denied::HostSeatReserved);
                }

                self.check_free(target, seat)?;
            }
            Seat::Speaker(index) => self.check_speaker_seat(target, index, may_override_lock)?,
        }

        if current.seat_index == seat {
            return Ok(vec![]);
        }

        // Every seat change starts muted
        Ok(vec![patch(
            target,
            ParticipantPatch {
                seat_index: Some(seat),
                is_muted: Some(true),
                ..Default::default()
            },
        )])
    }

    fn check_speaker_seat(
        &self,
        target: &str,
        index: u8,
        may_override_lock: bool,
    ) -> Result<(), Denied> {
        self.require_valid(index)?;

        let seat = Seat::Speaker(index);

        if self.room.is_locked(index) && !may_override_lock {
            return Err(Denied::SeatLocked(seat));
        }

        self.check_free(target, seat)
    }

    fn check_free(&self, target: &str, seat: Seat) -> Result<(), Denied> {
        match self.room.occupant(seat) {
            Some(occupant) if occupant.uid != target => Err(Denied::SeatOccupied {
                seat,
                occupant: occupant.uid.clone(),
            }),
            _ => Ok(()),
        }
    }

    fn require_valid(&self, index: u8) -> Result<(), Denied> {
        if self.config.is_valid_seat(index) {
            Ok(())
        } else {
            Err(Denied::InvalidSeat(Seat::Speaker(index)))
        }
    }
}

fn patch(uid: &str, patch: ParticipantPatch) -> RoomUpdate {
    RoomUpdate::PatchParticipant {
        uid: uid.to_string(),
        patch,
    }
}
