use crossbeam::channel::{Receiver, Sender};
use voiceroom_core::{AudioTrack, Document, FeedEvent, Gift, Invite, RoomId, UserId};

use crate::{ExitReason, PeerState};

pub type EventSender = Sender<SessionEvent>;
pub type EventReceiver = Receiver<SessionEvent>;

/// Events emitted by room sessions.
///
/// Every event names the room and the local user of the session it came
/// from, since one event channel serves every session of a directory.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The local user entered the room
    Joined { room_id: RoomId, user_id: UserId },
    /// Microphone capture failed, the session continues without local audio
    LocalAudioUnavailable {
        room_id: RoomId,
        user_id: UserId,
        error: String,
    },
    /// A remote participant's audio arrived and should be played
    RemoteStream {
        room_id: RoomId,
        user_id: UserId,
        remote: UserId,
        track: AudioTrack,
    },
    /// The connection to a remote participant changed state
    PeerStateChanged {
        room_id: RoomId,
        user_id: UserId,
        remote: UserId,
        state: PeerState,
    },
    /// An invite to speak arrived for the local user
    InviteReceived {
        room_id: RoomId,
        user_id: UserId,
        invite: Document<Invite>,
    },
    /// The room's feed changed
    FeedUpdated {
        room_id: RoomId,
        user_id: UserId,
        events: Vec<Document<FeedEvent>>,
    },
    /// A gift animation started playing
    AnimationStarted {
        room_id: RoomId,
        user_id: UserId,
        /// The feed event the animation belongs to
        event_id: String,
        sender_name: String,
        gift: Gift,
    },
    /// The current gift animation ended or timed out
    AnimationFinished {
        room_id: RoomId,
        user_id: UserId,
        event_id: String,
        timed_out: bool,
    },
    /// The local music player was corrected to the shared clock
    MusicCorrected {
        room_id: RoomId,
        user_id: UserId,
        /// The position that was sought to, in seconds
        position: f64,
    },
    /// The local user was charged for another interval of a paid room
    Charged {
        room_id: RoomId,
        user_id: UserId,
        balance: u64,
    },
    /// The session is over. No more events follow for it.
    SessionEnded {
        room_id: RoomId,
        user_id: UserId,
        reason: ExitReason,
    },
}

impl SessionEvent {
    /// The local user of the session that emitted the event
    pub fn user_id(&self) -> &UserId {
        match self {
            SessionEvent::Joined { user_id, .. }
            | SessionEvent::LocalAudioUnavailable { user_id, .. }
            | SessionEvent::RemoteStream { user_id, .. }
            | SessionEvent::PeerStateChanged { user_id, .. }
            | SessionEvent::InviteReceived { user_id, .. }
            | SessionEvent::FeedUpdated { user_id, .. }
            | SessionEvent::AnimationStarted { user_id, .. }
            | SessionEvent::AnimationFinished { user_id, .. }
            | SessionEvent::MusicCorrected { user_id, .. }
            | SessionEvent::Charged { user_id, .. }
            | SessionEvent::SessionEnded { user_id, .. } => user_id,
        }
    }
}
