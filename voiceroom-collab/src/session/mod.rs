mod billing;
mod driver;

use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use log::{info, warn};
use parking_lot::RwLock;
use thiserror::Error;
use tokio::{
    sync::{mpsc::UnboundedSender, oneshot},
    task::JoinHandle,
};
use voiceroom_core::{
    AudioTrack, Document, DocumentId, FeedEvent, Gift, Invite, Participant, ParticipantPatch,
    Profile, PushNotification, Reaction, RoomDocument, RoomId, RoomUpdate, Seat, Song,
    StoreError, Timestamp, Upload, UploadError, UserId,
};

use crate::{Authority, Denied, MusicControl, SeatMap, Seats, SessionContext, SessionEvent};

pub use billing::*;
use driver::{DriverInputs, SessionCommand, SessionDriver};

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The local user left
    Left,
    /// A moderator kicked the local user
    Kicked,
    /// The local user's entry disappeared without a kick
    Removed,
    /// The room was deactivated
    RoomEnded,
    /// The room document was deleted
    RoomDeleted,
    /// A paid room could not be billed any more
    InsufficientFunds,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Room {0} doesn't exist")]
    RoomNotFound(RoomId),
    #[error("Room {0} has ended")]
    RoomEnded(RoomId),
    #[error("You were kicked from this room, try again in {} seconds", (.remaining + 999) / 1000)]
    Banned { remaining: Timestamp },
    #[error(transparent)]
    Denied(#[from] Denied),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error("Messages can't be empty")]
    EmptyMessage,
    #[error("The session is over")]
    Ended,
}

/// A live presence in a room.
///
/// Joining spawns a driver task that follows the room until the session
/// ends. Every action is checked against the latest snapshot and written to
/// the store as targeted updates. Dropping the session stops the driver and
/// closes every connection without writing anything.
pub struct RoomSession {
    context: SessionContext,
    room_id: RoomId,
    profile: Profile,
    snapshot: Arc<RwLock<RoomDocument>>,
    exit: Arc<AtomicCell<Option<ExitReason>>>,
    local_track: Option<AudioTrack>,
    commands: UnboundedSender<SessionCommand>,
    task: JoinHandle<()>,
}

impl RoomSession {
    pub async fn join(
        context: &SessionContext,
        room_id: &str,
        profile: Profile,
    ) -> Result<Self, SessionError> {
        let store = &context.store;
        let now = context.now();

        let room = fetch_room(context, room_id).await?;

        if !room.active {
            return Err(SessionError::RoomEnded(room_id.to_string()));
        }

        let ban_window = context.config.kick_ban_in_ms();
        if let Some(remaining) = room.ban_remaining(&profile.uid, now, ban_window) {
            info!("{} is still banned from {room_id}", profile.uid);
            return Err(SessionError::Banned { remaining });
        }

        if let Some(previous) = room.participant(&profile.uid) {
            // A new join time makes everyone else reconnect to this session
            let update = RoomUpdate::PatchParticipant {
                uid: profile.uid.clone(),
                patch: ParticipantPatch {
                    joined_at: Some(now.max(previous.joined_at + 1)),
                    last_seen: Some(now),
                    ..Default::default()
                },
            };

            store.update_room(room_id, vec![update]).await?;
        } else {
            // The creator takes the host seat unless someone else sits there
            let seat = if room.is_host(&profile.uid) && room.occupant(Seat::Host).is_none() {
                Seat::Host
            } else {
                Seat::Audience
            };

            let participant = Participant::new(&profile, seat, now);

            match store
                .update_room(room_id, vec![RoomUpdate::AddParticipant(participant)])
                .await
            {
                Ok(()) => {}
                Err(StoreError::Rejected(_)) if seat == Seat::Host => {
                    let participant = Participant::new(&profile, Seat::Audience, now);
                    store
                        .update_room(room_id, vec![RoomUpdate::AddParticipant(participant)])
                        .await?;
                }
                Err(error) => return Err(error.into()),
            }
        }

        let room = fetch_room(context, room_id).await?;

        let local_track = match context.media.capture_microphone(&profile.uid).await {
            Ok(track) => {
                track.set_enabled(false);
                Some(track)
            }
            Err(error) => {
                warn!("{} joins {room_id} without local audio: {error}", profile.uid);

                context.emit(SessionEvent::LocalAudioUnavailable {
                    room_id: room_id.to_string(),
                    user_id: profile.uid.clone(),
                    error: error.to_string(),
                });

                None
            }
        };

        if context.config.announce_joins {
            let event = FeedEvent::System {
                text: format!("{} joined", profile.display_name),
                timestamp: now,
            };

            if let Err(error) = store.append_feed(room_id, event).await {
                warn!("Could not announce {} in {room_id}: {error}", profile.uid);
            }
        }

        let snapshot = Arc::new(RwLock::new(room));
        let exit = Arc::new(AtomicCell::new(None));
        let (commands, command_receiver) = tokio::sync::mpsc::unbounded_channel();

        let inputs = DriverInputs {
            rooms: store.subscribe_room(room_id),
            signals: context.relay.subscribe(room_id),
            invites: store.subscribe_invites(room_id, &profile.uid),
            feed: store.subscribe_feed(room_id),
            commands: command_receiver,
        };

        let (driver, peer_events) = SessionDriver::new(
            context,
            room_id,
            &profile.uid,
            local_track.clone(),
            snapshot.clone(),
            exit.clone(),
        );

        info!("{} joined {room_id}", profile.display_name);

        context.emit(SessionEvent::Joined {
            room_id: room_id.to_string(),
            user_id: profile.uid.clone(),
        });

        let task = tokio::spawn(driver.run(inputs, peer_events));

        Ok(Self {
            context: context.clone(),
            room_id: room_id.to_string(),
            profile,
            snapshot,
            exit,
            local_track,
            commands,
            task,
        })
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    pub fn user_id(&self) -> &str {
        &self.profile.uid
    }

    /// The latest room document this session saw
    pub fn snapshot(&self) -> RoomDocument {
        self.snapshot.read().clone()
    }

    /// Every seat of the latest snapshot
    pub fn seat_map(&self) -> SeatMap {
        SeatMap::from_room(&self.snapshot.read(), &self.context.config)
    }

    /// Returns why the session ended, or [None] while it is live
    pub fn exit_reason(&self) -> Option<ExitReason> {
        self.exit.load()
    }

    /// Returns true while the local microphone is heard by the room
    pub fn is_transmitting(&self) -> bool {
        self.local_track
            .as_ref()
            .map(|t| t.is_enabled())
            .unwrap_or(false)
    }

    /// Leaves the room. The room ends if this removes the last person with authority.
    pub async fn leave(&self) -> Result<(), SessionError> {
        let (reply, done) = oneshot::channel();

        if self.commands.send(SessionCommand::Leave { reply }).is_err() {
            return Ok(());
        }

        match done.await {
            Ok(result) => Ok(result?),
            // The driver ended on its own in the meantime
            Err(_) => Ok(()),
        }
    }

    pub async fn heartbeat(&self) -> Result<(), SessionError> {
        self.live_snapshot()?;

        self.write(vec![RoomUpdate::PatchParticipant {
            uid: self.profile.uid.clone(),
            patch: ParticipantPatch {
                last_seen: Some(self.context.now()),
                ..Default::default()
            },
        }])
        .await
    }

    pub async fn toggle_mute(&self) -> Result<(), SessionError> {
        self.seats(|s| s.toggle_mute()).await
    }

    pub async fn set_muted(&self, target: &str, muted: bool) -> Result<(), SessionError> {
        self.seats(|s| s.set_muted(target, muted)).await
    }

    pub async fn set_host_muted(&self, target: &str, host_muted: bool) -> Result<(), SessionError> {
        self.seats(|s| s.set_host_muted(target, host_muted)).await
    }

    pub async fn take_seat(&self, target: &str, seat: Seat) -> Result<(), SessionError> {
        self.seats(|s| s.take_seat(target, seat)).await
    }

    pub async fn move_to_audience(&self, target: &str) -> Result<(), SessionError> {
        self.seats(|s| s.move_to_audience(target)).await
    }

    pub async fn lock_seat(&self, index: u8) -> Result<(), SessionError> {
        self.seats(|s| s.lock_seat(index)).await
    }

    pub async fn unlock_seat(&self, index: u8) -> Result<(), SessionError> {
        self.seats(|s| s.unlock_seat(index)).await
    }

    pub async fn kick(&self, target: &str) -> Result<(), SessionError> {
        self.seats(|s| s.kick(target)).await?;
        info!("{} kicked {target} from {}", self.profile.uid, self.room_id);

        Ok(())
    }

    pub async fn promote_admin(&self, target: &str) -> Result<(), SessionError> {
        self.seats(|s| s.promote_admin(target)).await
    }

    pub async fn demote_admin(&self, target: &str) -> Result<(), SessionError> {
        self.seats(|s| s.demote_admin(target)).await
    }

    /// Invites someone to a speaker seat and notifies them outside the room
    pub async fn invite(&self, to: &str, seat: Seat) -> Result<DocumentId, SessionError> {
        let room = self.live_snapshot()?;
        let invite = self.planner(&room).invite(to, seat)?;

        let notification = PushNotification {
            recipient: to.to_string(),
            title: room.name.clone(),
            body: format!("{} invited you to speak", invite.from_name),
            icon: self.profile.photo_url.clone(),
            link: Some(format!("/rooms/{}", self.room_id)),
        };

        let id = self
            .context
            .store
            .create_invite(&self.room_id, invite)
            .await?;

        let push = self.context.push.clone();

        tokio::spawn(async move {
            let recipient = notification.recipient.clone();

            if let Err(error) = push.dispatch(notification).await {
                warn!("Could not notify {recipient} about an invite: {error}");
            }
        });

        Ok(id)
    }

    /// Takes the invited seat if it is still available. The invite is consumed either way.
    pub async fn accept_invite(&self, invite: &Document<Invite>) -> Result<(), SessionError> {
        let result = self.seats(|s| s.accept_invite(&invite.data)).await;
        self.consume_invite(invite).await?;

        result
    }

    pub async fn decline_invite(&self, invite: &Document<Invite>) -> Result<(), SessionError> {
        if invite.data.to != self.profile.uid {
            return Err(Denied::NotInvited.into());
        }

        self.consume_invite(invite).await
    }

    /// Shows a reaction on the local user's entry for a few seconds
    pub async fn react(&self, url: &str) -> Result<(), SessionError> {
        let room = self.live_snapshot()?;
        Authority::new(&room, &self.profile.uid).require_member()?;

        let expires_at = self.context.now() + self.context.config.reaction_duration_in_ms();

        self.write(vec![RoomUpdate::PatchParticipant {
            uid: self.profile.uid.clone(),
            patch: ParticipantPatch {
                reaction: Some(Some(Reaction {
                    url: url.to_string(),
                    expires_at,
                })),
                ..Default::default()
            },
        }])
        .await
    }

    pub async fn send_message(&self, text: &str) -> Result<DocumentId, SessionError> {
        let text = text.trim();

        if text.is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.post(FeedEvent::User {
            sender: self.profile.uid.clone(),
            sender_name: self.profile.display_name.clone(),
            text: text.to_string(),
            timestamp: self.context.now(),
        })
        .await
    }

    pub async fn send_gift(&self, gift: Gift) -> Result<DocumentId, SessionError> {
        self.post(FeedEvent::Gift {
            sender: self.profile.uid.clone(),
            sender_name: self.profile.display_name.clone(),
            gift,
            timestamp: self.context.now(),
        })
        .await
    }

    /// Tells the session the renderer finished an animation
    pub fn animation_finished(&self, event_id: &str) {
        let command = SessionCommand::AnimationFinished {
            event_id: event_id.to_string(),
        };

        self.commands.send(command).ok();
    }

    pub async fn enqueue(&self, song: Song) -> Result<(), SessionError> {
        self.music(|m| m.enqueue(song)).await
    }

    /// Uploads a song and queues the uploaded copy. Failed uploads are not retried.
    pub async fn upload_and_enqueue(
        &self,
        upload: Upload,
        name: &str,
        artist: Option<String>,
        duration: Option<f32>,
    ) -> Result<Song, SessionError> {
        let room = self.live_snapshot()?;
        Authority::new(&room, &self.profile.uid).require_member()?;

        let url = self.context.uploader.upload(upload).await?;

        let song = Song {
            // Uploaded URLs are unique
            id: url.clone(),
            url,
            name: name.to_string(),
            artist,
            duration,
            added_by: self.profile.uid.clone(),
            added_by_name: self.profile.display_name.clone(),
        };

        self.enqueue(song.clone()).await?;
        Ok(song)
    }

    pub async fn play_next(&self) -> Result<(), SessionError> {
        self.music(|m| m.play_next()).await
    }

    pub async fn toggle_play_pause(&self) -> Result<(), SessionError> {
        self.music(|m| m.toggle_play_pause()).await
    }

    pub async fn stop_music(&self) -> Result<(), SessionError> {
        self.music(|m| m.stop()).await
    }

    pub async fn remove_song(&self, song_id: &str) -> Result<(), SessionError> {
        self.music(|m| m.remove(song_id)).await
    }

    fn live_snapshot(&self) -> Result<RoomDocument, SessionError> {
        match self.exit.load() {
            Some(_) => Err(SessionError::Ended),
            None => Ok(self.snapshot()),
        }
    }

    fn planner<'a>(&'a self, room: &'a RoomDocument) -> Seats<'a> {
        Seats::new(room, &self.context.config, &self.profile.uid, self.context.now())
    }

    async fn seats<F>(&self, plan: F) -> Result<(), SessionError>
    where
        F: FnOnce(&Seats<'_>) -> Result<Vec<RoomUpdate>, Denied>,
    {
        let room = self.live_snapshot()?;
        let updates = plan(&self.planner(&room))?;

        self.write(updates).await
    }

    async fn music<F>(&self, plan: F) -> Result<(), SessionError>
    where
        F: FnOnce(&MusicControl<'_>) -> Result<Vec<RoomUpdate>, Denied>,
    {
        let room = self.live_snapshot()?;
        let control = MusicControl::new(&room, &self.profile.uid, self.context.now());
        let updates = plan(&control)?;

        self.write(updates).await
    }

    async fn write(&self, updates: Vec<RoomUpdate>) -> Result<(), SessionError> {
        if updates.is_empty() {
            return Ok(());
        }

        self.context
            .store
            .update_room(&self.room_id, updates)
            .await?;

        Ok(())
    }

    async fn post(&self, event: FeedEvent) -> Result<DocumentId, SessionError> {
        let room = self.live_snapshot()?;
        Authority::new(&room, &self.profile.uid).require_member()?;

        Ok(self.context.store.append_feed(&self.room_id, event).await?)
    }

    async fn consume_invite(&self, invite: &Document<Invite>) -> Result<(), SessionError> {
        match self
            .context
            .store
            .delete_invite(&self.room_id, &invite.id)
            .await
        {
            Ok(()) => Ok(()),
            // Already consumed
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

impl Drop for RoomSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What leaving writes to the room.
///
/// The host, or an admin while the host is away, ends the room on the way
/// out if nobody with authority would be left.
pub fn departure(room: &RoomDocument, uid: &UserId) -> Vec<RoomUpdate> {
    if !room.is_present(uid) {
        return vec![];
    }

    let mut updates = vec![];
    let host_away = room.is_host(uid) || !room.is_present(&room.created_by);

    if room.has_authority(uid) && host_away {
        let authority_remains = room
            .participants
            .iter()
            .any(|p| &p.uid != uid && room.has_authority(&p.uid));

        if !authority_remains {
            updates.push(RoomUpdate::SetActive(false));
        }
    }

    updates.push(RoomUpdate::RemoveParticipant(uid.clone()));
    updates
}

async fn fetch_room(context: &SessionContext, room_id: &str) -> Result<RoomDocument, SessionError> {
    context.store.room(room_id).await.map_err(|error| {
        if error.is_not_found() {
            SessionError::RoomNotFound(room_id.to_string())
        } else {
            error.into()
        }
    })
}

#[cfg(test)]
mod test;
