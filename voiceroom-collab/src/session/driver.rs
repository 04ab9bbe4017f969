use std::{collections::HashSet, sync::Arc};

use crossbeam::atomic::AtomicCell;
use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::{
    sync::{
        mpsc::{unbounded_channel, UnboundedReceiver},
        oneshot,
    },
    time::{interval, interval_at, Instant, MissedTickBehavior},
};
use voiceroom_core::{
    AudioTrack, Document, DocumentId, FeedEvent, Invite, MusicPlayer, ParticipantPatch,
    PeerEventReceiver, RoomDocument, RoomId, RoomUpdate, SignalMessage, StoreResult,
    Subscription, UserId,
};

use super::{departure, BillingMeter, Charge, ExitReason};
use crate::{
    AnimationQueue, AnimationStep, MusicControl, MusicSync, PeerMesh, PlayerCommand,
    SessionContext, SessionEvent,
};

pub(crate) enum SessionCommand {
    Leave {
        reply: oneshot::Sender<StoreResult<()>>,
    },
    AnimationFinished {
        event_id: String,
    },
}

/// Everything the driver listens to
pub(crate) struct DriverInputs {
    pub rooms: Subscription<Option<RoomDocument>>,
    pub signals: Subscription<Document<SignalMessage>>,
    pub invites: Subscription<Vec<Document<Invite>>>,
    pub feed: Subscription<Vec<Document<FeedEvent>>>,
    pub commands: UnboundedReceiver<SessionCommand>,
}

/// The single task behind a session. It owns the mesh, the player, the
/// animation queue and the billing meter, so none of them are shared.
pub(crate) struct SessionDriver {
    context: SessionContext,
    room_id: RoomId,
    user_id: UserId,
    snapshot: Arc<RwLock<RoomDocument>>,
    exit: Arc<AtomicCell<Option<ExitReason>>>,
    mesh: PeerMesh,
    local_track: Option<AudioTrack>,
    player: Box<dyn MusicPlayer>,
    music_sync: MusicSync,
    animations: AnimationQueue,
    billing: BillingMeter,
    /// Set once a snapshot contained the local user
    seen_self: bool,
    announced_invites: HashSet<DocumentId>,
}

impl SessionDriver {
    pub fn new(
        context: &SessionContext,
        room_id: &str,
        user_id: &str,
        local_track: Option<AudioTrack>,
        snapshot: Arc<RwLock<RoomDocument>>,
        exit: Arc<AtomicCell<Option<ExitReason>>>,
    ) -> (Self, PeerEventReceiver) {
        let (peer_sender, peer_events) = unbounded_channel();

        let mut mesh = PeerMesh::new(context, room_id, user_id, peer_sender);
        mesh.set_local_track(local_track.clone());

        let billing = BillingMeter::for_participant(&snapshot.read(), user_id);

        let driver = Self {
            context: context.clone(),
            room_id: room_id.to_string(),
            user_id: user_id.to_string(),
            snapshot,
            exit,
            mesh,
            local_track,
            player: context.media.music_player(),
            music_sync: MusicSync::new(context.config.music_drift_tolerance_in_seconds),
            animations: AnimationQueue::new(&context.config),
            billing,
            seen_self: false,
            announced_invites: Default::default(),
        };

        (driver, peer_events)
    }

    pub async fn run(mut self, mut inputs: DriverInputs, mut peer_events: PeerEventReceiver) {
        let config = self.context.config.clone();

        let mut heartbeat = interval(config.heartbeat_interval());
        let mut animation_tick = interval(config.animation_tick());
        let mut music_tick = interval(config.music_sync_interval());

        // Billing happens at the end of every interval, not at the start
        let billing_period = config.billing_interval();
        let mut billing_tick = interval_at(Instant::now() + billing_period, billing_period);

        for timer in [
            &mut heartbeat,
            &mut animation_tick,
            &mut music_tick,
            &mut billing_tick,
        ] {
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let reason = loop {
            // Snapshots go first, so negotiation always sees the latest participants
            let exit = tokio::select! {
                biased;

                room = inputs.rooms.recv() => match room {
                    Some(Some(room)) => self.on_room(room).await,
                    Some(None) | None => Some(ExitReason::RoomDeleted),
                },
                Some(signal) = inputs.signals.recv() => {
                    self.mesh.handle_signal(signal).await;
                    None
                }
                Some(invites) = inputs.invites.recv() => {
                    self.on_invites(invites);
                    None
                }
                Some(feed) = inputs.feed.recv() => {
                    self.on_feed(feed);
                    None
                }
                Some(event) = peer_events.recv() => {
                    self.mesh.handle_peer_event(event).await;
                    None
                }
                _ = heartbeat.tick() => {
                    self.heartbeat().await;
                    None
                }
                _ = animation_tick.tick() => {
                    let steps = self.animations.tick(self.context.now());
                    self.emit_animation_steps(steps);
                    None
                }
                _ = music_tick.tick() => {
                    self.sync_music().await;
                    None
                }
                _ = billing_tick.tick(), if self.billing.is_active() => self.charge().await,
                command = inputs.commands.recv() => match command {
                    Some(SessionCommand::Leave { reply }) => {
                        let result = self.leave().await;
                        reply.send(result).ok();
                        Some(ExitReason::Left)
                    }
                    Some(SessionCommand::AnimationFinished { event_id }) => {
                        let steps = self.animations.on_finished(&event_id, self.context.now());
                        self.emit_animation_steps(steps);
                        None
                    }
                    None => Some(ExitReason::Left),
                },
            };

            if let Some(reason) = exit {
                break reason;
            }
        };

        self.shutdown(reason);
    }

    async fn on_room(&mut self, room: RoomDocument) -> Option<ExitReason> {
        if !room.active && !room.has_authority(&self.user_id) {
            return Some(ExitReason::RoomEnded);
        }

        match room.participant(&self.user_id) {
            Some(me) => {
                self.seen_self = true;

                // Only seated, unmuted participants are heard
                if let Some(track) = &self.local_track {
                    track.set_enabled(me.is_speaking());
                }
            }
            None if self.seen_self => {
                let now = self.context.now();
                let window = self.context.config.kick_ban_in_ms();

                return match room.ban_remaining(&self.user_id, now, window) {
                    Some(_) => Some(ExitReason::Kicked),
                    None => Some(ExitReason::Removed),
                };
            }
            None => debug!("{} is not in {} yet", self.user_id, self.room_id),
        }

        self.billing = BillingMeter::for_participant(&room, &self.user_id);

        let participants = room.participants.clone();
        *self.snapshot.write() = room;

        self.mesh.reconcile(&participants).await;
        self.sync_music().await;

        None
    }

    fn on_invites(&mut self, invites: Vec<Document<Invite>>) {
        let live: HashSet<&DocumentId> = invites.iter().map(|i| &i.id).collect();
        self.announced_invites.retain(|id| live.contains(id));

        for invite in &invites {
            if !self.announced_invites.insert(invite.id.clone()) {
                continue;
            }

            info!(
                "{} was invited to {} by {}",
                self.user_id, invite.data.seat_index, invite.data.from
            );

            self.context.emit(SessionEvent::InviteReceived {
                room_id: self.room_id.clone(),
                user_id: self.user_id.clone(),
                invite: invite.clone(),
            });
        }
    }

    fn on_feed(&mut self, feed: Vec<Document<FeedEvent>>) {
        let steps = self.animations.ingest_feed(&feed, self.context.now());

        self.context.emit(SessionEvent::FeedUpdated {
            room_id: self.room_id.clone(),
            user_id: self.user_id.clone(),
            events: feed,
        });

        self.emit_animation_steps(steps);
    }

    fn emit_animation_steps(&self, steps: Vec<AnimationStep>) {
        for step in steps {
            let event = match step {
                AnimationStep::Started(animation) => SessionEvent::AnimationStarted {
                    room_id: self.room_id.clone(),
                    user_id: self.user_id.clone(),
                    event_id: animation.event_id,
                    sender_name: animation.sender_name,
                    gift: animation.gift,
                },
                AnimationStep::Finished {
                    event_id,
                    timed_out,
                } => {
                    if timed_out {
                        debug!("Animation {event_id} timed out");
                    }

                    SessionEvent::AnimationFinished {
                        room_id: self.room_id.clone(),
                        user_id: self.user_id.clone(),
                        event_id,
                        timed_out,
                    }
                }
            };

            self.context.emit(event);
        }
    }

    async fn heartbeat(&self) {
        if !self.seen_self {
            return;
        }

        let update = RoomUpdate::PatchParticipant {
            uid: self.user_id.clone(),
            patch: ParticipantPatch {
                last_seen: Some(self.context.now()),
                ..Default::default()
            },
        };

        if let Err(error) = self
            .context
            .store
            .update_room(&self.room_id, vec![update])
            .await
        {
            warn!("Heartbeat of {} in {} failed: {error}", self.user_id, self.room_id);
        }
    }

    /// Corrects the local player, and moves on from a finished song if allowed to
    async fn sync_music(&mut self) {
        let now = self.context.now();
        let room = self.snapshot.read().clone();
        let music = &room.music_state;

        for command in self.music_sync.reconcile(music, self.player.as_ref(), now) {
            command.apply(self.player.as_ref());

            if let PlayerCommand::Seek(position) = command {
                self.context.emit(SessionEvent::MusicCorrected {
                    room_id: self.room_id.clone(),
                    user_id: self.user_id.clone(),
                    position,
                });
            }
        }

        // The local player knows when a track ends, a known length is the fallback
        let ended_locally = music.is_playing
            && self.player.has_ended()
            && self.player.source().as_ref() == music.music_url.as_ref();

        // Only moderators advance, everybody else waits for the next snapshot
        if !(ended_locally || music.has_finished(now)) || !room.has_authority(&self.user_id) {
            return;
        }

        let Some(ended) = &music.music_url else {
            return;
        };

        let updates = match MusicControl::new(&room, &self.user_id, now).finish(ended) {
            Ok(updates) => updates,
            Err(denied) => {
                debug!("{} can't advance the music: {denied}", self.user_id);
                return;
            }
        };

        if updates.is_empty() {
            return;
        }

        info!("{} ended in {}, advancing", ended, self.room_id);

        if let Err(error) = self.context.store.update_room(&self.room_id, updates).await {
            warn!("Could not advance the music in {}: {error}", self.room_id);
        }
    }

    async fn charge(&mut self) -> Option<ExitReason> {
        let charge = self
            .billing
            .charge(self.context.billing.as_ref(), &self.room_id, &self.user_id)
            .await;

        match charge {
            Charge::Charged { balance } => {
                self.context.emit(SessionEvent::Charged {
                    room_id: self.room_id.clone(),
                    user_id: self.user_id.clone(),
                    balance,
                });

                None
            }
            Charge::InsufficientFunds => {
                let update = RoomUpdate::RemoveParticipant(self.user_id.clone());

                if let Err(error) = self
                    .context
                    .store
                    .update_room(&self.room_id, vec![update])
                    .await
                {
                    warn!("Could not remove {} from {}: {error}", self.user_id, self.room_id);
                }

                Some(ExitReason::InsufficientFunds)
            }
            Charge::Skipped => None,
        }
    }

    async fn leave(&mut self) -> StoreResult<()> {
        let room = match self.context.store.room(&self.room_id).await {
            Ok(room) => room,
            Err(error) if error.is_not_found() => return Ok(()),
            Err(error) => return Err(error),
        };

        let updates = departure(&room, &self.user_id);

        if updates.contains(&RoomUpdate::SetActive(false)) {
            info!("{} ended {} on the way out", self.user_id, self.room_id);
        }

        if updates.is_empty() {
            return Ok(());
        }

        self.context.store.update_room(&self.room_id, updates).await
    }

    fn shutdown(mut self, reason: ExitReason) {
        self.mesh.close_all();
        self.player.stop();

        if let Some(track) = &self.local_track {
            track.set_enabled(false);
        }

        self.exit.store(Some(reason));

        info!("{} is out of {}: {reason:?}", self.user_id, self.room_id);

        self.context.emit(SessionEvent::SessionEnded {
            room_id: self.room_id.clone(),
            user_id: self.user_id.clone(),
            reason,
        });
    }
}
