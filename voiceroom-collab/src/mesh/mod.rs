mod candidates;
mod peer;

use std::collections::HashMap;

use log::{debug, info, warn};
use voiceroom_core::{
    AudioTrack, ConnectionSetup, Document, IceCandidate, MediaError, Participant, PeerConnection,
    PeerEvent, PeerEventSender, RoomId, SessionDescription, SignalMessage, SignalPayload,
    Timestamp, TransportState, UserId,
};

use crate::{SessionContext, SessionEvent};

pub use candidates::*;
pub use peer::*;

/// Keeps one media connection open to every other participant of a room.
///
/// The mesh is owned by a single session task, so nothing in it is locked.
/// Dropping the mesh closes every connection.
pub struct PeerMesh {
    context: SessionContext,
    room_id: RoomId,
    local: UserId,
    local_track: Option<AudioTrack>,
    peers: HashMap<UserId, PeerEntry>,
    /// Candidates from remotes the mesh has no entry for yet
    orphans: HashMap<UserId, CandidateQueue>,
    events: PeerEventSender,
    next_generation: u64,
}

impl PeerMesh {
    pub fn new(
        context: &SessionContext,
        room_id: &str,
        local: &str,
        events: PeerEventSender,
    ) -> Self {
        Self {
            context: context.clone(),
            room_id: room_id.to_string(),
            local: local.to_string(),
            local_track: None,
            peers: Default::default(),
            orphans: Default::default(),
            events,
            next_generation: 1,
        }
    }

    /// The track attached to every connection opened from now on
    pub fn set_local_track(&mut self, track: Option<AudioTrack>) {
        self.local_track = track;
    }

    pub fn state(&self, remote: &str) -> Option<PeerState> {
        self.peers.get(remote).map(|p| p.state)
    }

    /// Every remote with an entry, closed or not
    pub fn remotes(&self) -> Vec<UserId> {
        let mut remotes: Vec<_> = self.peers.keys().cloned().collect();
        remotes.sort();
        remotes
    }

    pub fn connected_count(&self) -> usize {
        self.peers
            .values()
            .filter(|p| p.state == PeerState::Connected)
            .count()
    }

    /// Makes the connection table match the participants of a snapshot.
    ///
    /// A remote whose join time changed is a new session of the same user,
    /// so its connection is rebuilt from scratch.
    pub async fn reconcile(&mut self, participants: &[Participant]) {
        let present: HashMap<&UserId, Timestamp> = participants
            .iter()
            .filter(|p| p.uid != self.local)
            .map(|p| (&p.uid, p.joined_at))
            .collect();

        let departed: Vec<UserId> = self
            .peers
            .iter()
            .filter(|(remote, entry)| entry.joined_at.is_some() && !present.contains_key(remote))
            .map(|(remote, _)| remote.clone())
            .collect();

        for remote in departed {
            self.disconnect(&remote);
        }

        self.orphans.retain(|remote, _| present.contains_key(remote));

        for (remote, joined_at) in present {
            let role = NegotiationRole::between(&self.local, remote);

            match self.peers.get(remote).map(|entry| entry.joined_at) {
                Some(Some(seen)) if seen != joined_at => {
                    info!("{remote} rejoined, {} reconnects", self.local);
                    self.disconnect(remote);
                    self.connect(remote, role).await;
                }
                Some(_) => {}
                None => self.connect(remote, role).await,
            }

            if let Some(entry) = self.peers.get_mut(remote) {
                entry.joined_at = Some(joined_at);
            }
        }
    }

    /// Opens a connection to a remote. Initiators send their offer right away,
    /// responders wait for one.
    pub async fn connect(&mut self, remote: &str, role: NegotiationRole) {
        self.open_entry(remote, role);

        if role == NegotiationRole::Initiator {
            if let Err(error) = self.send_offer(remote).await {
                warn!("Could not offer a connection to {remote}: {error}");
                self.fail(remote);
            }
        }
    }

    /// Closes the connection to a remote and forgets it
    pub fn disconnect(&mut self, remote: &str) {
        if let Some(mut entry) = self.peers.remove(remote) {
            entry.close();
            info!("{} disconnected from {remote}", self.local);
            self.emit_state(remote, PeerState::Closed);
        }

        self.orphans.remove(remote);
    }

    pub fn close_all(&mut self) {
        let remotes: Vec<_> = self.peers.keys().cloned().collect();

        for remote in remotes {
            self.disconnect(&remote);
        }
    }

    /// Processes a negotiation message from the mailbox and consumes it.
    /// Messages addressed to someone else are left alone.
    pub async fn handle_signal(&mut self, signal: Document<SignalMessage>) {
        let Document { id, data: message } = signal;

        if message.to != self.local || message.from == self.local {
            return;
        }

        debug!(
            "{} received {} from {}",
            self.local,
            message.kind(),
            message.from
        );

        let remote = message.from;

        let result = match message.payload {
            SignalPayload::Offer(offer) => self.accept_offer(&remote, offer).await,
            SignalPayload::Answer(answer) => self.accept_answer(&remote, answer).await,
            SignalPayload::Candidate(candidate) => self.add_candidate(&remote, candidate).await,
        };

        if let Err(error) = result {
            warn!("Negotiation with {remote} failed: {error}");
            self.fail(&remote);
        }

        if let Err(error) = self.context.relay.delete(&self.room_id, &id).await {
            warn!("Could not consume signal {id}: {error}");
        }
    }

    /// Reacts to something a connection reported. Events from replaced connections are ignored.
    pub async fn handle_peer_event(&mut self, event: PeerEvent) {
        let remote = event.remote().clone();

        let Some(entry) = self.peers.get(&remote) else {
            return;
        };

        if entry.generation != event.generation() {
            debug!("Ignoring an event from an old connection to {remote}");
            return;
        }

        match event {
            PeerEvent::IceCandidate { candidate, .. } => {
                let message = SignalMessage {
                    from: self.local.clone(),
                    to: remote.clone(),
                    payload: SignalPayload::Candidate(candidate),
                };

                if let Err(error) = self.context.relay.send(&self.room_id, message).await {
                    warn!("Could not send a candidate to {remote}: {error}");
                }
            }
            PeerEvent::RemoteTrack { track, .. } => {
                info!("{} is receiving audio from {remote}", self.local);

                self.context.emit(SessionEvent::RemoteStream {
                    room_id: self.room_id.clone(),
                    user_id: self.local.clone(),
                    remote,
                    track,
                });
            }
            PeerEvent::StateChanged { state, .. } => self.transport_changed(&remote, state),
        }
    }

    fn transport_changed(&mut self, remote: &str, transport: TransportState) {
        match transport {
            TransportState::Connected => {
                let Some(entry) = self.peers.get_mut(remote) else {
                    return;
                };

                match entry.state.connect() {
                    Ok(state) if state != entry.state => {
                        entry.state = state;
                        info!("{} connected to {remote}", self.local);
                        self.emit_state(remote, state);
                    }
                    Ok(_) => {}
                    Err(error) => debug!("{error}"),
                }
            }
            TransportState::Failed => {
                warn!("Connection from {} to {remote} failed", self.local);
                self.fail(remote);
            }
            TransportState::Connecting | TransportState::Disconnected => {
                debug!("Transport to {remote} is {transport:?}");
            }
        }
    }

    fn open_entry(&mut self, remote: &str, role: NegotiationRole) {
        let generation = self.next_generation;
        self.next_generation += 1;

        let pending = self
            .orphans
            .remove(remote)
            .unwrap_or_else(|| CandidateQueue::new(self.context.config.candidate_queue_capacity));

        let setup = ConnectionSetup {
            local: self.local.clone(),
            remote: remote.to_string(),
            generation,
            ice_servers: self.context.config.ice_servers.clone(),
            events: self.events.clone(),
        };

        let connection = match self.context.media.create_connection(setup) {
            Ok(connection) => {
                if let Some(track) = &self.local_track {
                    if let Err(error) = connection.add_track(track) {
                        warn!("Could not attach local audio for {remote}: {error}");
                    }
                }

                Some(connection)
            }
            Err(error) => {
                // No audio for this pair, nothing else is affected
                warn!("Could not create a connection to {remote}: {error}");
                None
            }
        };

        debug!("{} opened a {role:?} entry for {remote}", self.local);

        // Replacing an entry drops, and so closes, the old connection
        self.peers.insert(
            remote.to_string(),
            PeerEntry::new(role, generation, connection, pending),
        );
    }

    async fn send_offer(&mut self, remote: &str) -> Result<(), MediaError> {
        let entry = self.entry_mut(remote)?;
        let connection = entry.connection.as_ref().ok_or(MediaError::Closed)?;

        let offer = connection.create_offer().await?;
        connection.set_local_description(offer.clone()).await?;
        entry.state = entry.state.negotiate().map_err(negotiation_error)?;

        self.send(remote, SignalPayload::Offer(offer)).await;
        Ok(())
    }

    async fn accept_offer(
        &mut self,
        remote: &str,
        offer: SessionDescription,
    ) -> Result<(), MediaError> {
        let needs_fresh_entry = match self.peers.get(remote) {
            None => true,
            // The remote rejoined and is negotiating from scratch
            Some(entry) => entry.has_remote_description || !entry.state.is_open(),
        };

        if needs_fresh_entry {
            let joined_at = self.peers.get(remote).and_then(|e| e.joined_at);
            self.open_entry(remote, NegotiationRole::Responder);

            if let Some(entry) = self.peers.get_mut(remote) {
                entry.joined_at = joined_at;
            }
        }

        let entry = self.entry_mut(remote)?;
        let connection = entry.connection.as_ref().ok_or(MediaError::Closed)?;

        connection.set_remote_description(offer).await?;
        entry.has_remote_description = true;
        entry.state = entry.state.negotiate().map_err(negotiation_error)?;

        let answer = connection.create_answer().await?;
        connection.set_local_description(answer.clone()).await?;

        let queued = entry.pending.drain();
        apply_candidates(connection.as_ref(), remote, queued).await;

        self.send(remote, SignalPayload::Answer(answer)).await;
        Ok(())
    }

    async fn accept_answer(
        &mut self,
        remote: &str,
        answer: SessionDescription,
    ) -> Result<(), MediaError> {
        let Some(entry) = self.peers.get_mut(remote) else {
            debug!("Ignoring an answer from {remote}, there is no connection to it");
            return Ok(());
        };

        if entry.role != NegotiationRole::Initiator || entry.has_remote_description {
            debug!("Ignoring an unexpected answer from {remote}");
            return Ok(());
        }

        let connection = entry.connection.as_ref().ok_or(MediaError::Closed)?;

        connection.set_remote_description(answer).await?;
        entry.has_remote_description = true;

        let queued = entry.pending.drain();
        apply_candidates(connection.as_ref(), remote, queued).await;

        Ok(())
    }

    async fn add_candidate(
        &mut self,
        remote: &str,
        candidate: IceCandidate,
    ) -> Result<(), MediaError> {
        let capacity = self.context.config.candidate_queue_capacity;

        let Some(entry) = self.peers.get_mut(remote) else {
            self.orphans
                .entry(remote.to_string())
                .or_insert_with(|| CandidateQueue::new(capacity))
                .push(candidate);
            return Ok(());
        };

        match &entry.connection {
            Some(connection) if entry.has_remote_description => {
                connection.add_ice_candidate(candidate).await
            }
            Some(_) => {
                entry.pending.push(candidate);
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn send(&self, remote: &str, payload: SignalPayload) {
        let message = SignalMessage {
            from: self.local.clone(),
            to: remote.to_string(),
            payload,
        };

        let kind = message.kind();

        if let Err(error) = self.context.relay.send(&self.room_id, message).await {
            warn!("Could not send {kind} to {remote}: {error}");
        }
    }

    /// Gives up on a remote without forgetting it, so it isn't retried
    fn fail(&mut self, remote: &str) {
        if let Some(entry) = self.peers.get_mut(remote) {
            if entry.state.is_open() {
                entry.close();
                self.emit_state(remote, PeerState::Closed);
            }
        }
    }

    fn entry_mut(&mut self, remote: &str) -> Result<&mut PeerEntry, MediaError> {
        self.peers.get_mut(remote).ok_or(MediaError::Closed)
    }

    fn emit_state(&self, remote: &str, state: PeerState) {
        self.context.emit(SessionEvent::PeerStateChanged {
            room_id: self.room_id.clone(),
            user_id: self.local.clone(),
            remote: remote.to_string(),
            state,
        });
    }
}

impl Drop for PeerMesh {
    fn drop(&mut self) {
        for (_, mut entry) in self.peers.drain() {
            entry.close();
        }
    }
}

async fn apply_candidates(
    connection: &dyn PeerConnection,
    remote: &str,
    candidates: Vec<IceCandidate>,
) {
    for candidate in candidates {
        if let Err(error) = connection.add_ice_candidate(candidate).await {
            warn!("Dropping a queued candidate from {remote}: {error}");
        }
    }
}

fn negotiation_error(error: InvalidTransition) -> MediaError {
    MediaError::Negotiation(error.to_string())
}

#[cfg(test)]
mod test {
    use tokio::sync::mpsc::unbounded_channel;
    use voiceroom_core::{PeerEventReceiver, Seat, SignalingRelay, Subscription};

    use super::*;
    use crate::{seats::test::profile, testing::Rig};

    fn present(uids: &[&str]) -> Vec<Participant> {
        uids.iter()
            .map(|uid| Participant::new(&profile(uid), Seat::Audience, 0))
            .collect()
    }

    struct Client {
        mesh: PeerMesh,
        events: PeerEventReceiver,
        signals: Subscription<Document<SignalMessage>>,
    }

    impl Client {
        fn new(rig: &Rig, local: &str) -> Self {
            let (sender, events) = unbounded_channel();

            Self {
                mesh: PeerMesh::new(&rig.context, "room", local, sender),
                events,
                signals: rig.relay.subscribe("room"),
            }
        }

        /// Handles everything that is waiting, returns true if anything was
        async fn pump(&mut self) -> bool {
            let mut worked = false;

            while let Ok(event) = self.events.try_recv() {
                self.mesh.handle_peer_event(event).await;
                worked = true;
            }

            while let Ok(signal) = self.signals.try_recv() {
                self.mesh.handle_signal(signal).await;
                worked = true;
            }

            worked
        }
    }

    async fn settle(clients: &mut [&mut Client]) {
        for _ in 0..50 {
            let mut worked = false;

            for client in clients.iter_mut() {
                worked |= client.pump().await;
            }

            if !worked {
                return;
            }
        }
    }

    #[tokio::test]
    async fn test_pair_negotiates_once() {
        let rig = Rig::new();
        let participants = present(&["alice", "bob"]);

        let mut alice = Client::new(&rig, "alice");
        let mut bob = Client::new(&rig, "bob");

        alice.mesh.reconcile(&participants).await;
        bob.mesh.reconcile(&participants).await;
        settle(&mut [&mut alice, &mut bob]).await;

        let stats = rig.media.stats();
        assert_eq!(stats.offers_created(), 1, "only the smaller identity offers");
        assert_eq!(stats.answers_created(), 1);
        assert_eq!(alice.mesh.state("bob"), Some(PeerState::Connected));
        assert_eq!(bob.mesh.state("alice"), Some(PeerState::Connected));
        assert_eq!(rig.relay.pending("room"), 0, "every signal is consumed");
    }

    #[tokio::test]
    async fn test_three_way_mesh_is_complete() {
        let rig = Rig::new();
        let participants = present(&["alice", "bob", "carol"]);

        let mut alice = Client::new(&rig, "alice");
        let mut bob = Client::new(&rig, "bob");
        let mut carol = Client::new(&rig, "carol");

        for client in [&mut alice, &mut bob, &mut carol] {
            client.mesh.reconcile(&participants).await;
        }

        settle(&mut [&mut alice, &mut bob, &mut carol]).await;

        for client in [&alice, &bob, &carol] {
            assert_eq!(client.mesh.connected_count(), 2);
        }

        assert_eq!(rig.media.stats().offers_created(), 3);
    }

    #[tokio::test]
    async fn test_departure_closes_connection() {
        let rig = Rig::new();

        let mut alice = Client::new(&rig, "alice");
        let mut bob = Client::new(&rig, "bob");

        let both = present(&["alice", "bob"]);
        alice.mesh.reconcile(&both).await;
        bob.mesh.reconcile(&both).await;
        settle(&mut [&mut alice, &mut bob]).await;

        alice.mesh.reconcile(&present(&["alice"])).await;

        assert_eq!(alice.mesh.state("bob"), None);
        assert_eq!(rig.media.stats().open_connections(), 1);

        drop(bob);
        assert_eq!(
            rig.media.stats().open_connections(),
            0,
            "dropping a mesh closes its connections"
        );
    }

    #[tokio::test]
    async fn test_early_candidates_are_buffered() {
        let rig = Rig::new();
        let mut bob = Client::new(&rig, "bob");

        let candidate = |n: usize| SignalMessage {
            from: "alice".to_string(),
            to: "bob".to_string(),
            payload: SignalPayload::Candidate(IceCandidate {
                candidate: format!("candidate:{n}"),
                sdp_mid: None,
                sdp_m_line_index: None,
            }),
        };

        // Candidates overtake the offer and even the room snapshot
        for n in 0..3 {
            rig.relay.send("room", candidate(n)).await.unwrap();
        }
        bob.pump().await;
        assert_eq!(rig.media.stats().candidates_applied(), 0);

        let offer = SignalMessage {
            from: "alice".to_string(),
            to: "bob".to_string(),
            payload: SignalPayload::Offer(SessionDescription {
                sdp: "offer".to_string(),
            }),
        };
        rig.relay.send("room", offer).await.unwrap();
        bob.pump().await;

        assert_eq!(
            rig.media.stats().candidates_applied(),
            3,
            "queued candidates are applied once the offer is in"
        );
        assert_eq!(bob.mesh.state("alice"), Some(PeerState::Negotiating));
    }

    #[tokio::test]
    async fn test_signals_for_others_are_left_alone() {
        let rig = Rig::new();
        let mut carol = Client::new(&rig, "carol");

        rig.relay
            .send(
                "room",
                SignalMessage {
                    from: "alice".to_string(),
                    to: "bob".to_string(),
                    payload: SignalPayload::Offer(SessionDescription {
                        sdp: "offer".to_string(),
                    }),
                },
            )
            .await
            .unwrap();

        carol.pump().await;

        assert!(carol.mesh.remotes().is_empty());
        assert_eq!(rig.relay.pending("room"), 1);
    }

    #[tokio::test]
    async fn test_rejoined_remote_replaces_entry() {
        let rig = Rig::new();
        let both = present(&["alice", "bob"]);

        let mut alice = Client::new(&rig, "alice");
        let mut bob = Client::new(&rig, "bob");
        alice.mesh.reconcile(&both).await;
        bob.mesh.reconcile(&both).await;
        settle(&mut [&mut alice, &mut bob]).await;

        // Alice comes back with a fresh mesh and offers again
        drop(alice);
        let mut alice = Client::new(&rig, "alice");
        while alice.signals.try_recv().is_ok() {}

        alice.mesh.reconcile(&both).await;
        settle(&mut [&mut alice, &mut bob]).await;

        assert_eq!(bob.mesh.state("alice"), Some(PeerState::Connected));
        assert_eq!(alice.mesh.state("bob"), Some(PeerState::Connected));
        assert_eq!(rig.media.stats().open_connections(), 2);
    }

    #[tokio::test]
    async fn test_rejoined_responder_gets_a_new_offer() {
        let rig = Rig::new();
        let both = present(&["alice", "bob"]);

        let mut alice = Client::new(&rig, "alice");
        let mut bob = Client::new(&rig, "bob");
        alice.mesh.reconcile(&both).await;
        bob.mesh.reconcile(&both).await;
        settle(&mut [&mut alice, &mut bob]).await;

        // Bob comes back without leaving, only his join time changes
        drop(bob);
        let mut bob = Client::new(&rig, "bob");

        let mut rejoined = present(&["alice", "bob"]);
        rejoined[1].joined_at = 1;

        bob.mesh.reconcile(&rejoined).await;
        alice.mesh.reconcile(&rejoined).await;
        settle(&mut [&mut alice, &mut bob]).await;

        assert_eq!(bob.mesh.state("alice"), Some(PeerState::Connected));
        assert_eq!(alice.mesh.state("bob"), Some(PeerState::Connected));
        assert_eq!(rig.media.stats().offers_created(), 2);
        assert_eq!(rig.media.stats().open_connections(), 2);
    }

    #[tokio::test]
    async fn test_candidates_from_strangers_are_dropped() {
        let rig = Rig::new();
        let mut bob = Client::new(&rig, "bob");

        rig.relay
            .send(
                "room",
                SignalMessage {
                    from: "mallory".to_string(),
                    to: "bob".to_string(),
                    payload: SignalPayload::Candidate(IceCandidate {
                        candidate: "candidate:0".to_string(),
                        sdp_mid: None,
                        sdp_m_line_index: None,
                    }),
                },
            )
            .await
            .unwrap();

        bob.pump().await;
        assert_eq!(bob.mesh.orphans.len(), 1);

        bob.mesh.reconcile(&present(&["bob"])).await;
        assert!(bob.mesh.orphans.is_empty());
    }
}
