use std::sync::Arc;

use async_trait::async_trait;
use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use parking_lot::Mutex;
use voiceroom_core::{
    AudioTrack, Clock, ConnectionSetup, IceCandidate, MediaEngine, MediaError, MusicPlayer,
    PeerConnection, PeerEvent, SessionDescription, TransportState,
};

use crate::ClockedPlayer;

/// How many candidates each side "gathers"
const CANDIDATES_PER_CONNECTION: u16 = 2;

/// A media engine that negotiates without any network.
///
/// Descriptions are opaque strings and a connection counts as established
/// once both its local and remote descriptions are set, which is enough to
/// drive the signaling and mesh logic end to end.
pub struct LoopbackMedia {
    clock: Arc<dyn Clock>,
    track_lengths: Arc<DashMap<String, f64>>,
    microphone_allowed: AtomicCell<bool>,
    stats: Arc<LoopbackStats>,
}

/// Counters shared by every connection of a [LoopbackMedia]
#[derive(Debug, Default)]
pub struct LoopbackStats {
    offers_created: AtomicCell<usize>,
    answers_created: AtomicCell<usize>,
    open_connections: AtomicCell<usize>,
    candidates_applied: AtomicCell<usize>,
}

struct LoopbackConnection {
    setup: ConnectionSetup,
    stats: Arc<LoopbackStats>,
    state: Mutex<ConnectionState>,
}

#[derive(Default)]
struct ConnectionState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    tracks: Vec<AudioTrack>,
    connected: bool,
    closed: bool,
}

impl LoopbackMedia {
    /// Music players created by this engine keep time on `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            track_lengths: Default::default(),
            microphone_allowed: true.into(),
            stats: Default::default(),
        }
    }

    /// Makes microphone capture fail as if permission was denied
    pub fn deny_microphone(&self) {
        self.microphone_allowed.store(false);
    }

    /// Makes every music player of this engine end `url` after `seconds`
    pub fn set_track_length(&self, url: &str, seconds: f64) {
        self.track_lengths.insert(url.to_string(), seconds);
    }

    pub fn stats(&self) -> Arc<LoopbackStats> {
        self.stats.clone()
    }
}

impl LoopbackStats {
    pub fn offers_created(&self) -> usize {
        self.offers_created.load()
    }

    pub fn answers_created(&self) -> usize {
        self.answers_created.load()
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load()
    }

    pub fn candidates_applied(&self) -> usize {
        self.candidates_applied.load()
    }
}

#[async_trait]
impl MediaEngine for LoopbackMedia {
    async fn capture_microphone(&self, owner: &str) -> Result<AudioTrack, MediaError> {
        if !self.microphone_allowed.load() {
            return Err(MediaError::PermissionDenied);
        }

        Ok(AudioTrack::new(format!("{owner}-microphone"), owner))
    }

    fn create_connection(
        &self,
        setup: ConnectionSetup,
    ) -> Result<Box<dyn PeerConnection>, MediaError> {
        self.stats.open_connections.fetch_add(1);

        Ok(Box::new(LoopbackConnection {
            setup,
            stats: self.stats.clone(),
            state: Default::default(),
        }))
    }

    fn music_player(&self) -> Box<dyn MusicPlayer> {
        Box::new(ClockedPlayer::with_lengths(
            self.clock.clone(),
            self.track_lengths.clone(),
        ))
    }
}

impl LoopbackConnection {
    fn description(&self, kind: &str) -> SessionDescription {
        SessionDescription {
            sdp: format!(
                "{kind} {} -> {} #{}",
                self.setup.local, self.setup.remote, self.setup.generation
            ),
        }
    }

    fn emit(&self, event: PeerEvent) {
        // The receiving session may already be gone
        self.setup.events.send(event).ok();
    }

    fn gather_candidates(&self) {
        for index in 0..CANDIDATES_PER_CONNECTION {
            self.emit(PeerEvent::IceCandidate {
                remote: self.setup.remote.clone(),
                generation: self.setup.generation,
                candidate: IceCandidate {
                    candidate: format!(
                        "candidate:{index} 1 udp 2130706431 127.0.0.1 {} typ host",
                        50_000 + index
                    ),
                    sdp_mid: Some("0".to_string()),
                    sdp_m_line_index: Some(0),
                },
            });
        }
    }

    fn connect_if_negotiated(&self, state: &mut ConnectionState) {
        if state.connected || state.local.is_none() || state.remote.is_none() {
            return;
        }

        state.connected = true;

        self.emit(PeerEvent::StateChanged {
            remote: self.setup.remote.clone(),
            generation: self.setup.generation,
            state: TransportState::Connected,
        });

        self.emit(PeerEvent::RemoteTrack {
            remote: self.setup.remote.clone(),
            generation: self.setup.generation,
            track: AudioTrack::new(
                format!("{}-microphone", self.setup.remote),
                self.setup.remote.clone(),
            ),
        });
    }

    fn ensure_open(state: &ConnectionState) -> Result<(), MediaError> {
        if state.closed {
            Err(MediaError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerConnection for LoopbackConnection {
    fn add_track(&self, track: &AudioTrack) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        state.tracks.push(track.clone());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, MediaError> {
        Self::ensure_open(&self.state.lock())?;

        self.stats.offers_created.fetch_add(1);
        Ok(self.description("offer"))
    }

    async fn create_answer(&self) -> Result<SessionDescription, MediaError> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;

        if state.remote.is_none() {
            return Err(MediaError::Negotiation(
                "cannot answer without a remote offer".to_string(),
            ));
        }

        self.stats.answers_created.fetch_add(1);
        Ok(self.description("answer"))
    }

    async fn set_local_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        state.local = Some(description);
        self.gather_candidates();
        self.connect_if_negotiated(&mut state);

        Ok(())
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError> {
        let mut state = self.state.lock();
        Self::ensure_open(&state)?;

        state.remote = Some(description);
        self.connect_if_negotiated(&mut state);

        Ok(())
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<(), MediaError> {
        let state = self.state.lock();
        Self::ensure_open(&state)?;

        if state.remote.is_none() {
            return Err(MediaError::Negotiation(
                "remote description is not set".to_string(),
            ));
        }

        self.stats.candidates_applied.fetch_add(1);
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();

        if !state.closed {
            state.closed = true;
            self.stats.open_connections.fetch_sub(1);
        }
    }
}

impl Drop for LoopbackConnection {
    fn drop(&mut self) {
        self.close()
    }
}
