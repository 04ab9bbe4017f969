use std::sync::Arc;

use async_trait::async_trait;
use crossbeam::atomic::AtomicCell;
use thiserror::Error;

use crate::{IceCandidate, IceServer, PeerEventSender, SessionDescription, UserId};

#[derive(Debug, Clone, Error)]
pub enum MediaError {
    #[error("Microphone permission was denied")]
    PermissionDenied,
    #[error("Media device is unavailable: {0}")]
    Unavailable(String),
    #[error("Negotiation failed: {0}")]
    Negotiation(String),
    #[error("Connection is closed")]
    Closed,
}

/// A handle to an audio track, local or remote.
/// Clones share the enabled flag.
#[derive(Debug, Clone)]
pub struct AudioTrack {
    pub id: String,
    /// Whose voice this track carries
    pub owner: UserId,
    enabled: Arc<AtomicCell<bool>>,
}

impl AudioTrack {
    pub fn new(id: impl Into<String>, owner: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            enabled: Arc::new(AtomicCell::new(true)),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load()
    }
}

/// Everything a media engine needs to create a connection to one remote
#[derive(Debug, Clone)]
pub struct ConnectionSetup {
    pub local: UserId,
    pub remote: UserId,
    /// Distinguishes this connection from earlier ones to the same remote
    pub generation: u64,
    pub ice_servers: Vec<IceServer>,
    /// Where the connection reports candidates, tracks, and state changes
    pub events: PeerEventSender,
}

/// The browser-style real-time transport primitives
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Acquires the local microphone
    async fn capture_microphone(&self, owner: &str) -> Result<AudioTrack, MediaError>;

    fn create_connection(
        &self,
        setup: ConnectionSetup,
    ) -> Result<Box<dyn PeerConnection>, MediaError>;

    /// Creates the local element the shared music plays through
    fn music_player(&self) -> Box<dyn MusicPlayer>;
}

/// One negotiated media connection to a remote participant
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn add_track(&self, track: &AudioTrack) -> Result<(), MediaError>;
    async fn create_offer(&self) -> Result<SessionDescription, MediaError>;
    async fn create_answer(&self) -> Result<SessionDescription, MediaError>;
    async fn set_local_description(&self, description: SessionDescription)
        -> Result<(), MediaError>;
    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), MediaError>;
    /// Fails if no remote description has been set yet
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), MediaError>;
    fn close(&self);
}

/// A local audio element playing the room's shared music
pub trait MusicPlayer: Send + Sync {
    /// The URL currently loaded, if any
    fn source(&self) -> Option<String>;
    /// Loads a new URL, paused at the start
    fn load(&self, url: &str);
    fn play(&self);
    fn pause(&self);
    /// Moves the playhead, in seconds
    fn seek(&self, position: f64);
    /// Unloads the current URL
    fn stop(&self);
    /// The playhead, in seconds
    fn position(&self) -> f64;
    fn is_playing(&self) -> bool;
    /// Returns true once the loaded media played to its end
    fn has_ended(&self) -> bool;
}
