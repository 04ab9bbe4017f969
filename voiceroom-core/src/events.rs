use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::{AudioTrack, IceCandidate, UserId};

pub type PeerEventSender = UnboundedSender<PeerEvent>;
pub type PeerEventReceiver = UnboundedReceiver<PeerEvent>;

/// The transport-level state of a peer connection, as reported by the media engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

/// Describes the events a media engine emits for a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A local ICE candidate was gathered and should be sent to the remote.
    IceCandidate {
        remote: UserId,
        /// The connection generation the candidate belongs to.
        generation: u64,
        candidate: IceCandidate,
    },
    /// The remote started sending audio.
    RemoteTrack {
        remote: UserId,
        generation: u64,
        track: AudioTrack,
    },
    /// The transport state changed.
    StateChanged {
        remote: UserId,
        generation: u64,
        state: TransportState,
    },
}

impl PeerEvent {
    pub fn remote(&self) -> &UserId {
        match self {
            PeerEvent::IceCandidate { remote, .. } => remote,
            PeerEvent::RemoteTrack { remote, .. } => remote,
            PeerEvent::StateChanged { remote, .. } => remote,
        }
    }

    pub fn generation(&self) -> u64 {
        match self {
            PeerEvent::IceCandidate { generation, .. } => *generation,
            PeerEvent::RemoteTrack { generation, .. } => *generation,
            PeerEvent::StateChanged { generation, .. } => *generation,
        }
    }
}
