use thiserror::Error;
use voiceroom_core::{PeerConnection, Timestamp};

use super::CandidateQueue;

/// The lifecycle of a connection to one remote participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// The entry exists, nothing was exchanged yet
    New,
    /// An offer was sent or received
    Negotiating,
    /// The transport reported a working connection
    Connected,
    /// Torn down or failed. Closed entries are never reopened.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("A peer can't go from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: PeerState,
    pub to: PeerState,
}

impl PeerState {
    pub fn negotiate(self) -> Result<Self, InvalidTransition> {
        match self {
            PeerState::New => Ok(PeerState::Negotiating),
            from => Err(InvalidTransition {
                from,
                to: PeerState::Negotiating,
            }),
        }
    }

    /// Transports may report a connection more than once
    pub fn connect(self) -> Result<Self, InvalidTransition> {
        match self {
            PeerState::Negotiating | PeerState::Connected => Ok(PeerState::Connected),
            from => Err(InvalidTransition {
                from,
                to: PeerState::Connected,
            }),
        }
    }

    pub fn close(self) -> Self {
        PeerState::Closed
    }

    pub fn is_open(&self) -> bool {
        !matches!(self, PeerState::Closed)
    }
}

/// Which side of the offer/answer exchange the local user is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Initiator,
    Responder,
}

impl NegotiationRole {
    /// The smaller identity sends the offer, so every pair negotiates exactly once
    pub fn between(local: &str, remote: &str) -> Self {
        if local < remote {
            NegotiationRole::Initiator
        } else {
            NegotiationRole::Responder
        }
    }
}

pub(crate) struct PeerEntry {
    pub role: NegotiationRole,
    pub state: PeerState,
    pub generation: u64,
    pub connection: Option<Box<dyn PeerConnection>>,
    pub has_remote_description: bool,
    pub pending: CandidateQueue,
    /// The remote's join time in the last snapshot that showed it
    pub joined_at: Option<Timestamp>,
}

impl PeerEntry {
    pub fn new(
        role: NegotiationRole,
        generation: u64,
        connection: Option<Box<dyn PeerConnection>>,
        pending: CandidateQueue,
    ) -> Self {
        Self {
            role,
            state: if connection.is_some() {
                PeerState::New
            } else {
                PeerState::Closed
            },
            generation,
            connection,
            has_remote_description: false,
            pending,
            joined_at: None,
        }
    }

    pub fn close(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }

        self.state = self.state.close();
    }
}

impl Drop for PeerEntry {
    fn drop(&mut self) {
        self.close()
    }
}
