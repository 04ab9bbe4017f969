use serde::{Deserialize, Serialize};

use crate::UserId;

/// An SDP blob produced by the media engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

/// A single ICE candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// The negotiation payload of a signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

/// A point-to-point negotiation message carried by the signaling relay.
/// It is consumed by its recipient exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalMessage {
    pub from: UserId,
    pub to: UserId,
    #[serde(flatten)]
    pub payload: SignalPayload,
}

impl SignalMessage {
    pub fn kind(&self) -> &'static str {
        match self.payload {
            SignalPayload::Offer(_) => "offer",
            SignalPayload::Answer(_) => "answer",
            SignalPayload::Candidate(_) => "candidate",
        }
    }
}

/// ICE server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    /// Public STUN servers. There is no relay fallback.
    pub fn default_stun() -> Vec<Self> {
        vec![
            Self {
                urls: vec!["stun:stun.l.google.com:19302".into()],
                username: None,
                credential: None,
            },
            Self {
                urls: vec!["stun:stun1.l.google.com:19302".into()],
                username: None,
                credential: None,
            },
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_signal_wire_shape() {
        let message = SignalMessage {
            from: "alice".to_string(),
            to: "bob".to_string(),
            payload: SignalPayload::Offer(SessionDescription {
                sdp: "v=0".to_string(),
            }),
        };

        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["type"], "offer");
        assert_eq!(value["from"], "alice");
        assert_eq!(value["payload"]["sdp"], "v=0");
        assert_eq!(message.kind(), "offer");
    }
}
