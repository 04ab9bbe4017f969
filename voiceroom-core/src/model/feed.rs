use serde::{Deserialize, Serialize};

use crate::{DocumentId, Seat, Timestamp, UserId};

/// An entry of a room sub-collection, together with its store-assigned id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document<T> {
    pub id: DocumentId,
    pub data: T,
}

/// An invitation to take a seat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub to: UserId,
    pub from: UserId,
    pub from_name: String,
    pub seat_index: Seat,
}

/// A gift sent in a room
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Gift {
    pub gift_id: String,
    pub name: String,
    /// The animation played by every client when the gift is sent
    pub animation_url: String,
    pub value: u32,
    pub recipient: Option<UserId>,
}

/// An append-only event in the room feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedEvent {
    #[serde(rename_all = "camelCase")]
    User {
        sender: UserId,
        sender_name: String,
        text: String,
        timestamp: Timestamp,
    },
    System { text: String, timestamp: Timestamp },
    #[serde(rename_all = "camelCase")]
    Gift {
        sender: UserId,
        sender_name: String,
        gift: Gift,
        timestamp: Timestamp,
    },
}

impl FeedEvent {
    pub fn timestamp(&self) -> Timestamp {
        match self {
            FeedEvent::User { timestamp, .. } => *timestamp,
            FeedEvent::System { timestamp, .. } => *timestamp,
            FeedEvent::Gift { timestamp, .. } => *timestamp,
        }
    }
}
