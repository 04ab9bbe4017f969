use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::{
    Document, DocumentId, FeedEvent, Invite, RoomDocument, RoomUpdate, SignalMessage,
    UpdateRejected,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A live stream of values from a store. Dropping it unsubscribes.
pub type Subscription<T> = UnboundedReceiver<T>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// An unknown or internal error happened in the store
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A document doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
    /// The store refused a write
    #[error("Write rejected: {0}")]
    Rejected(#[from] UpdateRejected),
    /// The store could not be reached
    #[error("Store is unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn room_not_found(room_id: &str) -> Self {
        Self::NotFound {
            resource: "room",
            identifier: room_id.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// The shared document store holding room presence.
///
/// Subscriptions deliver full snapshots, never deltas, and may deliver the
/// same state more than once.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn room(&self, room_id: &str) -> StoreResult<RoomDocument>;
    /// Creates or replaces a room document
    async fn put_room(&self, room: RoomDocument) -> StoreResult<()>;
    /// Applies the updates atomically, in order
    async fn update_room(&self, room_id: &str, updates: Vec<RoomUpdate>) -> StoreResult<()>;
    async fn delete_room(&self, room_id: &str) -> StoreResult<()>;
    /// Streams the room document. [None] means the document was deleted.
    fn subscribe_room(&self, room_id: &str) -> Subscription<Option<RoomDocument>>;

    async fn create_invite(&self, room_id: &str, invite: Invite) -> StoreResult<DocumentId>;
    async fn delete_invite(&self, room_id: &str, invite_id: &str) -> StoreResult<()>;
    /// Streams every live invite addressed to the given user
    fn subscribe_invites(&self, room_id: &str, to: &str) -> Subscription<Vec<Document<Invite>>>;

    async fn append_feed(&self, room_id: &str, event: FeedEvent) -> StoreResult<DocumentId>;
    /// Streams the most recent feed events, oldest first
    fn subscribe_feed(&self, room_id: &str) -> Subscription<Vec<Document<FeedEvent>>>;
}

/// A per-room mailbox of negotiation messages.
///
/// Messages from one sender to one recipient are delivered in the order they
/// were sent, and stay in the mailbox until the recipient deletes them.
#[async_trait]
pub trait SignalingRelay: Send + Sync {
    async fn send(&self, room_id: &str, message: SignalMessage) -> StoreResult<DocumentId>;
    async fn delete(&self, room_id: &str, signal_id: &str) -> StoreResult<()>;
    /// Streams every message posted to the room, including messages addressed to others
    fn subscribe(&self, room_id: &str) -> Subscription<Document<SignalMessage>>;
}
