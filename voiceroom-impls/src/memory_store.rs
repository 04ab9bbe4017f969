use async_trait::async_trait;
use dashmap::DashMap;
use log::debug;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use voiceroom_core::{
    document_id, Document, DocumentId, FeedEvent, Invite, PresenceStore, RoomDocument, RoomId,
    RoomUpdate, StoreError, StoreResult, Subscription,
};

use crate::util::broadcast;

/// How many feed events a feed snapshot contains
const FEED_WINDOW: usize = 50;

/// A presence store kept in memory, shared by every client holding it.
///
/// Writes to a room are applied under that room's lock, so every batch of
/// updates is atomic and every subscriber sees snapshots in write order.
#[derive(Default)]
pub struct MemoryPresenceStore {
    rooms: DashMap<RoomId, RoomEntry>,
}

#[derive(Default)]
struct RoomEntry {
    document: Option<RoomDocument>,
    watchers: Vec<UnboundedSender<Option<RoomDocument>>>,

    invites: Vec<Document<Invite>>,
    invite_watchers: Vec<(String, UnboundedSender<Vec<Document<Invite>>>)>,

    feed: Vec<Document<FeedEvent>>,
    feed_watchers: Vec<UnboundedSender<Vec<Document<FeedEvent>>>>,
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RoomEntry {
    fn notify_room(&mut self) {
        let snapshot = self.document.clone();
        broadcast(&mut self.watchers, &snapshot);
    }

    fn notify_invites(&mut self) {
        let invites = &self.invites;

        self.invite_watchers.retain(|(to, sender)| {
            let addressed: Vec<_> = invites
                .iter()
                .filter(|i| &i.data.to == to)
                .cloned()
                .collect();

            sender.send(addressed).is_ok()
        });
    }

    fn feed_window(&self) -> Vec<Document<FeedEvent>> {
        let start = self.feed.len().saturating_sub(FEED_WINDOW);
        self.feed[start..].to_vec()
    }

    fn notify_feed(&mut self) {
        let window = self.feed_window();
        broadcast(&mut self.feed_watchers, &window);
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn room(&self, room_id: &str) -> StoreResult<RoomDocument> {
        self.rooms
            .get(room_id)
            .and_then(|entry| entry.document.clone())
            .ok_or_else(|| StoreError::room_not_found(room_id))
    }

    async fn put_room(&self, room: RoomDocument) -> StoreResult<()> {
        let mut entry = self.rooms.entry(room.id.clone()).or_default();

        debug!("Room {} written", room.id);
        entry.document = Some(room);
        entry.notify_room();

        Ok(())
    }

    async fn update_room(&self, room_id: &str, updates: Vec<RoomUpdate>) -> StoreResult<()> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::room_not_found(room_id))?;

        let document = entry
            .document
            .as_ref()
            .ok_or_else(|| StoreError::room_not_found(room_id))?;

        // Apply to a copy so a rejected update leaves nothing behind
        let mut updated = document.clone();
        for update in &updates {
            update.apply(&mut updated)?;
        }

        entry.document = Some(updated);
        entry.notify_room();

        Ok(())
    }

    async fn delete_room(&self, room_id: &str) -> StoreResult<()> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::room_not_found(room_id))?;

        entry.document = None;
        entry.invites.clear();
        entry.notify_room();

        Ok(())
    }

    fn subscribe_room(&self, room_id: &str) -> Subscription<Option<RoomDocument>> {
        let (sender, receiver) = unbounded_channel();
        let mut entry = self.rooms.entry(room_id.to_string()).or_default();

        // Like hosted stores, the current state is delivered right away
        if sender.send(entry.document.clone()).is_ok() {
            entry.watchers.push(sender);
        }

        receiver
    }

    async fn create_invite(&self, room_id: &str, invite: Invite) -> StoreResult<DocumentId> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::room_not_found(room_id))?;

        let id = document_id();
        entry.invites.push(Document {
            id: id.clone(),
            data: invite,
        });
        entry.notify_invites();

        Ok(id)
    }

    async fn delete_invite(&self, room_id: &str, invite_id: &str) -> StoreResult<()> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::room_not_found(room_id))?;

        let before = entry.invites.len();
        entry.invites.retain(|i| i.id != invite_id);

        if entry.invites.len() == before {
            return Err(StoreError::NotFound {
                resource: "invite",
                identifier: invite_id.to_string(),
            });
        }

        entry.notify_invites();
        Ok(())
    }

    fn subscribe_invites(&self, room_id: &str, to: &str) -> Subscription<Vec<Document<Invite>>> {
        let (sender, receiver) = unbounded_channel();
        let mut entry = self.rooms.entry(room_id.to_string()).or_default();

        let current: Vec<_> = entry
            .invites
            .iter()
            .filter(|i| i.data.to == to)
            .cloned()
            .collect();

        if sender.send(current).is_ok() {
            entry.invite_watchers.push((to.to_string(), sender));
        }

        receiver
    }

    async fn append_feed(&self, room_id: &str, event: FeedEvent) -> StoreResult<DocumentId> {
        let mut entry = self
            .rooms
            .get_mut(room_id)
            .ok_or_else(|| StoreError::room_not_found(room_id))?;

        let id = document_id();
        entry.feed.push(Document {
            id: id.clone(),
            data: event,
        });
        entry.notify_feed();

        Ok(id)
    }

    fn subscribe_feed(&self, room_id: &str) -> Subscription<Vec<Document<FeedEvent>>> {
        let (sender, receiver) = unbounded_channel();
        let mut entry = self.rooms.entry(room_id.to_string()).or_default();

        if sender.send(entry.feed_window()).is_ok() {
            entry.feed_watchers.push(sender);
        }

        receiver
    }
}
