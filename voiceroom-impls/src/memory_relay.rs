use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use voiceroom_core::{
    document_id, Document, DocumentId, RoomId, SignalMessage, SignalingRelay, StoreError,
    StoreResult, Subscription,
};

/// A signaling mailbox kept in memory.
///
/// Messages stay in the mailbox until deleted. New subscribers receive
/// every pending message first, in the order they were sent.
#[derive(Default)]
pub struct MemorySignalingRelay {
    rooms: DashMap<RoomId, Mailbox>,
}

#[derive(Default)]
struct Mailbox {
    messages: Vec<Document<SignalMessage>>,
    watchers: Vec<UnboundedSender<Document<SignalMessage>>>,
}

impl MemorySignalingRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many messages are waiting in a room's mailbox
    pub fn pending(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|m| m.messages.len())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SignalingRelay for MemorySignalingRelay {
    async fn send(&self, room_id: &str, message: SignalMessage) -> StoreResult<DocumentId> {
        let mut mailbox = self.rooms.entry(room_id.to_string()).or_default();

        let document = Document {
            id: document_id(),
            data: message,
        };

        mailbox
            .watchers
            .retain(|w| w.send(document.clone()).is_ok());
        mailbox.messages.push(document.clone());

        Ok(document.id)
    }

    async fn delete(&self, room_id: &str, signal_id: &str) -> StoreResult<()> {
        let mut mailbox = self.rooms.get_mut(room_id).ok_or_else(|| StoreError::NotFound {
            resource: "mailbox",
            identifier: room_id.to_string(),
        })?;

        mailbox.messages.retain(|m| m.id != signal_id);
        Ok(())
    }

    fn subscribe(&self, room_id: &str) -> Subscription<Document<SignalMessage>> {
        let (sender, receiver) = unbounded_channel();
        let mut mailbox = self.rooms.entry(room_id.to_string()).or_default();

        let delivered = mailbox
            .messages
            .iter()
            .all(|m| sender.send(m.clone()).is_ok());

        if delivered {
            mailbox.watchers.push(sender);
        }

        receiver
    }
}

#[cfg(test)]
mod test {
    use voiceroom_core::{SessionDescription, SignalPayload};

    use super::*;

    fn offer(from: &str, to: &str, sdp: &str) -> SignalMessage {
        SignalMessage {
            from: from.to_string(),
            to: to.to_string(),
            payload: SignalPayload::Offer(SessionDescription {
                sdp: sdp.to_string(),
            }),
        }
    }

    #[tokio::test]
    async fn test_pending_messages_are_replayed_in_order() {
        let relay = MemorySignalingRelay::new();

        relay.send("room", offer("a", "b", "first")).await.unwrap();
        relay.send("room", offer("a", "b", "second")).await.unwrap();

        let mut subscription = relay.subscribe("room");

        let first = subscription.recv().await.unwrap();
        let second = subscription.recv().await.unwrap();

        assert_eq!(first.data, offer("a", "b", "first"));
        assert_eq!(second.data, offer("a", "b", "second"));
    }

    #[tokio::test]
    async fn test_deleted_messages_are_gone() {
        let relay = MemorySignalingRelay::new();

        let id = relay.send("room", offer("a", "b", "sdp")).await.unwrap();
        assert_eq!(relay.pending("room"), 1);

        relay.delete("room", &id).await.unwrap();
        assert_eq!(relay.pending("room"), 0);
    }
}
