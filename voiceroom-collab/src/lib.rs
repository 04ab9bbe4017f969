mod animation;
mod authority;
mod directory;
mod events;
mod mesh;
mod music;
mod seats;
mod session;

use std::sync::Arc;

pub use animation::*;
pub use authority::*;
pub use directory::*;
pub use events::*;
pub use mesh::*;
pub use music::*;
pub use seats::*;
pub use session::*;

use crossbeam::channel::unbounded;
use voiceroom_core::{
    Billing, Clock, Config, MediaEngine, MediaUploader, PresenceStore, PushDispatcher,
    SignalingRelay, Timestamp,
};

/// The collaborators a room session talks to
pub struct Ports {
    pub store: Arc<dyn PresenceStore>,
    pub relay: Arc<dyn SignalingRelay>,
    pub media: Arc<dyn MediaEngine>,
    pub push: Arc<dyn PushDispatcher>,
    pub uploader: Arc<dyn MediaUploader>,
    pub billing: Arc<dyn Billing>,
    pub clock: Arc<dyn Clock>,
}

/// A type passed to every component of a session, to reach the outside world and emit events.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn PresenceStore>,
    pub relay: Arc<dyn SignalingRelay>,
    pub media: Arc<dyn MediaEngine>,
    pub push: Arc<dyn PushDispatcher>,
    pub uploader: Arc<dyn MediaUploader>,
    pub billing: Arc<dyn Billing>,
    pub clock: Arc<dyn Clock>,

    event_sender: EventSender,
}

impl SessionContext {
    /// Creates a context and the receiving end of its event channel
    pub fn new(config: Config, ports: Ports) -> (Self, EventReceiver) {
        let (event_sender, event_receiver) = unbounded();

        let context = Self {
            config: Arc::new(config),
            store: ports.store,
            relay: ports.relay,
            media: ports.media,
            push: ports.push,
            uploader: ports.uploader,
            billing: ports.billing,
            clock: ports.clock,
            event_sender,
        };

        (context, event_receiver)
    }

    pub fn emit(&self, event: SessionEvent) {
        // Nobody listening is fine
        self.event_sender.send(event).ok();
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::{sync::Arc, time::Duration};

    use voiceroom_core::{Config, ManualClock, NewRoom, PresenceStore, RoomDocument};
    use voiceroom_impls::{
        LoopbackMedia, MemoryPresenceStore, MemoryPushDispatcher, MemorySignalingRelay,
        MemoryUploader, PrepaidBilling,
    };

    use crate::{EventReceiver, Ports, SessionContext, SessionEvent};

    /// An in-memory world for sessions to run in
    pub struct Rig {
        pub context: SessionContext,
        pub events: EventReceiver,
        pub store: Arc<MemoryPresenceStore>,
        pub relay: Arc<MemorySignalingRelay>,
        pub media: Arc<LoopbackMedia>,
        pub push: Arc<MemoryPushDispatcher>,
        pub uploader: Arc<MemoryUploader>,
        pub billing: Arc<PrepaidBilling>,
        pub clock: Arc<ManualClock>,
    }

    /// The epoch the manual clock starts at
    pub const START: i64 = 1_700_000_000_000;

    impl Rig {
        pub fn new() -> Self {
            Self::with_config(Config::default())
        }

        pub fn with_config(config: Config) -> Self {
            let store = Arc::new(MemoryPresenceStore::new());
            let relay = Arc::new(MemorySignalingRelay::new());
            let clock = Arc::new(ManualClock::new(START));
            let media = Arc::new(LoopbackMedia::new(clock.clone()));
            let push = Arc::new(MemoryPushDispatcher::new());
            let uploader = Arc::new(MemoryUploader::new("https://cdn.test"));
            let billing = Arc::new(PrepaidBilling::new());

            let (context, events) = SessionContext::new(
                config,
                Ports {
                    store: store.clone(),
                    relay: relay.clone(),
                    media: media.clone(),
                    push: push.clone(),
                    uploader: uploader.clone(),
                    billing: billing.clone(),
                    clock: clock.clone(),
                },
            );

            Self {
                context,
                events,
                store,
                relay,
                media,
                push,
                uploader,
                billing,
                clock,
            }
        }

        /// Creates an active room owned by `host`
        pub async fn room(&self, room_id: &str, host: &str) -> RoomDocument {
            let room = RoomDocument::new(
                room_id.to_string(),
                NewRoom {
                    name: "Test room".to_string(),
                    created_by: host.to_string(),
                    background_image: None,
                    password: None,
                    is_paid_call: false,
                    call_rate_per_minute: None,
                },
            );

            self.store.put_room(room.clone()).await.unwrap();
            room
        }

        /// Polls until the store's copy of the room satisfies the check
        pub async fn wait_for_room(&self, room_id: &str, check: impl Fn(&RoomDocument) -> bool) {
            for _ in 0..200 {
                if let Ok(room) = self.store.room(room_id).await {
                    if check(&room) {
                        return;
                    }
                }

                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            panic!("room {room_id} never reached the expected state");
        }

        /// Polls the event channel until an event matches
        pub async fn wait_for_event(
            &self,
            matches: impl Fn(&SessionEvent) -> bool,
        ) -> SessionEvent {
            for _ in 0..200 {
                while let Ok(event) = self.events.try_recv() {
                    if matches(&event) {
                        return event;
                    }
                }

                tokio::time::sleep(Duration::from_millis(10)).await;
            }

            panic!("the expected event never arrived");
        }
    }
}
