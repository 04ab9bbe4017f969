use std::{env, sync::Arc, thread, time::Duration};

use anyhow::{bail, Context};
use futures_util::future::join_all;
use log::{debug, info, warn};
use voiceroom_collab::{
    EventReceiver, Ports, RoomDirectory, RoomSession, SessionContext, SessionEvent,
};
use voiceroom_core::{
    Config, Gift, MediaUploader, NewRoom, PresenceStore, Profile, PushDispatcher, Song,
    SystemClock,
};
use voiceroom_impls::{
    HttpPushDispatcher, HttpUploader, LoopbackMedia, MemoryPresenceStore, MemoryPushDispatcher,
    MemorySignalingRelay, MemoryUploader, PrepaidBilling,
};

use crate::VoiceroomError;

/// The knobs of a simulated room
#[derive(Debug, Clone)]
pub struct Settings {
    pub guests: usize,
    pub duration: Duration,
    pub config: Config,
    pub push_endpoint: Option<String>,
    pub upload_endpoint: Option<String>,
}

impl Settings {
    /// Reads `VOICEROOM_*` overrides on top of the defaults
    pub fn from_env() -> Result<Self, VoiceroomError> {
        let mut config = Config::default();

        if let Some(seats) = parse_var::<u8>("VOICEROOM_SEAT_COUNT")? {
            config.seat_count = seats;
        }

        if let Some(heartbeat) = parse_var::<f32>("VOICEROOM_HEARTBEAT_IN_SECONDS")? {
            config.heartbeat_interval_in_seconds = heartbeat;
        }

        if let Some(billing) = parse_var::<f32>("VOICEROOM_BILLING_INTERVAL_IN_SECONDS")? {
            config.billing_interval_in_seconds = billing;
        }

        Ok(Self {
            guests: parse_var("VOICEROOM_GUESTS")?.unwrap_or(3),
            duration: Duration::from_secs(parse_var("VOICEROOM_DURATION_IN_SECONDS")?.unwrap_or(5)),
            config,
            push_endpoint: env::var("VOICEROOM_PUSH_ENDPOINT").ok(),
            upload_endpoint: env::var("VOICEROOM_UPLOAD_ENDPOINT").ok(),
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, VoiceroomError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| VoiceroomError::InvalidVariable { name, value }),
        Err(_) => Ok(None),
    }
}

/// Runs a room with a host and a few guests, all in this process
pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let clock = Arc::new(SystemClock);

    let push: Arc<dyn PushDispatcher> = match &settings.push_endpoint {
        Some(endpoint) => Arc::new(HttpPushDispatcher::new(endpoint)),
        None => Arc::new(MemoryPushDispatcher::new()),
    };

    let uploader: Arc<dyn MediaUploader> = match &settings.upload_endpoint {
        Some(endpoint) => Arc::new(HttpUploader::new(endpoint)),
        None => Arc::new(MemoryUploader::new("https://media.voiceroom.local")),
    };

    let store = Arc::new(MemoryPresenceStore::new());

    let (context, events) = SessionContext::new(
        settings.config.clone(),
        Ports {
            store: store.clone(),
            relay: Arc::new(MemorySignalingRelay::new()),
            media: Arc::new(LoopbackMedia::new(clock.clone())),
            push,
            uploader,
            billing: Arc::new(PrepaidBilling::new()),
            clock,
        },
    );

    thread::spawn(move || log_events(events));

    let directory = RoomDirectory::new(&context);

    let room = directory
        .create_room(NewRoom {
            name: "Simulated room".to_string(),
            created_by: "host".to_string(),
            background_image: None,
            password: None,
            is_paid_call: false,
            call_rate_per_minute: None,
        })
        .await
        .context("Could not create the room")?;

    let host = directory.join(&room.id, profile("host", "Host")).await?;

    let joins = (0..settings.guests).map(|i| {
        let uid = format!("guest-{i}");
        let name = format!("Guest {}", i + 1);

        directory.join(&room.id, profile(&uid, &name))
    });

    let mut guests = vec![];

    for result in join_all(joins).await {
        match result {
            Ok(session) => guests.push(session),
            Err(error) => warn!("A guest could not join: {error}"),
        }
    }

    if guests.is_empty() && settings.guests > 0 {
        bail!("No guest could join {}", room.id);
    }

    // Let every driver see everyone else before acting on the snapshot
    tokio::time::sleep(Duration::from_millis(200)).await;

    host.toggle_mute().await?;

    if let Some(guest) = guests.first() {
        seat_guest(&store, &host, guest).await?;
    }

    host.enqueue(Song {
        id: "opening".to_string(),
        url: "https://media.voiceroom.local/opening.mp3".to_string(),
        name: "Opening".to_string(),
        artist: None,
        duration: Some(settings.duration.as_secs_f32() / 2.),
        added_by: host.user_id().to_string(),
        added_by_name: "Host".to_string(),
    })
    .await?;

    for guest in &guests {
        guest.send_message("hello everyone").await?;
    }

    if let Some(guest) = guests.last() {
        guest
            .send_gift(Gift {
                gift_id: "rose".to_string(),
                name: "Rose".to_string(),
                animation_url: "https://media.voiceroom.local/rose.json".to_string(),
                value: 10,
                recipient: Some(host.user_id().to_string()),
            })
            .await?;
    }

    info!(
        "{} people in {}, running for {:?}",
        directory.list_live().len(),
        room.id,
        settings.duration
    );

    tokio::time::sleep(settings.duration).await;

    for guest in &guests {
        directory.leave(&room.id, guest.user_id()).await?;
    }

    directory.leave(&room.id, host.user_id()).await?;

    let room = store.room(&room.id).await?;
    info!("Room {} is over, active: {}", room.id, room.active);

    Ok(())
}

/// Invites a guest to the first free speaker seat and accepts on their behalf
async fn seat_guest(
    store: &MemoryPresenceStore,
    host: &RoomSession,
    guest: &RoomSession,
) -> anyhow::Result<()> {
    let Some(seat) = host.seat_map().first_free() else {
        bail!("Every speaker seat in {} is taken", host.room_id());
    };

    let mut invites = store.subscribe_invites(host.room_id(), guest.user_id());
    host.invite(guest.user_id(), seat).await?;

    while let Some(pending) = invites.recv().await {
        if let Some(invite) = pending.first() {
            guest.accept_invite(invite).await?;
            guest.toggle_mute().await.ok();

            return Ok(());
        }
    }

    bail!("The invite for {} never arrived", guest.user_id())
}

fn profile(uid: &str, display_name: &str) -> Profile {
    Profile {
        uid: uid.to_string(),
        display_name: display_name.to_string(),
        photo_url: None,
        frame_url: None,
    }
}

fn log_events(events: EventReceiver) {
    for event in events {
        match event {
            SessionEvent::Joined { room_id, user_id } => info!("{user_id} is in {room_id}"),
            SessionEvent::PeerStateChanged {
                user_id,
                remote,
                state,
                ..
            } => info!("{user_id} <-> {remote}: {state:?}"),
            SessionEvent::AnimationStarted {
                user_id,
                sender_name,
                gift,
                ..
            } => info!("{user_id} sees {sender_name} send {}", gift.name),
            SessionEvent::MusicCorrected {
                user_id, position, ..
            } => info!("{user_id} jumped to {position:.1}s"),
            SessionEvent::SessionEnded {
                user_id, reason, ..
            } => info!("{user_id} is out: {reason:?}"),
            other => debug!("{} got {:?}", other.user_id(), other),
        }
    }
}
