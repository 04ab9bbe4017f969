use std::time::Duration;

use voiceroom_core::{Config, Gift, NewRoom, PresenceStore, RoomDocument, Seat, Song, Upload};

use super::*;
use crate::{
    music::test::song,
    seats::test::{profile, room},
    testing::Rig,
    PeerState, SeatState,
};

async fn until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    panic!("condition never became true");
}

fn gift() -> Gift {
    Gift {
        gift_id: "rose".to_string(),
        name: "Rose".to_string(),
        animation_url: "https://cdn.test/rose.json".to_string(),
        value: 10,
        recipient: Some("host".to_string()),
    }
}

#[tokio::test]
async fn test_join_refusals() {
    let rig = Rig::new();

    assert!(matches!(
        RoomSession::join(&rig.context, "nowhere", profile("alice")).await,
        Err(SessionError::RoomNotFound(_))
    ));

    let mut ended = rig.room("ended", "host").await;
    ended.active = false;
    rig.store.put_room(ended).await.unwrap();

    assert!(matches!(
        RoomSession::join(&rig.context, "ended", profile("alice")).await,
        Err(SessionError::RoomEnded(_))
    ));
}

#[tokio::test]
async fn test_creator_takes_the_host_seat() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    let room = rig.store.room("room").await.unwrap();
    assert_eq!(room.participant("host").unwrap().seat_index, Seat::Host);
    assert_eq!(room.participant("alice").unwrap().seat_index, Seat::Audience);

    let seats = host.seat_map();
    assert_eq!(seats.host, SeatState::Occupied("host".to_string()));
    assert_eq!(seats.first_free(), Some(Seat::Speaker(0)));

    assert_eq!(host.user_id(), "host");
    assert_eq!(alice.room_id(), "room");
}

#[tokio::test]
async fn test_join_announces_in_the_feed() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let _alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    let event = rig
        .wait_for_event(|e| {
            matches!(e, SessionEvent::FeedUpdated { events, .. } if !events.is_empty())
        })
        .await;

    let SessionEvent::FeedUpdated { events, .. } = event else {
        unreachable!()
    };

    assert!(matches!(
        &events[0].data,
        FeedEvent::System { text, .. } if text == "ALICE joined"
    ));
}

#[tokio::test]
async fn test_two_sessions_connect_once() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    rig.wait_for_event(|e| {
        matches!(
            e,
            SessionEvent::PeerStateChanged { user_id, remote, state: PeerState::Connected, .. }
                if user_id == "alice" && remote == "host"
        )
    })
    .await;

    assert_eq!(rig.media.stats().offers_created(), 1, "only one side offers");
    assert_eq!(rig.media.stats().answers_created(), 1);

    drop(alice);
    drop(host);

    until(|| rig.media.stats().open_connections() == 0).await;
}

#[tokio::test]
async fn test_rejoining_in_place_reconnects() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let _alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    let mut waiting = vec![("alice", "host"), ("host", "alice")];

    while !waiting.is_empty() {
        let event = rig
            .wait_for_event(|e| {
                matches!(
                    e,
                    SessionEvent::PeerStateChanged { state: PeerState::Connected, .. }
                )
            })
            .await;

        if let SessionEvent::PeerStateChanged { user_id, remote, .. } = event {
            waiting.retain(|(local, other)| !(user_id == *local && remote == *other));
        }
    }

    // The host answers alice's offers, so alice has to notice the new session
    drop(host);
    let _host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();

    rig.wait_for_event(|e| {
        matches!(
            e,
            SessionEvent::PeerStateChanged { user_id, remote, state: PeerState::Connected, .. }
                if user_id == "host" && remote == "alice"
        )
    })
    .await;

    assert_eq!(rig.media.stats().offers_created(), 2);
}

#[tokio::test]
async fn test_kicked_users_are_banned() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    rig.wait_for_room("room", |r| r.is_present("alice")).await;
    until(|| host.snapshot().is_present("alice")).await;

    host.kick("alice").await.unwrap();
    until(|| alice.exit_reason() == Some(ExitReason::Kicked)).await;

    assert!(matches!(
        alice.send_message("hello").await,
        Err(SessionError::Ended)
    ));
    assert!(matches!(
        RoomSession::join(&rig.context, "room", profile("alice")).await,
        Err(SessionError::Banned { .. })
    ));

    rig.clock.advance(rig.context.config.kick_ban_in_ms());

    let again = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();
    assert!(again.exit_reason().is_none());
}

#[tokio::test]
async fn test_host_leaving_ends_the_room() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    host.leave().await.unwrap();

    assert_eq!(host.exit_reason(), Some(ExitReason::Left));
    until(|| alice.exit_reason() == Some(ExitReason::RoomEnded)).await;

    let room = rig.store.room("room").await.unwrap();
    assert!(!room.active);
    assert!(!room.is_present("host"));
}

#[tokio::test]
async fn test_admin_keeps_the_room_alive() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    until(|| host.snapshot().is_present("alice")).await;
    host.promote_admin("alice").await.unwrap();
    rig.wait_for_room("room", |r| r.is_admin("alice")).await;

    host.leave().await.unwrap();
    rig.wait_for_room("room", |r| !r.is_present("host")).await;

    assert!(rig.store.room("room").await.unwrap().active);
    assert_eq!(alice.exit_reason(), None);

    // With the host gone, the last admin out ends it
    until(|| !alice.snapshot().is_present("host")).await;
    alice.leave().await.unwrap();

    assert!(!rig.store.room("room").await.unwrap().active);
}

#[tokio::test]
async fn test_only_speakers_transmit() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    assert!(!host.is_transmitting(), "everyone joins muted");

    until(|| host.snapshot().is_present("host")).await;
    host.toggle_mute().await.unwrap();
    until(|| host.is_transmitting()).await;

    until(|| alice.snapshot().is_present("alice")).await;
    assert!(matches!(
        alice.toggle_mute().await,
        Err(SessionError::Denied(Denied::NotSeated))
    ));

    host.toggle_mute().await.unwrap();
    until(|| !host.is_transmitting()).await;
}

#[tokio::test]
async fn test_denied_microphone_still_joins() {
    let rig = Rig::new();
    rig.room("room", "host").await;
    rig.media.deny_microphone();

    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    rig.wait_for_event(|e| matches!(e, SessionEvent::LocalAudioUnavailable { .. }))
        .await;

    assert!(!alice.is_transmitting());
    assert!(alice.exit_reason().is_none());
}

#[tokio::test]
async fn test_invites_reach_the_invitee() {
    let rig = Rig::new();
    rig.room("room", "host").await;
    rig.push.register("alice");

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    until(|| host.snapshot().is_present("alice")).await;
    host.invite("alice", Seat::Speaker(2)).await.unwrap();

    let event = rig
        .wait_for_event(|e| {
            matches!(e, SessionEvent::InviteReceived { user_id, .. } if user_id == "alice")
        })
        .await;

    let SessionEvent::InviteReceived { invite, .. } = event else {
        unreachable!()
    };

    assert_eq!(invite.data.from, "host");
    until(|| rig.push.delivered().len() == 1).await;
    assert_eq!(rig.push.delivered()[0].body, "HOST invited you to speak");

    until(|| alice.snapshot().is_present("alice")).await;
    alice.accept_invite(&invite).await.unwrap();

    rig.wait_for_room("room", |r| {
        r.participant("alice").map(|p| p.seat_index) == Some(Seat::Speaker(2))
    })
    .await;

    let mut invites = rig.store.subscribe_invites("room", "alice");
    assert_eq!(invites.recv().await, Some(vec![]));
}

#[tokio::test]
async fn test_feed_messages_and_reactions() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();
    until(|| alice.snapshot().is_present("alice")).await;

    assert!(matches!(
        alice.send_message("   ").await,
        Err(SessionError::EmptyMessage)
    ));

    alice.send_message(" hello ").await.unwrap();
    let feed = rig.store.subscribe_feed("room").recv().await.unwrap();
    assert!(feed.iter().any(|e| matches!(
        &e.data,
        FeedEvent::User { text, .. } if text == "hello"
    )));

    alice.react("https://cdn.test/wave.gif").await.unwrap();
    rig.wait_for_room("room", |r| {
        r.participant("alice")
            .and_then(|p| p.reaction.as_ref())
            .is_some_and(|r| r.url == "https://cdn.test/wave.gif")
    })
    .await;
}

#[tokio::test]
async fn test_gifts_are_animated() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();
    until(|| alice.snapshot().is_present("alice")).await;

    let event_id = alice.send_gift(gift()).await.unwrap();

    rig.wait_for_event(|e| {
        matches!(
            e,
            SessionEvent::AnimationStarted { event_id: id, sender_name, .. }
                if id == &event_id && sender_name == "ALICE"
        )
    })
    .await;

    alice.animation_finished(&event_id);

    rig.wait_for_event(|e| {
        matches!(
            e,
            SessionEvent::AnimationFinished { event_id: id, timed_out: false, .. }
                if id == &event_id
        )
    })
    .await;
}

#[tokio::test]
async fn test_first_song_plays_and_advances() {
    let config = Config {
        music_sync_interval_in_seconds: 0.02,
        ..Default::default()
    };

    let rig = Rig::with_config(config);
    rig.room("room", "host").await;

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    until(|| host.snapshot().is_present("host")).await;

    host.enqueue(song("first", "host")).await.unwrap();
    rig.wait_for_room("room", |r| r.music_state.is_playing).await;

    let room = rig.store.room("room").await.unwrap();
    assert_eq!(
        room.music_state.music_url.as_deref(),
        Some("https://cdn.test/first.mp3")
    );

    until(|| host.snapshot().music_state.is_playing).await;
    host.enqueue(song("second", "host")).await.unwrap();
    rig.wait_for_room("room", |r| r.music_state.queue.len() == 1).await;

    // The host's driver moves on once the shared clock passes the end
    rig.clock.advance(181_000);

    rig.wait_for_room("room", |r| {
        r.music_state.music_url.as_deref() == Some("https://cdn.test/second.mp3")
    })
    .await;
}

#[tokio::test]
async fn test_songs_without_a_duration_advance_when_they_end() {
    let config = Config {
        music_sync_interval_in_seconds: 0.02,
        ..Default::default()
    };

    let rig = Rig::with_config(config);
    rig.room("room", "host").await;
    rig.media.set_track_length("https://cdn.test/first.mp3", 240.);

    let host = RoomSession::join(&rig.context, "room", profile("host"))
        .await
        .unwrap();
    until(|| host.snapshot().is_present("host")).await;

    let first = Song {
        duration: None,
        ..song("first", "host")
    };

    host.enqueue(first).await.unwrap();
    until(|| host.snapshot().music_state.is_playing).await;

    host.enqueue(song("second", "host")).await.unwrap();
    rig.wait_for_room("room", |r| r.music_state.queue.len() == 1).await;

    // Only the player can tell that the track is over
    rig.clock.advance(3_600_000);

    rig.wait_for_room("room", |r| {
        r.music_state.music_url.as_deref() == Some("https://cdn.test/second.mp3")
    })
    .await;

    assert!(rig.store.room("room").await.unwrap().music_state.queue.is_empty());
}

#[tokio::test]
async fn test_upload_and_enqueue() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();
    until(|| alice.snapshot().is_present("alice")).await;

    let upload = Upload {
        file_name: "tune.mp3".to_string(),
        content_type: "audio/mpeg".to_string(),
        bytes: vec![1, 2, 3],
    };

    let song = alice
        .upload_and_enqueue(upload, "Tune", None, Some(90.))
        .await
        .unwrap();

    assert!(song.url.starts_with("https://cdn.test/"));
    assert_eq!(rig.uploader.uploaded(&song.url), Some(vec![1, 2, 3]));

    rig.wait_for_room("room", |r| r.music_state.music_url.as_ref() == Some(&song.url))
        .await;

    let empty = Upload {
        file_name: "nothing.mp3".to_string(),
        content_type: "audio/mpeg".to_string(),
        bytes: vec![],
    };

    assert!(matches!(
        alice.upload_and_enqueue(empty, "Nothing", None, None).await,
        Err(SessionError::Upload(_))
    ));
}

#[tokio::test]
async fn test_paid_rooms_remove_broke_listeners() {
    let config = Config {
        billing_interval_in_seconds: 0.05,
        ..Default::default()
    };

    let rig = Rig::with_config(config);

    let room = RoomDocument::new(
        "paid".to_string(),
        NewRoom {
            name: "Paid".to_string(),
            created_by: "host".to_string(),
            background_image: None,
            password: None,
            is_paid_call: true,
            call_rate_per_minute: Some(5),
        },
    );
    rig.store.put_room(room).await.unwrap();
    rig.billing.top_up("alice", 7);

    let alice = RoomSession::join(&rig.context, "paid", profile("alice"))
        .await
        .unwrap();

    rig.wait_for_event(|e| matches!(e, SessionEvent::Charged { balance: 2, .. }))
        .await;

    until(|| alice.exit_reason() == Some(ExitReason::InsufficientFunds)).await;
    rig.wait_for_room("paid", |r| !r.is_present("alice")).await;
    assert_eq!(rig.billing.balance("alice"), 2);
}

#[tokio::test]
async fn test_deleted_rooms_end_sessions() {
    let rig = Rig::new();
    rig.room("room", "host").await;

    let alice = RoomSession::join(&rig.context, "room", profile("alice"))
        .await
        .unwrap();

    rig.store.delete_room("room").await.unwrap();
    until(|| alice.exit_reason() == Some(ExitReason::RoomDeleted)).await;

    // Leaving a room that is gone is not an error
    alice.leave().await.unwrap();
}

#[test]
fn test_departure_of_the_host() {
    let room = room();

    assert_eq!(
        departure(&room, &"host".to_string()),
        vec![RoomUpdate::RemoveParticipant("host".to_string())],
        "the admin is still there"
    );

    let mut alone = room.clone();
    alone.admins.clear();

    assert_eq!(
        departure(&alone, &"host".to_string()),
        vec![
            RoomUpdate::SetActive(false),
            RoomUpdate::RemoveParticipant("host".to_string())
        ]
    );
}

#[test]
fn test_departure_of_an_admin() {
    let mut room = room();

    assert_eq!(
        departure(&room, &"admin".to_string()),
        vec![RoomUpdate::RemoveParticipant("admin".to_string())],
        "the host is still there"
    );

    room.participants.retain(|p| p.uid != "host");

    assert_eq!(
        departure(&room, &"admin".to_string()),
        vec![
            RoomUpdate::SetActive(false),
            RoomUpdate::RemoveParticipant("admin".to_string())
        ]
    );

    assert_eq!(
        departure(&room, &"alice".to_string()),
        vec![RoomUpdate::RemoveParticipant("alice".to_string())],
        "members never end the room"
    );
    assert!(departure(&room, &"nobody".to_string()).is_empty());
}
