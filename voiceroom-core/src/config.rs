use std::time::Duration;

use crate::{IceServer, Timestamp};

/// The configuration of a voice room client
#[derive(Debug, Clone)]
pub struct Config {
    /// The number of numbered speaker seats in a room
    pub seat_count: u8,
    /// How often a participant refreshes its `lastSeen`
    pub heartbeat_interval_in_seconds: f32,
    /// How long a kicked user is refused when trying to rejoin
    pub kick_ban_in_seconds: f32,
    /// How far a local music player may drift from the shared clock before it seeks
    pub music_drift_tolerance_in_seconds: f32,
    /// How often the local music player is checked against the shared clock
    pub music_sync_interval_in_seconds: f32,
    /// How long an animation may play before it is force-cleared
    pub animation_timeout_in_seconds: f32,
    /// Gift events older than this are never animated
    pub gift_freshness_in_seconds: f32,
    /// How often the animation queue checks for a stuck animation
    pub animation_tick_in_seconds: f32,
    /// How often a participant of a paid room is charged
    pub billing_interval_in_seconds: f32,
    /// How long a reaction stays visible on a participant
    pub reaction_duration_in_seconds: f32,
    /// How many early ICE candidates are kept per peer before the oldest is dropped
    pub candidate_queue_capacity: usize,
    /// Whether joining posts a system message to the room feed
    pub announce_joins: bool,
    /// Traversal servers handed to every peer connection
    pub ice_servers: Vec<IceServer>,
}

impl Config {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f32(self.heartbeat_interval_in_seconds)
    }

    pub fn music_sync_interval(&self) -> Duration {
        Duration::from_secs_f32(self.music_sync_interval_in_seconds)
    }

    pub fn animation_tick(&self) -> Duration {
        Duration::from_secs_f32(self.animation_tick_in_seconds)
    }

    pub fn billing_interval(&self) -> Duration {
        Duration::from_secs_f32(self.billing_interval_in_seconds)
    }

    /// The ban window after a kick, in milliseconds
    pub fn kick_ban_in_ms(&self) -> Timestamp {
        seconds_to_ms(self.kick_ban_in_seconds)
    }

    pub fn animation_timeout_in_ms(&self) -> Timestamp {
        seconds_to_ms(self.animation_timeout_in_seconds)
    }

    pub fn gift_freshness_in_ms(&self) -> Timestamp {
        seconds_to_ms(self.gift_freshness_in_seconds)
    }

    pub fn reaction_duration_in_ms(&self) -> Timestamp {
        seconds_to_ms(self.reaction_duration_in_seconds)
    }

    /// Returns true if the given index is a valid speaker seat
    pub fn is_valid_seat(&self, index: u8) -> bool {
        index < self.seat_count
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seat_count: 8,
            heartbeat_interval_in_seconds: 30.,
            // Kicks last ten minutes
            kick_ban_in_seconds: 60. * 10.,
            // Half a second is below what listeners notice
            music_drift_tolerance_in_seconds: 0.5,
            music_sync_interval_in_seconds: 2.,
            animation_timeout_in_seconds: 7.,
            gift_freshness_in_seconds: 8.,
            animation_tick_in_seconds: 0.5,
            billing_interval_in_seconds: 60.,
            reaction_duration_in_seconds: 3.,
            candidate_queue_capacity: 64,
            announce_joins: true,
            ice_servers: IceServer::default_stun(),
        }
    }
}

fn seconds_to_ms(seconds: f32) -> Timestamp {
    (seconds * 1000.) as Timestamp
}
