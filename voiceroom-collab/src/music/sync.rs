use voiceroom_core::{MusicPlayer, MusicState, Timestamp};

/// Something the local player must do to match the shared state
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Load(String),
    Seek(f64),
    Play,
    Pause,
    Stop,
}

impl PlayerCommand {
    pub fn apply(&self, player: &dyn MusicPlayer) {
        match self {
            PlayerCommand::Load(url) => player.load(url),
            PlayerCommand::Seek(position) => player.seek(*position),
            PlayerCommand::Play => player.play(),
            PlayerCommand::Pause => player.pause(),
            PlayerCommand::Stop => player.stop(),
        }
    }
}

/// Keeps a local player within a tolerance of the position every client
/// derives from the shared anchor.
#[derive(Debug, Clone)]
pub struct MusicSync {
    tolerance: f64,
}

impl MusicSync {
    pub fn new(tolerance_in_seconds: f32) -> Self {
        Self {
            tolerance: tolerance_in_seconds as f64,
        }
    }

    /// Works out what the player needs to do to match the shared state
    pub fn reconcile(
        &self,
        music: &MusicState,
        player: &dyn MusicPlayer,
        now: Timestamp,
    ) -> Vec<PlayerCommand> {
        let wanted = music.music_url.as_ref().filter(|_| music.is_enabled);

        let (Some(url), Some(expected)) = (wanted, music.expected_position(now)) else {
            return match player.source() {
                Some(_) => vec![PlayerCommand::Stop],
                None => vec![],
            };
        };

        let mut commands = vec![];

        if player.source().as_ref() != Some(url) {
            commands.push(PlayerCommand::Load(url.clone()));
            commands.push(PlayerCommand::Seek(expected));

            if music.is_playing {
                commands.push(PlayerCommand::Play);
            }

            return commands;
        }

        let drift = (player.position() - expected).abs();

        match (music.is_playing, player.is_playing()) {
            (true, false) => {
                commands.push(PlayerCommand::Seek(expected));
                commands.push(PlayerCommand::Play);
            }
            (false, true) => {
                commands.push(PlayerCommand::Pause);
                commands.push(PlayerCommand::Seek(expected));
            }
            _ if drift > self.tolerance => commands.push(PlayerCommand::Seek(expected)),
            _ => {}
        }

        commands
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use voiceroom_core::{Clock, ManualClock};
    use voiceroom_impls::ClockedPlayer;

    use super::*;

    fn playing(url: &str, music_time: Timestamp) -> MusicState {
        MusicState {
            is_enabled: true,
            music_url: Some(url.to_string()),
            is_playing: true,
            music_time,
            ..Default::default()
        }
    }

    fn run(sync: &MusicSync, music: &MusicState, player: &ClockedPlayer, now: Timestamp) {
        for command in sync.reconcile(music, player, now) {
            command.apply(player);
        }
    }

    #[test]
    fn test_late_joiner_seeks_to_shared_position() {
        let clock = Arc::new(ManualClock::new(100_000));
        let player = ClockedPlayer::new(clock.clone());
        let sync = MusicSync::new(0.5);

        // Started 40 seconds before this client showed up
        let music = playing("https://cdn.test/s1.mp3", 60_000);

        assert_eq!(
            sync.reconcile(&music, &player, clock.now()),
            vec![
                PlayerCommand::Load("https://cdn.test/s1.mp3".to_string()),
                PlayerCommand::Seek(40.),
                PlayerCommand::Play
            ]
        );

        run(&sync, &music, &player, clock.now());
        clock.advance(1_000);

        assert!(sync.reconcile(&music, &player, clock.now()).is_empty());
        assert_eq!(player.position(), 41.);
    }

    #[test]
    fn test_drift_beyond_tolerance_is_corrected() {
        let clock = Arc::new(ManualClock::new(0));
        let player = ClockedPlayer::new(clock.clone());
        let sync = MusicSync::new(0.5);
        let music = playing("https://cdn.test/s1.mp3", 0);

        run(&sync, &music, &player, clock.now());
        player.set_rate(1.1);

        clock.advance(4_000);
        assert!(
            sync.reconcile(&music, &player, clock.now()).is_empty(),
            "0.4 seconds of drift is tolerated"
        );

        clock.advance(2_000);
        assert_eq!(
            sync.reconcile(&music, &player, clock.now()),
            vec![PlayerCommand::Seek(6.)]
        );

        run(&sync, &music, &player, clock.now());
        assert!((player.position() - 6.).abs() <= 0.5);
    }

    #[test]
    fn test_pause_and_stop_follow_shared_state() {
        let clock = Arc::new(ManualClock::new(10_000));
        let player = ClockedPlayer::new(clock.clone());
        let sync = MusicSync::new(0.5);

        let mut music = playing("https://cdn.test/s1.mp3", 0);
        run(&sync, &music, &player, clock.now());

        music.is_playing = false;
        music.paused_at = Some(10_000);
        run(&sync, &music, &player, clock.now());

        assert!(!player.is_playing());
        assert_eq!(player.position(), 10.);

        music.music_url = None;
        run(&sync, &music, &player, clock.now());
        assert_eq!(player.source(), None);
    }
}
