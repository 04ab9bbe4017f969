use std::sync::Arc;

use crossbeam::atomic::AtomicCell;
use dashmap::DashMap;
use parking_lot::Mutex;
use voiceroom_core::{Clock, MusicPlayer, Timestamp};

/// A player that doesn't make a sound, it only keeps a playhead on a clock.
///
/// The playback rate can be skewed to simulate a local player drifting away
/// from the shared clock. Media only ends if its length is in `lengths`.
pub struct ClockedPlayer {
    clock: Arc<dyn Clock>,
    lengths: Arc<DashMap<String, f64>>,
    rate: AtomicCell<f64>,
    state: Mutex<PlayheadState>,
}

#[derive(Debug, Default)]
struct PlayheadState {
    source: Option<String>,
    /// The position at `anchor`, in seconds
    base: f64,
    /// When playback last started, if it is playing
    anchor: Option<Timestamp>,
}

impl ClockedPlayer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_lengths(clock, Default::default())
    }

    /// A player that knows how long each URL plays, in seconds
    pub fn with_lengths(clock: Arc<dyn Clock>, lengths: Arc<DashMap<String, f64>>) -> Self {
        Self {
            clock,
            lengths,
            rate: AtomicCell::new(1.),
            state: Default::default(),
        }
    }

    /// Makes the playhead run faster or slower than the clock
    pub fn set_rate(&self, rate: f64) {
        let mut state = self.state.lock();

        // Settle the elapsed time at the old rate first
        state.base = self.position_of(&state);
        state.anchor = state.anchor.map(|_| self.clock.now());

        self.rate.store(rate);
    }

    fn position_of(&self, state: &PlayheadState) -> f64 {
        let elapsed = state
            .anchor
            .map(|anchor| (self.clock.now() - anchor).max(0) as f64 / 1000.)
            .unwrap_or_default();

        state.base + elapsed * self.rate.load()
    }
}

impl MusicPlayer for ClockedPlayer {
    fn source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    fn load(&self, url: &str) {
        let mut state = self.state.lock();

        state.source = Some(url.to_string());
        state.base = 0.;
        state.anchor = None;
    }

    fn play(&self) {
        let mut state = self.state.lock();

        if state.source.is_some() && state.anchor.is_none() {
            state.anchor = Some(self.clock.now());
        }
    }

    fn pause(&self) {
        let mut state = self.state.lock();

        state.base = self.position_of(&state);
        state.anchor = None;
    }

    fn seek(&self, position: f64) {
        let mut state = self.state.lock();

        state.base = position.max(0.);
        state.anchor = state.anchor.map(|_| self.clock.now());
    }

    fn stop(&self) {
        *self.state.lock() = PlayheadState::default();
    }

    fn position(&self) -> f64 {
        self.position_of(&self.state.lock())
    }

    fn is_playing(&self) -> bool {
        self.state.lock().anchor.is_some()
    }

    fn has_ended(&self) -> bool {
        let state = self.state.lock();

        let length = state
            .source
            .as_ref()
            .and_then(|url| self.lengths.get(url).map(|length| *length));

        match length {
            Some(length) => self.position_of(&state) >= length,
            None => false,
        }
    }
}
