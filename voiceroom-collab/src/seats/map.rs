use voiceroom_core::{Config, RoomDocument, Seat, UserId};

/// What a single seat looks like to someone who wants to sit on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeatState {
    Empty,
    Locked,
    /// Occupied seats stay occupied when locked
    Occupied(UserId),
}

/// A read-only view of every seat in a room, derived from a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatMap {
    pub host: SeatState,
    pub speakers: Vec<SeatState>,
}

impl SeatMap {
    pub fn from_room(room: &RoomDocument, config: &Config) -> Self {
        let host = match room.occupant(Seat::Host) {
            Some(p) => SeatState::Occupied(p.uid.clone()),
            None => SeatState::Empty,
        };

        let speakers = (0..config.seat_count)
            .map(|index| match room.occupant(Seat::Speaker(index)) {
                Some(p) => SeatState::Occupied(p.uid.clone()),
                None if room.is_locked(index) => SeatState::Locked,
                None => SeatState::Empty,
            })
            .collect();

        Self { host, speakers }
    }

    pub fn get(&self, seat: Seat) -> Option<&SeatState> {
        match seat {
            Seat::Audience => None,
            Seat::Host => Some(&self.host),
            Seat::Speaker(index) => self.speakers.get(index as usize),
        }
    }

    /// The lowest numbered speaker seat nobody sits on and nobody locked
    pub fn first_free(&self) -> Option<Seat> {
        self.speakers
            .iter()
            .position(|s| *s == SeatState::Empty)
            .map(|index| Seat::Speaker(index as u8))
    }
}
