use chrono::Utc;
use crossbeam::atomic::AtomicCell;

/// Milliseconds since the unix epoch, as stored in room documents.
pub type Timestamp = i64;

/// A source of wall-clock time shared by every component of a session.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicCell<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicCell::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        self.now.store(now);
    }

    pub fn advance(&self, ms: Timestamp) {
        self.now.fetch_add(ms);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load()
    }
}
