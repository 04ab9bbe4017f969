use std::collections::VecDeque;

use voiceroom_core::IceCandidate;

/// Remote candidates that arrived before they could be applied.
/// Full queues drop their oldest candidate.
#[derive(Debug, Clone)]
pub struct CandidateQueue {
    candidates: VecDeque<IceCandidate>,
    capacity: usize,
    dropped: usize,
}

impl CandidateQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            candidates: VecDeque::with_capacity(capacity.min(16)),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        if self.candidates.len() >= self.capacity {
            self.candidates.pop_front();
            self.dropped += 1;
        }

        self.candidates.push_back(candidate);
    }

    /// Takes every queued candidate, oldest first
    pub fn drain(&mut self) -> Vec<IceCandidate> {
        self.candidates.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// How many candidates were pushed out by newer ones
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
