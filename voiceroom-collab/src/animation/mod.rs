use std::collections::{HashSet, VecDeque};

use log::debug;
use voiceroom_core::{Config, Document, FeedEvent, Gift, Timestamp};

/// How many feed event ids are remembered to avoid animating one twice
const SEEN_CAPACITY: usize = 256;

/// A gift waiting to be, or being, animated
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    /// The id of the feed event it came from
    pub event_id: String,
    pub sender_name: String,
    pub gift: Gift,
    pub sent_at: Timestamp,
}

/// What changed on screen
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationStep {
    Started(Animation),
    Finished { event_id: String, timed_out: bool },
}

/// Plays gift animations strictly one at a time.
///
/// An animation that never reports back is forced off after a timeout, so
/// one broken asset can't hold up the rest of the queue.
#[derive(Debug)]
pub struct AnimationQueue {
    current: Option<(Animation, Timestamp)>,
    pending: VecDeque<Animation>,
    seen: HashSet<String>,
    seen_order: VecDeque<String>,
    timeout: Timestamp,
    freshness: Timestamp,
}

impl AnimationQueue {
    pub fn new(config: &Config) -> Self {
        Self {
            current: None,
            pending: VecDeque::new(),
            seen: HashSet::new(),
            seen_order: VecDeque::new(),
            timeout: config.animation_timeout_in_ms(),
            freshness: config.gift_freshness_in_ms(),
        }
    }

    pub fn current(&self) -> Option<&Animation> {
        self.current.as_ref().map(|(a, _)| a)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Queues every gift in a feed snapshot that wasn't seen before
    pub fn ingest_feed(
        &mut self,
        events: &[Document<FeedEvent>],
        now: Timestamp,
    ) -> Vec<AnimationStep> {
        let mut steps = vec![];

        for event in events {
            if let FeedEvent::Gift {
                sender_name,
                gift,
                timestamp,
                ..
            } = &event.data
            {
                steps.extend(self.enqueue(
                    Animation {
                        event_id: event.id.clone(),
                        sender_name: sender_name.clone(),
                        gift: gift.clone(),
                        sent_at: *timestamp,
                    },
                    now,
                ));
            }
        }

        steps
    }

    pub fn enqueue(&mut self, animation: Animation, now: Timestamp) -> Vec<AnimationStep> {
        if !self.remember(&animation.event_id) {
            return vec![];
        }

        if now - animation.sent_at > self.freshness {
            debug!("Not animating stale gift {}", animation.event_id);
            return vec![];
        }

        if self.current.is_some() {
            self.pending.push_back(animation);
            return vec![];
        }

        self.start(animation, now)
    }

    /// The renderer finished an animation. Reports for anything but the current one are ignored.
    pub fn on_finished(&mut self, event_id: &str, now: Timestamp) -> Vec<AnimationStep> {
        match &self.current {
            Some((current, _)) if current.event_id == event_id => self.advance(false, now),
            _ => vec![],
        }
    }

    /// Forces the current animation off once it ran past the timeout
    pub fn tick(&mut self, now: Timestamp) -> Vec<AnimationStep> {
        match &self.current {
            Some((_, started_at)) if now - started_at >= self.timeout => self.advance(true, now),
            _ => vec![],
        }
    }

    fn advance(&mut self, timed_out: bool, now: Timestamp) -> Vec<AnimationStep> {
        let mut steps = vec![];

        if let Some((finished, _)) = self.current.take() {
            steps.push(AnimationStep::Finished {
                event_id: finished.event_id,
                timed_out,
            });
        }

        if let Some(next) = self.pending.pop_front() {
            steps.extend(self.start(next, now));
        }

        steps
    }

    fn start(&mut self, animation: Animation, now: Timestamp) -> Vec<AnimationStep> {
        self.current = Some((animation.clone(), now));
        vec![AnimationStep::Started(animation)]
    }

    /// Returns false if the id was already seen
    fn remember(&mut self, event_id: &str) -> bool {
        if !self.seen.insert(event_id.to_string()) {
            return false;
        }

        self.seen_order.push_back(event_id.to_string());

        if self.seen_order.len() > SEEN_CAPACITY {
            if let Some(oldest) = self.seen_order.pop_front() {
                self.seen.remove(&oldest);
            }
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn gift_event(id: &str, timestamp: Timestamp) -> Document<FeedEvent> {
        Document {
            id: id.to_string(),
            data: FeedEvent::Gift {
                sender: "alice".to_string(),
                sender_name: "Alice".to_string(),
                gift: Gift {
                    gift_id: "rose".to_string(),
                    name: "Rose".to_string(),
                    animation_url: "https://cdn.test/rose.json".to_string(),
                    value: 10,
                    recipient: None,
                },
                timestamp,
            },
        }
    }

    fn started(steps: &[AnimationStep]) -> Vec<&str> {
        steps
            .iter()
            .filter_map(|s| match s {
                AnimationStep::Started(a) => Some(a.event_id.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_one_at_a_time() {
        let mut queue = AnimationQueue::new(&Config::default());

        let steps = queue.ingest_feed(&[gift_event("a", 0), gift_event("b", 0)], 1_000);
        assert_eq!(started(&steps), vec!["a"]);
        assert_eq!(queue.pending_len(), 1);

        let steps = queue.on_finished("a", 2_000);
        assert_eq!(
            steps[0],
            AnimationStep::Finished {
                event_id: "a".to_string(),
                timed_out: false
            }
        );
        assert_eq!(started(&steps), vec!["b"]);
    }

    #[test]
    fn test_each_event_animates_once() {
        let mut queue = AnimationQueue::new(&Config::default());

        queue.ingest_feed(&[gift_event("a", 0)], 1_000);
        queue.on_finished("a", 2_000);

        // Feed snapshots repeat everything
        let steps = queue.ingest_feed(&[gift_event("a", 0), gift_event("b", 2_000)], 3_000);
        assert_eq!(started(&steps), vec!["b"]);
    }

    #[test]
    fn test_stale_gifts_are_skipped() {
        let mut queue = AnimationQueue::new(&Config::default());

        let steps = queue.ingest_feed(&[gift_event("old", 0)], 8_001);
        assert!(steps.is_empty());
        assert_eq!(queue.current(), None);
    }

    #[test]
    fn test_timeout_forces_advance() {
        let mut queue = AnimationQueue::new(&Config::default());
        queue.ingest_feed(&[gift_event("a", 0), gift_event("b", 0)], 0);

        assert!(queue.tick(6_999).is_empty());

        let steps = queue.tick(7_000);
        assert_eq!(
            steps[0],
            AnimationStep::Finished {
                event_id: "a".to_string(),
                timed_out: true
            }
        );
        assert_eq!(queue.current().map(|a| a.event_id.as_str()), Some("b"));

        assert!(
            queue.on_finished("a", 7_100).is_empty(),
            "a late report for a timed out animation changes nothing"
        );
    }
}
