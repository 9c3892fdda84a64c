//! Ordered clip queue state machine
//!
//! Holds pending clip references and the single active playback attempt.
//! Every attempt is issued a [`Ticket`] carrying a fresh token; completion
//! reports are matched against the active ticket, so a report from an attempt
//! that was superseded by [`PlaybackQueue::reset`] is ignored.

use std::collections::VecDeque;

/// Handle for one playback attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    token: u64,
    clip: String,
}

impl Ticket {
    /// Clip reference to play
    #[must_use]
    pub fn clip(&self) -> &str {
        &self.clip
    }

    /// Attempt token
    #[must_use]
    pub const fn token(&self) -> u64 {
        self.token
    }
}

/// Result of reporting an attempt as finished
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The ticket no longer matches the active attempt; nothing changed
    Stale,
    /// The next pending clip became active
    Next(Ticket),
    /// Nothing left to play
    Idle,
}

/// Pending clips plus the currently playing one
///
/// The active clip stays at the front of `pending` until it finishes.
#[derive(Debug, Default)]
pub struct PlaybackQueue {
    pending: VecDeque<String>,
    active: Option<Ticket>,
    next_token: u64,
}

impl PlaybackQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a clip; returns a ticket to start when the queue was idle
    pub fn enqueue(&mut self, clip: impl Into<String>) -> Option<Ticket> {
        self.pending.push_back(clip.into());
        if self.active.is_some() {
            return None;
        }
        self.begin()
    }

    /// Report the attempt for `ticket` as finished (successfully or not)
    pub fn finish(&mut self, ticket: &Ticket) -> Step {
        if self.active.as_ref() != Some(ticket) {
            return Step::Stale;
        }

        self.pending.pop_front();
        self.active = None;
        self.begin().map_or(Step::Idle, Step::Next)
    }

    /// Drop all pending clips and return the attempt that was active, if any
    pub fn reset(&mut self) -> Option<Ticket> {
        self.pending.clear();
        self.active.take()
    }

    /// Currently active attempt
    #[must_use]
    pub const fn active(&self) -> Option<&Ticket> {
        self.active.as_ref()
    }

    /// Clips waiting or playing, front first
    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.active.is_none()
    }

    fn begin(&mut self) -> Option<Ticket> {
        let clip = self.pending.front()?.clone();
        let ticket = Ticket {
            token: self.next_token,
            clip,
        };
        self.next_token += 1;
        self.active = Some(ticket.clone());
        Some(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plays_in_enqueue_order() {
        let mut queue = PlaybackQueue::new();

        let a = queue.enqueue("a").unwrap();
        assert!(queue.enqueue("b").is_none());
        assert!(queue.enqueue("c").is_none());
        assert_eq!(a.clip(), "a");

        let Step::Next(b) = queue.finish(&a) else {
            panic!("expected b");
        };
        assert_eq!(b.clip(), "b");

        // A failed attempt advances exactly like a completed one
        let Step::Next(c) = queue.finish(&b) else {
            panic!("expected c");
        };
        assert_eq!(c.clip(), "c");

        assert_eq!(queue.finish(&c), Step::Idle);
        assert!(queue.is_idle());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_stale_ticket_after_reset_is_ignored() {
        let mut queue = PlaybackQueue::new();
        let a = queue.enqueue("a").unwrap();
        queue.enqueue("b");

        assert_eq!(queue.reset(), Some(a.clone()));
        assert!(queue.is_idle());

        let c = queue.enqueue("c").unwrap();
        assert_eq!(c.clip(), "c");

        // Late completion of `a` must not advance the new sequence
        assert_eq!(queue.finish(&a), Step::Stale);
        assert_eq!(queue.active(), Some(&c));
        assert_eq!(queue.pending().collect::<Vec<_>>(), vec!["c"]);

        assert_eq!(queue.finish(&c), Step::Idle);
    }

    #[test]
    fn test_same_clip_twice_gets_distinct_tokens() {
        let mut queue = PlaybackQueue::new();
        let first = queue.enqueue("x").unwrap();
        queue.enqueue("x");

        let Step::Next(second) = queue.finish(&first) else {
            panic!("expected second attempt");
        };
        assert_ne!(first.token(), second.token());

        // Reporting the first attempt again is stale
        assert_eq!(queue.finish(&first), Step::Stale);
        assert_eq!(queue.finish(&second), Step::Idle);
    }

    #[test]
    fn test_reset_when_idle() {
        let mut queue = PlaybackQueue::new();
        assert!(queue.reset().is_none());
        assert!(queue.enqueue("a").is_some());
    }
}
