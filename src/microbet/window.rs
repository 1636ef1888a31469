use std::collections::VecDeque;

use crate::db::models::BroadcastEvent;

/// Bounded FIFO of the most recently broadcast events.
#[derive(Debug, Clone)]
pub struct RecentPlaysWindow {
    events: VecDeque<BroadcastEvent>,
    capacity: usize,
}

impl RecentPlaysWindow {
    pub fn new(capacity: usize) -> Self {
        RecentPlaysWindow {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append an event, evicting the oldest once over capacity.
    pub fn push(&mut self, event: BroadcastEvent) {
        self.events.push_back(event);
        while self.events.len() > self.capacity {
            self.events.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Oldest-first copy, handed to background tasks.
    pub fn snapshot(&self) -> Vec<BroadcastEvent> {
        self.events.iter().cloned().collect()
    }
}
