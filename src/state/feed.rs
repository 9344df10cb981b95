//! Bounded, most-recent-first window of trade prints.

use std::collections::VecDeque;

use crate::models::TradePrint;

/// Display buffer for the live trade feed.
///
/// Entries keep the order the transport delivered them in, newest first.
/// Nothing is deduplicated.
#[derive(Debug)]
pub struct LiveFeedBuffer {
    prints: VecDeque<TradePrint>,
    capacity: usize,
}

impl LiveFeedBuffer {
    /// Creates an empty buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            prints: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Prepends a print, evicting the oldest once over capacity.
    pub fn push(&mut self, print: TradePrint) {
        self.prints.push_front(print);
        self.prints.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &TradePrint> {
        self.prints.iter()
    }

    /// Copies the buffer, most recent first.
    pub fn snapshot(&self) -> Vec<TradePrint> {
        self.prints.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.prints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prints.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Empties the buffer. Only a session reset calls this; reconnects keep
    /// the visible history.
    pub fn clear(&mut self) {
        self.prints.clear();
    }
}
