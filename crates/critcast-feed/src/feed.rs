//! The roll feed: a bounded, newest-first list of roll records.

use std::collections::VecDeque;

use critcast_protocol::{RollId, RollRecord};
use tracing::debug;

/// Default number of records kept in the feed.
pub const DEFAULT_FEED_CAPACITY: usize = 50;

/// Order in which a batch of records arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOrder {
    /// Index 0 is the oldest record (the `table:history` convention).
    OldestFirst,
    /// Index 0 is the newest record, already in display order.
    NewestFirst,
}

/// Newest-first store of roll records with a fixed capacity.
///
/// The feed is mutated only through [`prepend`](Self::prepend),
/// [`prepend_batch`](Self::prepend_batch) and [`clear`](Self::clear).
/// Existing entries are never reordered. When the feed grows past its
/// capacity, the oldest entries are evicted from the tail.
///
/// The feed does not look at ids: the newest insert is always at index 0.
/// Echo suppression is the caller's job (see
/// [`FeedAction::without_known`](crate::FeedAction::without_known)).
#[derive(Debug, Clone)]
pub struct RollFeed {
    entries: VecDeque<RollRecord>,
    capacity: usize,
}

impl RollFeed {
    /// Creates an empty feed. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Inserts `record` at index 0, then evicts down to capacity.
    pub fn prepend(&mut self, record: RollRecord) {
        self.entries.push_front(record);
        self.evict();
    }

    /// Inserts a batch so the feed stays newest-first, then evicts.
    ///
    /// For [`BatchOrder::OldestFirst`] the last record of the batch ends up
    /// at index 0. For [`BatchOrder::NewestFirst`] the batch keeps its
    /// order at the head of the feed. Returns how many records were
    /// inserted.
    pub fn prepend_batch(&mut self, mut records: Vec<RollRecord>, order: BatchOrder) -> usize {
        if order == BatchOrder::NewestFirst {
            records.reverse();
        }
        let inserted = records.len();
        for record in records {
            self.entries.push_front(record);
        }
        self.evict();
        inserted
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn contains(&self, id: &RollId) -> bool {
        self.entries.iter().any(|record| &record.id == id)
    }

    /// Records, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &RollRecord> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Copies the records out, newest first.
    pub fn to_vec(&self) -> Vec<RollRecord> {
        self.entries.iter().cloned().collect()
    }

    fn evict(&mut self) {
        if self.entries.len() > self.capacity {
            debug!(
                evicted = self.entries.len() - self.capacity,
                "feed over capacity"
            );
            self.entries.truncate(self.capacity);
        }
    }
}

impl Default for RollFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl<'a> IntoIterator for &'a RollFeed {
    type Item = &'a RollRecord;
    type IntoIter = std::collections::vec_deque::Iter<'a, RollRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
