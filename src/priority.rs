//! Mutable-priority FIFO-within-priority scheduler.
//!
//! One priority queue backs each derivative pipeline. It is a plain,
//! non-concurrent data structure — the pipeline wraps it in its own lock and
//! drives it; see `pipeline`. The implementation is bucketed (one `VecDeque`
//! per priority level) rather than a binary heap, which is the natural
//! choice given the fixed, small priority set — the same shape the
//! spacedrive thumbnail actor uses for its background/foreground queues.

use std::collections::{HashMap, VecDeque};

use crate::model::AssetId;

/// Priorities, ordered highest-to-lowest by declaration order below (higher
/// variant = earlier service).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Opportunistic; first eligible for bulk cancellation.
    Background,
    /// Explicit preload (e.g. next/previous photo in the editor).
    Preload,
    /// Adjacent cells, likely to become visible on a small scroll.
    NearVisible,
    /// Visible on screen — serve first.
    Visible,
}

impl Priority {
    const ALL_HIGH_TO_LOW: [Priority; 4] = [
        Priority::Visible,
        Priority::NearVisible,
        Priority::Preload,
        Priority::Background,
    ];
}

/// An entry queued for derivative generation.
pub struct Entry<P> {
    /// Asset this entry concerns.
    pub id: AssetId,
    /// Queueing priority.
    pub priority: Priority,
    /// Opaque payload carried alongside the id (bytes-producer, edit state,
    /// generation snapshot — owned by the pipeline, not interpreted here).
    pub payload: P,
}

struct IndexedEntry<P> {
    priority: Priority,
    payload: P,
}

/// Bucketed priority queue with O(1) contains/remove-by-id via a side index.
pub struct PriorityQueue<P> {
    buckets: HashMap<Priority, VecDeque<AssetId>>,
    index: HashMap<AssetId, IndexedEntry<P>>,
}

impl<P> Default for PriorityQueue<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> PriorityQueue<P> {
    /// Builds an empty queue.
    pub fn new() -> Self {
        let mut buckets = HashMap::new();
        for p in Priority::ALL_HIGH_TO_LOW {
            buckets.insert(p, VecDeque::new());
        }
        Self {
            buckets,
            index: HashMap::new(),
        }
    }

    /// Number of distinct ids currently queued.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// True if the queue holds no entries.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// True if `id` is currently queued.
    pub fn contains(&self, id: &AssetId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the currently-queued priority for `id`, if any.
    pub fn priority_of(&self, id: &AssetId) -> Option<Priority> {
        self.index.get(id).map(|e| e.priority)
    }

    /// Inserts a new entry. If `id` is already queued, this is a no-op — use
    /// [`PriorityQueue::update_priority`] or replace via `remove` + `enqueue`
    /// if the payload must change.
    pub fn enqueue(&mut self, entry: Entry<P>) {
        if self.index.contains_key(&entry.id) {
            return;
        }
        self.buckets
            .entry(entry.priority)
            .or_default()
            .push_back(entry.id.clone());
        self.index.insert(
            entry.id,
            IndexedEntry {
                priority: entry.priority,
                payload: entry.payload,
            },
        );
    }

    /// Removes and returns the highest-priority entry, breaking ties by
    /// FIFO insertion order within that priority.
    pub fn dequeue(&mut self) -> Option<Entry<P>> {
        for p in Priority::ALL_HIGH_TO_LOW {
            if let Some(bucket) = self.buckets.get_mut(&p) {
                while let Some(id) = bucket.pop_front() {
                    if let Some(indexed) = self.index.remove(&id) {
                        return Some(Entry {
                            id,
                            priority: indexed.priority,
                            payload: indexed.payload,
                        });
                    }
                    // Stale bucket entry (left behind by update_priority); skip it.
                }
            }
        }
        None
    }

    /// Raises or lowers the priority of a pending entry. No-op if `id` is
    /// not currently queued.
    pub fn update_priority(&mut self, id: &AssetId, new_priority: Priority) {
        let Some(indexed) = self.index.get_mut(id) else {
            return;
        };
        if indexed.priority == new_priority {
            return;
        }
        indexed.priority = new_priority;
        // The old bucket slot becomes stale and is skipped on dequeue; the
        // entry moves to the back of its new bucket, which matches "FIFO
        // within priority" measured from the re-prioritization, the only
        // definition that makes sense once priority has changed.
        self.buckets.entry(new_priority).or_default().push_back(id.clone());
    }

    /// Removes a pending entry, returning its payload if it was queued.
    pub fn remove(&mut self, id: &AssetId) -> Option<P> {
        self.index.remove(id).map(|indexed| indexed.payload)
    }

    /// Removes every pending entry matching `predicate`, returning how many
    /// were removed.
    pub fn remove_where(&mut self, mut predicate: impl FnMut(&AssetId, &P) -> bool) -> usize {
        let to_remove: Vec<AssetId> = self
            .index
            .iter()
            .filter(|(id, entry)| predicate(id, &entry.payload))
            .map(|(id, _)| id.clone())
            .collect();
        let count = to_remove.len();
        for id in &to_remove {
            self.index.remove(id);
        }
        count
    }

    /// Removes every pending entry at the given priority, returning how many
    /// were removed. Used to shed load under pressure.
    pub fn remove_priority(&mut self, priority: Priority) -> usize {
        let ids: Vec<AssetId> = self
            .index
            .iter()
            .filter(|(_, entry)| entry.priority == priority)
            .map(|(id, _)| id.clone())
            .collect();
        let count = ids.len();
        for id in &ids {
            self.index.remove(id);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> AssetId {
        AssetId(format!("a{n}"))
    }

    #[test]
    fn priority_order_beats_enqueue_order() {
        let mut q: PriorityQueue<()> = PriorityQueue::new();
        q.enqueue(Entry { id: id(1), priority: Priority::Background, payload: () });
        q.enqueue(Entry { id: id(2), priority: Priority::Visible, payload: () });
        let first = q.dequeue().unwrap();
        assert_eq!(first.id, id(2));
        let second = q.dequeue().unwrap();
        assert_eq!(second.id, id(1));
    }

    #[test]
    fn fifo_within_priority() {
        let mut q: PriorityQueue<()> = PriorityQueue::new();
        q.enqueue(Entry { id: id(1), priority: Priority::Background, payload: () });
        q.enqueue(Entry { id: id(2), priority: Priority::Background, payload: () });
        q.enqueue(Entry { id: id(3), priority: Priority::Background, payload: () });
        assert_eq!(q.dequeue().unwrap().id, id(1));
        assert_eq!(q.dequeue().unwrap().id, id(2));
        assert_eq!(q.dequeue().unwrap().id, id(3));
    }

    #[test]
    fn update_priority_reprioritizes() {
        let mut q: PriorityQueue<()> = PriorityQueue::new();
        for n in 0..5 {
            q.enqueue(Entry { id: id(n), priority: Priority::Background, payload: () });
        }
        q.update_priority(&id(3), Priority::Visible);
        assert_eq!(q.dequeue().unwrap().id, id(3));
        assert_eq!(q.len(), 4);
    }

    #[test]
    fn remove_and_contains() {
        let mut q: PriorityQueue<()> = PriorityQueue::new();
        q.enqueue(Entry { id: id(1), priority: Priority::Preload, payload: () });
        assert!(q.contains(&id(1)));
        assert!(q.remove(&id(1)).is_some());
        assert!(!q.contains(&id(1)));
        assert_eq!(q.dequeue().map(|e| e.id), None);
    }

    #[test]
    fn remove_priority_counts_and_clears() {
        let mut q: PriorityQueue<()> = PriorityQueue::new();
        for n in 0..10 {
            q.enqueue(Entry { id: id(n), priority: Priority::Background, payload: () });
        }
        q.enqueue(Entry { id: id(99), priority: Priority::Visible, payload: () });
        let removed = q.remove_priority(Priority::Background);
        assert_eq!(removed, 10);
        assert_eq!(q.len(), 1);
        assert_eq!(q.dequeue().unwrap().id, id(99));
    }

    #[test]
    fn size_matches_distinct_ids_after_mixed_ops() {
        let mut q: PriorityQueue<()> = PriorityQueue::new();
        for n in 0..20 {
            q.enqueue(Entry { id: id(n), priority: Priority::Background, payload: () });
        }
        q.update_priority(&id(5), Priority::Visible);
        q.remove(&id(7));
        q.dequeue();
        assert_eq!(q.len(), 18);
    }

    #[test]
    fn re_enqueue_while_queued_is_noop_for_payload() {
        let mut q: PriorityQueue<i32> = PriorityQueue::new();
        q.enqueue(Entry { id: id(1), priority: Priority::Background, payload: 1 });
        q.enqueue(Entry { id: id(1), priority: Priority::Visible, payload: 2 });
        assert_eq!(q.len(), 1);
        let entry = q.dequeue().unwrap();
        assert_eq!(entry.payload, 1);
        assert_eq!(entry.priority, Priority::Background);
    }
}
