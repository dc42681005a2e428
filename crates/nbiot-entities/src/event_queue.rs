use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

/// Handle to a scheduled event, used to cancel it before it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

struct ScheduledEvent<T> {
    /// Tick at which the event becomes due
    due: u64,
    /// Insertion order, breaks ties between events due at the same tick
    seq: u64,
    item: T,
}

impl<T> PartialEq for ScheduledEvent<T> {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl<T> Eq for ScheduledEvent<T> {}

impl<T> PartialOrd for ScheduledEvent<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for ScheduledEvent<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest due first, then earliest inserted)
        other.due.cmp(&self.due).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Virtual-time event queue. Events fire in non-decreasing due order; events due at the
/// same tick fire in the order they were scheduled. Cancellation is lazy: cancelled events
/// stay in the heap and are discarded when they reach the top.
pub struct EventQueue<T> {
    heap: BinaryHeap<ScheduledEvent<T>>,
    cancelled: HashSet<u64>,
    event_sequence: u64,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            cancelled: HashSet::new(),
            event_sequence: 0,
        }
    }
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due: u64, item: T) -> TimerHandle {
        let seq = self.event_sequence;
        self.event_sequence = self.event_sequence.wrapping_add(1);
        self.heap.push(ScheduledEvent { due, seq, item });
        tracing::trace!("schedule: event {} due at {}", seq, due);
        TimerHandle(seq)
    }

    /// Cancels a pending event. Returns false if it already fired or was cancelled before.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let pending = self.heap.iter().any(|ev| ev.seq == handle.0);
        if !pending {
            return false;
        }
        self.cancelled.insert(handle.0)
    }

    /// Pops the earliest event due at or before `now`, skipping cancelled ones
    pub fn pop_due(&mut self, now: u64) -> Option<T> {
        while let Some(top) = self.heap.peek() {
            if top.due > now {
                return None;
            }
            let ev = self.heap.pop()?;
            if self.cancelled.remove(&ev.seq) {
                tracing::trace!("pop_due: dropping cancelled event {}", ev.seq);
                continue;
            }
            return Some(ev.item);
        }
        None
    }

    /// Due tick of the earliest pending (non-cancelled) event
    pub fn next_due(&self) -> Option<u64> {
        self.heap.iter()
            .filter(|ev| !self.cancelled.contains(&ev.seq))
            .map(|ev| ev.due)
            .min()
    }

    /// Number of pending, non-cancelled events
    pub fn len(&self) -> usize {
        self.heap.len() - self.cancelled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_in_time_then_insertion_order() {
        let mut q = EventQueue::new();
        q.schedule(5, "b");
        q.schedule(3, "a");
        q.schedule(5, "c");
        assert_eq!(q.next_due(), Some(3));

        assert_eq!(q.pop_due(2), None);
        assert_eq!(q.pop_due(4), Some("a"));
        assert_eq!(q.pop_due(4), None);
        assert_eq!(q.pop_due(5), Some("b"));
        assert_eq!(q.pop_due(5), Some("c"));
        assert!(q.is_empty());
    }

    #[test]
    fn test_cancel() {
        let mut q = EventQueue::new();
        let h1 = q.schedule(1, 1);
        q.schedule(1, 2);
        assert!(q.cancel(h1));
        assert!(!q.cancel(h1));
        assert_eq!(q.len(), 1);
        assert_eq!(q.pop_due(10), Some(2));
        assert_eq!(q.pop_due(10), None);

        // Fired events can no longer be cancelled
        let h3 = q.schedule(11, 3);
        assert_eq!(q.pop_due(11), Some(3));
        assert!(!q.cancel(h3));
        assert!(q.is_empty());
    }
}
