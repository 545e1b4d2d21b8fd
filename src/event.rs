use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashSet};

use crate::types::Tick;

/// Handle for a scheduled event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

/// Discrete-event scheduler as seen by a component.
pub trait Scheduler<E> {
    fn now(&self) -> Tick;

    /// Run `event` at `when`, which must not be in the past.
    fn schedule(&mut self, when: Tick, event: E) -> EventId;

    /// Cancel a pending event. Returns false if it already ran or was cancelled.
    fn deschedule(&mut self, id: EventId) -> bool;
}

struct Entry<E> {
    when: Tick,
    id: EventId,
    event: E,
}

impl<E> PartialEq for Entry<E> {
    fn eq(&self, other: &Self) -> bool {
        (self.when, self.id) == (other.when, other.id)
    }
}

impl<E> Eq for Entry<E> {}

impl<E> PartialOrd for Entry<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Entry<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.when, self.id).cmp(&(other.when, other.id))
    }
}

/// Time-ordered event queue. Events at the same tick run in the order they
/// were scheduled.
pub struct EventQueue<E> {
    now: Tick,
    next_id: u64,
    heap: BinaryHeap<Reverse<Entry<E>>>,
    pending: HashSet<EventId>,
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        EventQueue {
            now: 0,
            next_id: 0,
            heap: BinaryHeap::new(),
            pending: HashSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Time of the next live event.
    pub fn peek_time(&mut self) -> Option<Tick> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if self.pending.contains(&entry.id) {
                return Some(entry.when);
            }
            self.heap.pop();
        }
        None
    }

    /// Take the next live event and advance time to it.
    pub fn pop(&mut self) -> Option<(Tick, E)> {
        while let Some(Reverse(entry)) = self.heap.pop() {
            if self.pending.remove(&entry.id) {
                self.now = entry.when;
                return Some((entry.when, entry.event));
            }
        }
        None
    }
}

impl<E: PartialEq> EventQueue<E> {
    /// True if an equal event is still pending.
    pub fn contains(&self, event: &E) -> bool {
        self.heap
            .iter()
            .any(|Reverse(entry)| self.pending.contains(&entry.id) && entry.event == *event)
    }
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Scheduler<E> for EventQueue<E> {
    fn now(&self) -> Tick {
        self.now
    }

    fn schedule(&mut self, when: Tick, event: E) -> EventId {
        assert!(
            when >= self.now,
            "event scheduled in the past ({when} < {})",
            self.now
        );
        let id = EventId(self.next_id);
        self.next_id += 1;
        self.pending.insert(id);
        self.heap.push(Reverse(Entry { when, id, event }));
        id
    }

    fn deschedule(&mut self, id: EventId) -> bool {
        self.pending.remove(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_time_then_insertion_order() {
        let mut q = EventQueue::new();
        q.schedule(5, "c");
        q.schedule(1, "a");
        q.schedule(5, "d");
        q.schedule(3, "b");
        let order: Vec<_> = std::iter::from_fn(|| q.pop()).collect();
        assert_eq!(order, vec![(1, "a"), (3, "b"), (5, "c"), (5, "d")]);
        assert_eq!(q.now(), 5);
        assert!(q.is_empty());
    }

    #[test]
    fn descheduled_events_never_fire() {
        let mut q = EventQueue::new();
        let a = q.schedule(1, 'a');
        q.schedule(2, 'b');
        assert!(q.deschedule(a));
        assert!(!q.deschedule(a));
        assert_eq!(q.len(), 1);
        assert!(!q.contains(&'a'));
        assert!(q.contains(&'b'));
        assert_eq!(q.peek_time(), Some(2));
        assert_eq!(q.pop(), Some((2, 'b')));
        assert_eq!(q.pop(), None);
    }

    #[test]
    #[should_panic(expected = "in the past")]
    fn scheduling_in_the_past_panics() {
        let mut q = EventQueue::new();
        q.schedule(10, ());
        q.pop();
        q.schedule(9, ());
    }
}
