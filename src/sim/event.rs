use std::cmp::Ordering;
use super::Time;

/// Identifies a scheduled event, for cancellation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventHandle(pub(super) u64);

/// Event is sorted by `when`, then by insertion order.
/// Since `BinaryHeap` is a max-heap, and we want a min-heap, the comparison `Ord` is reversed.
pub struct Scheduled<E> {
    pub when: Time,
    pub id: EventHandle,
    pub event: E
}

impl<E> Scheduled<E> {
    fn key(&self) -> (Time, EventHandle) {
        (self.when, self.id)
    }
}

impl<E> PartialOrd for Scheduled<E> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<E> Ord for Scheduled<E> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl<E> PartialEq for Scheduled<E> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<E> Eq for Scheduled<E> {
}
