use std::collections::{BinaryHeap, HashSet};
use tracing::trace;
use crate::error::Error;
use super::event::{EventHandle, Scheduled};
use super::Time;

/// Time-ordered queue of pending events.
///
/// `E` is the event payload; the queue never looks inside it; whoever pops an
/// event decides what to do with it.
/// Events scheduled for the same instant run in the order they were scheduled.
pub struct EventQueue<E> {
    heap: BinaryHeap<Scheduled<E>>,
    /// Events that are scheduled and neither fired nor cancelled.
    /// Cancelled entries stay in the heap and are skipped when they surface.
    live: HashSet<EventHandle>,
    now: Time,
    next_id: u64
}

impl<E> Default for EventQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EventQueue<E> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            now: Time::zero(),
            next_id: 0
        }
    }

    /// Current virtual time.
    pub fn now(&self) -> Time {
        self.now
    }

    /// Count of events still waiting to fire.
    pub fn pending(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Schedule `event` to fire `delay` after the current time.
    pub fn schedule(&mut self, delay: Time, event: E) -> Result<EventHandle, Error> {
        if delay.is_negative() {
            return Err(Error::NegativeDelay { delay });
        }
        Ok(self.push(self.now + delay, event))
    }

    /// Schedule `event` at the absolute time `when`, which must not be in the past.
    pub fn schedule_at(&mut self, when: Time, event: E) -> Result<EventHandle, Error> {
        self.schedule(when - self.now, event)
    }

    fn push(&mut self, when: Time, event: E) -> EventHandle {
        let id = EventHandle(self.next_id);
        self.next_id += 1;
        self.live.insert(id);
        self.heap.push(Scheduled { when, id, event });
        id
    }

    /// Cancel a pending event.
    /// Returns whether the event was still pending; cancelling twice, or after
    /// the event fired, does nothing.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        self.live.remove(&handle)
    }

    /// Time of the next live event.
    pub fn peek_time(&mut self) -> Option<Time> {
        self.discard_cancelled();
        self.heap.peek().map(|s| s.when)
    }

    fn discard_cancelled(&mut self) {
        while let Some(top) = self.heap.peek() {
            if self.live.contains(&top.id) {
                break;
            }
            self.heap.pop();
        }
    }

    /// Pop the next event if it is due no later than `stop`, advancing the clock to it.
    /// When nothing is due, the clock is moved to `stop` and `None` is returned.
    pub fn pop_until(&mut self, stop: Time) -> Option<(Time, E)> {
        match self.peek_time() {
            Some(when) if when <= stop => {
                let next = self.heap.pop()?;
                self.live.remove(&next.id);
                self.now = next.when;
                trace!(when = %next.when, id = next.id.0, "event");
                Some((next.when, next.event))
            },
            _ => {
                self.now = self.now.max(stop);
                None
            }
        }
    }

    /// Run every event due no later than `stop`, in order.
    /// `handler` may schedule further events; those are run as well if they are due.
    /// Events after `stop` are left pending.
    pub fn run_until<F>(&mut self, stop: Time, mut handler: F)
    where
        F: FnMut(&mut Self, E)
    {
        while let Some((_, event)) = self.pop_until(stop) {
            handler(self, event);
        }
    }

    /// Drop every pending event.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}
