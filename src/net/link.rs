use std::collections::VecDeque;
use crate::error::ConfigError;
use crate::loss::{LossConfig, LossModel};
use crate::sim::{Bw, Bytes, Time};
use super::NodeId;

/// Fixed characteristics of a directed link.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinkState {
    pub bandwidth: Bw,
    pub delay: Time,
    pub loss: LossConfig,
    /// Packets that may wait or be in transmission at once.
    pub queue_limit: usize,
}

impl LinkState {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bandwidth.is_zero() {
            return Err(ConfigError::ZeroBandwidth);
        }
        if self.delay.is_negative() {
            return Err(ConfigError::InvalidDelay(self.delay.as_secs_f64()));
        }
        if self.queue_limit == 0 {
            return Err(ConfigError::ZeroQueueLimit);
        }
        self.loss.validate()
    }

    /// Time to put `bytes` on the wire.
    pub fn serialization_delay(&self, bytes: Bytes) -> Time {
        self.bandwidth.bytes_tx_time(bytes)
    }
}

/// Directed point-to-point link with a FIFO drop-tail transmitter.
#[derive(Debug)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    state: LinkState,
    loss: LossModel,
    /// When the transmitter finishes its last accepted packet.
    busy_until: Time,
    /// Completion time of every packet still queued or in transmission.
    departures: VecDeque<Time>,
}

impl Link {
    pub fn new(from: NodeId, to: NodeId, state: LinkState) -> Self {
        Self {
            from,
            to,
            state,
            loss: LossModel::new(state.loss),
            busy_until: Time::zero(),
            departures: VecDeque::new(),
        }
    }

    pub fn state(&self) -> &LinkState {
        &self.state
    }

    pub(super) fn loss_mut(&mut self) -> &mut LossModel {
        &mut self.loss
    }

    /// Packets queued or in transmission at `now`.
    pub fn backlog(&mut self, now: Time) -> usize {
        while self.departures.front().is_some_and(|done| *done <= now) {
            self.departures.pop_front();
        }
        self.departures.len()
    }

    /// Accept `bytes` for transmission behind the current backlog.
    /// Returns when the last bit leaves the sender, or `None` if the queue is full.
    pub fn enqueue(&mut self, bytes: Bytes, now: Time) -> Option<Time> {
        if self.backlog(now) >= self.state.queue_limit {
            return None;
        }
        let start = Time::max(now, self.busy_until);
        let done = start + self.state.serialization_delay(bytes);
        self.busy_until = done;
        self.departures.push_back(done);
        Some(done)
    }
}
