//! Sending side of a flow.
//!
//! Sequence numbers count segments. Every segment stays in `unacked` until the
//! cumulative acknowledgment passes it; a segment acknowledged selectively or
//! declared lost no longer counts as in flight.

use std::collections::{BTreeMap, BTreeSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use crate::context::{Event, SimulationContext};
use crate::error::Result;
use crate::net::{FlowId, NetworkGraph, NodeId, Packet, PacketKind, HEADER_BYTES};
use crate::sim::{Bytes, EventHandle, Time};
use super::congestion::{AckSample, Budget, CongestionController};
use super::rate::{RateSampler, SendSnapshot};
use super::rtt::RttEstimator;

/// TCP parameters shared by all flows.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Maximum segment payload.
    pub mss: Bytes,
    /// Unsent plus unacknowledged bytes the socket accepts from the application.
    pub send_buffer: Bytes,
    /// Segments acknowledged after a hole before the hole is declared lost.
    pub dup_ack_threshold: usize,
    pub initial_rto: f64,
    pub min_rto: f64,
    pub max_rto: f64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            mss: 536,
            send_buffer: 131_072,
            dup_ack_threshold: 3,
            initial_rto: 1.,
            min_rto: 0.2,
            max_rto: 60.,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SocketState {
    SlowStart,
    CongestionAvoidance,
    /// Repairing losses until everything sent before the episode is acknowledged.
    LossRecovery,
}

#[derive(Clone, Debug)]
struct Segment {
    /// Payload bytes.
    size: Bytes,
    sent_at: Time,
    /// Rank of the latest transmission among all the flow's transmissions.
    order: u64,
    sacked: bool,
    lost: bool,
    retransmitted: bool,
    snapshot: SendSnapshot,
}

/// Lowest factor the socket applies to the controller budget after timeouts.
const MIN_RTO_GAIN: f64 = 1. / 64.;
const MAX_BACKOFF: i128 = 1 << 10;

#[derive(Debug)]
pub struct TransportSocket {
    flow: FlowId,
    src: NodeId,
    dst: NodeId,
    config: SocketConfig,
    cc: Box<dyn CongestionController>,
    state: SocketState,
    /// Highest sequence sent when the current loss episode started.
    recover: u64,

    rtt: RttEstimator,
    rate: RateSampler,
    backoff: i128,
    rto_timer: Option<EventHandle>,
    /// Budget factor cut by timeouts, restored one round trip at a time.
    rto_gain: f64,
    gain_round_end: u64,

    next_seq: u64,
    transmissions: u64,
    unacked: BTreeMap<u64, Segment>,
    retransmit_queue: BTreeSet<u64>,
    bytes_in_flight: Bytes,
    unacked_bytes: Bytes,
    /// Written by the application, not sent yet.
    pending: Bytes,

    next_send_at: Time,
    pace_timer: Option<EventHandle>,
}

impl TransportSocket {
    pub fn new(flow: FlowId, src: NodeId, dst: NodeId, config: SocketConfig, cc: Box<dyn CongestionController>) -> Self {
        let rtt = RttEstimator::new(
            Time::from_secs_f64(config.initial_rto),
            Time::from_secs_f64(config.min_rto),
            Time::from_secs_f64(config.max_rto),
        );
        Self {
            flow,
            src,
            dst,
            config,
            cc,
            state: SocketState::SlowStart,
            recover: 0,
            rtt,
            rate: RateSampler::default(),
            backoff: 1,
            rto_timer: None,
            rto_gain: 1.,
            gain_round_end: 0,
            next_seq: 0,
            transmissions: 0,
            unacked: BTreeMap::new(),
            retransmit_queue: BTreeSet::new(),
            bytes_in_flight: 0,
            unacked_bytes: 0,
            pending: 0,
            next_send_at: Time::zero(),
            pace_timer: None,
        }
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn controller(&self) -> &dyn CongestionController {
        self.cc.as_ref()
    }

    pub fn bytes_in_flight(&self) -> Bytes {
        self.bytes_in_flight
    }

    pub fn pending(&self) -> Bytes {
        self.pending
    }

    pub fn smoothed_rtt(&self) -> Option<Time> {
        self.rtt.smoothed()
    }

    /// Budget actually enforced: the controller's, scaled down after timeouts.
    pub fn effective_budget(&self) -> Budget {
        self.cc.budget().scaled(self.rto_gain, self.config.mss)
    }

    /// Hand `bytes` of application data to the socket.
    /// Refused as a whole when the send buffer cannot hold it.
    pub fn write(&mut self, bytes: Bytes) -> bool {
        if self.pending + self.unacked_bytes + bytes > self.config.send_buffer {
            return false;
        }
        self.pending += bytes;
        true
    }

    /// Send lost segments, then new data, as long as the budget allows.
    pub fn try_send(&mut self, ctx: &mut SimulationContext, net: &mut NetworkGraph) -> Result<()> {
        loop {
            let now = ctx.now();
            let (seq, size, retransmit) = match self.retransmit_queue.first().copied() {
                Some(seq) => match self.unacked.get(&seq) {
                    Some(segment) => (seq, segment.size, true),
                    None => {
                        self.retransmit_queue.remove(&seq);
                        continue;
                    },
                },
                None if self.pending > 0 => (self.next_seq, self.pending.min(self.config.mss), false),
                None => break,
            };

            let budget = self.effective_budget();
            // one segment may always be outstanding
            if self.bytes_in_flight > 0 && self.bytes_in_flight + size > budget.window() {
                break;
            }
            let pacing = budget.pacing_rate().filter(|rate| !rate.is_zero());
            if pacing.is_some() && now < self.next_send_at {
                self.arm_pace_timer(ctx)?;
                break;
            }

            self.send_segment(ctx, net, seq, size, retransmit)?;
            if let Some(rate) = pacing {
                self.next_send_at = now + rate.bytes_tx_time(size + HEADER_BYTES);
            }
        }
        Ok(())
    }

    fn send_segment(&mut self, ctx: &mut SimulationContext, net: &mut NetworkGraph, seq: u64, size: Bytes, retransmit: bool) -> Result<()> {
        let now = ctx.now();
        let snapshot = self.rate.on_send(now, self.bytes_in_flight);
        self.transmissions += 1;
        let order = self.transmissions;
        if retransmit {
            self.retransmit_queue.remove(&seq);
            if let Some(segment) = self.unacked.get_mut(&seq) {
                segment.lost = false;
                segment.retransmitted = true;
                segment.sent_at = now;
                segment.order = order;
                segment.snapshot = snapshot;
            }
            ctx.stats.record_retransmission(self.flow, now);
        } else {
            self.unacked.insert(seq, Segment {
                size,
                sent_at: now,
                order,
                sacked: false,
                lost: false,
                retransmitted: false,
                snapshot,
            });
            self.next_seq += 1;
            self.pending -= size;
            self.unacked_bytes += size;
        }
        self.bytes_in_flight += size;

        let packet = Packet {
            id: ctx.next_packet_id(),
            flow: self.flow,
            src: self.src,
            dst: self.dst,
            size: size + HEADER_BYTES,
            sent_at: now,
            seq,
            kind: PacketKind::Data { payload: size, retransmit },
        };
        trace!(flow = %self.flow, seq, size, retransmit, in_flight = self.bytes_in_flight, "send");
        ctx.stats.record_sent(self.flow, packet.size, now);
        net.send(ctx, self.src, packet)?;

        if self.rto_timer.is_none() {
            self.restart_rto_timer(ctx)?;
        }
        Ok(())
    }

    /// Process an acknowledgment from the receiver.
    pub fn on_ack_received(&mut self, ctx: &mut SimulationContext, net: &mut NetworkGraph, ack: &Packet) -> Result<()> {
        let PacketKind::Ack { cumulative, sacked, echo } = ack.kind else {
            return Ok(());
        };
        let now = ctx.now();
        let mut newly_acked = 0;
        let mut latest: Option<SendSnapshot> = None;
        let mut account = |segment: &Segment, in_flight: &mut Bytes| {
            if segment.sacked {
                return;
            }
            newly_acked += segment.size;
            if !segment.lost {
                *in_flight -= segment.size;
            }
            if latest.is_none_or(|l| segment.snapshot.sent_time >= l.sent_time) {
                latest = Some(segment.snapshot);
            }
        };

        if let Some(segment) = self.unacked.get_mut(&sacked) {
            account(segment, &mut self.bytes_in_flight);
            segment.sacked = true;
            self.retransmit_queue.remove(&sacked);
        }
        let advanced = self.unacked.first_key_value().is_some_and(|(seq, _)| *seq < cumulative);
        while let Some(entry) = self.unacked.first_entry() {
            if *entry.key() >= cumulative {
                break;
            }
            let (seq, segment) = entry.remove_entry();
            account(&segment, &mut self.bytes_in_flight);
            self.unacked_bytes -= segment.size;
            self.retransmit_queue.remove(&seq);
        }

        let rtt = now - echo;
        self.rtt.update(rtt);
        let rate = latest.and_then(|snapshot| {
            self.rate.on_delivered(now, newly_acked);
            self.rate.sample(now, &snapshot)
        });

        if newly_acked > 0 {
            self.cc.on_ack(&AckSample {
                now,
                bytes_acked: newly_acked,
                rtt: Some(rtt),
                bytes_in_flight: self.bytes_in_flight,
                rate,
            });
        }

        if advanced {
            self.backoff = 1;
            if cumulative > self.gain_round_end && self.rto_gain < 1. {
                self.rto_gain = (self.rto_gain * 2.).min(1.);
                self.gain_round_end = self.next_seq;
            }
            if self.state == SocketState::LossRecovery && cumulative > self.recover {
                debug!(%now, flow = %self.flow, cumulative, "recovery complete");
                self.state = self.open_state();
            }
        }
        if self.state != SocketState::LossRecovery {
            self.state = self.open_state();
        }

        if self.detect_losses(ctx)? {
            // fast retransmit, whatever the budget
            if let Some(seq) = self.retransmit_queue.first().copied() {
                let size = self.unacked.get(&seq).map_or(0, |s| s.size);
                self.send_segment(ctx, net, seq, size, true)?;
            }
        }

        // any acknowledged segment, cumulative or selective, restarts the timer
        if self.unacked.is_empty() {
            self.cancel_rto_timer(ctx);
        } else if newly_acked > 0 {
            self.restart_rto_timer(ctx)?;
        }
        self.try_send(ctx, net)
    }

    fn open_state(&self) -> SocketState {
        if self.cc.in_slow_start() {
            SocketState::SlowStart
        } else {
            SocketState::CongestionAvoidance
        }
    }

    /// Declare lost every outstanding segment transmitted before at least
    /// `dup_ack_threshold` selectively acknowledged ones.
    /// Returns whether a loss episode started.
    fn detect_losses(&mut self, ctx: &mut SimulationContext) -> Result<bool> {
        let threshold = self.config.dup_ack_threshold.max(1);
        let mut sacked: Vec<u64> = self.unacked.values().filter(|s| s.sacked).map(|s| s.order).collect();
        if sacked.len() < threshold {
            return Ok(false);
        }
        sacked.sort_unstable_by(|a, b| b.cmp(a));
        let horizon = sacked[threshold - 1];
        let lost: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, s)| !s.sacked && !s.lost && s.order < horizon)
            .map(|(seq, _)| *seq)
            .collect();
        let mut started = false;
        for seq in lost {
            started |= self.on_loss_detected(ctx, seq)?;
        }
        Ok(started)
    }

    /// `seq` will not arrive: queue it for retransmission and, once per
    /// episode, let the controller react. Returns whether the episode starts here.
    pub fn on_loss_detected(&mut self, ctx: &mut SimulationContext, seq: u64) -> Result<bool> {
        let now = ctx.now();
        let Some(segment) = self.unacked.get_mut(&seq) else {
            return Ok(false);
        };
        if segment.sacked || segment.lost {
            return Ok(false);
        }
        segment.lost = true;
        self.bytes_in_flight -= segment.size;
        self.retransmit_queue.insert(seq);
        trace!(%now, flow = %self.flow, seq, sent_at = %segment.sent_at, retransmitted = segment.retransmitted, "segment lost");

        if self.state != SocketState::LossRecovery {
            self.cc.on_loss(now, self.bytes_in_flight);
            self.state = SocketState::LossRecovery;
            self.recover = self.next_seq.saturating_sub(1);
            debug!(%now, flow = %self.flow, seq, recover = self.recover, budget = ?self.cc.budget(), "entering loss recovery");
            return Ok(true);
        }
        Ok(false)
    }

    /// Nothing was acknowledged for a whole timeout.
    pub fn on_retransmit_timeout(&mut self, ctx: &mut SimulationContext, net: &mut NetworkGraph) -> Result<()> {
        self.rto_timer = None;
        if self.unacked.is_empty() {
            return Ok(());
        }
        let now = ctx.now();
        ctx.stats.record_timeout(self.flow, now);

        self.rto_gain = (self.rto_gain / 2.).max(MIN_RTO_GAIN);
        self.gain_round_end = self.next_seq;
        self.backoff = (self.backoff * 2).min(MAX_BACKOFF);

        let in_flight = self.bytes_in_flight;
        for (seq, segment) in self.unacked.iter_mut() {
            if !segment.sacked && !segment.lost {
                segment.lost = true;
                self.retransmit_queue.insert(*seq);
            }
        }
        self.bytes_in_flight = 0;
        if self.state != SocketState::LossRecovery {
            self.cc.on_loss(now, in_flight);
        }
        self.state = SocketState::LossRecovery;
        self.recover = self.next_seq.saturating_sub(1);
        debug!(%now, flow = %self.flow, gain = self.rto_gain, rto = %self.current_rto(), "retransmission timeout");

        if let Some(oldest) = self.retransmit_queue.first().copied() {
            let size = self.unacked.get(&oldest).map_or(0, |s| s.size);
            self.send_segment(ctx, net, oldest, size, true)?;
        }
        self.restart_rto_timer(ctx)?;
        self.try_send(ctx, net)
    }

    /// The pacing delay elapsed.
    pub fn on_pace_release(&mut self, ctx: &mut SimulationContext, net: &mut NetworkGraph) -> Result<()> {
        self.pace_timer = None;
        self.try_send(ctx, net)
    }

    fn current_rto(&self) -> Time {
        (self.rtt.rto() * self.backoff).min(self.rtt.max_rto())
    }

    fn restart_rto_timer(&mut self, ctx: &mut SimulationContext) -> Result<()> {
        self.cancel_rto_timer(ctx);
        let handle = ctx.queue.schedule(self.current_rto(), Event::RetransmitTimeout { flow: self.flow })?;
        self.rto_timer = Some(handle);
        Ok(())
    }

    fn cancel_rto_timer(&mut self, ctx: &mut SimulationContext) {
        if let Some(handle) = self.rto_timer.take() {
            ctx.queue.cancel(handle);
        }
    }

    fn arm_pace_timer(&mut self, ctx: &mut SimulationContext) -> Result<()> {
        if self.pace_timer.is_none() {
            let handle = ctx.queue.schedule_at(self.next_send_at, Event::PaceRelease { flow: self.flow })?;
            self.pace_timer = Some(handle);
        }
        Ok(())
    }
}
