//! Per-flow statistics, collected as packets are sent, delivered and lost.

use std::collections::BTreeMap;
use std::fmt;
use bytesize::ByteSize;
use serde::Serialize;
use crate::net::FlowId;
use crate::sim::{Bytes, Time};

/// Counters of one flow. Only data packets are accounted; acknowledgments are not.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatsRecord {
    pub flow: FlowId,
    /// Bytes received by the sink, headers and duplicates included.
    pub bytes_delivered: Bytes,
    pub packets_delivered: u64,
    pub bytes_sent: Bytes,
    pub packets_sent: u64,
    /// Packets dropped by the loss model.
    pub packets_lost: u64,
    /// Packets dropped because a transmit queue was full.
    pub queue_drops: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    /// One-way delay of every delivered packet, in arrival order.
    pub delay_samples: Vec<Time>,
    pub first_rx: Option<Time>,
    pub last_rx: Option<Time>,
    pub last_update: Time,
}

/// Derived figures of one flow, computed once the run stopped.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlowSummary {
    pub flow: FlowId,
    pub bytes_delivered: Bytes,
    pub packets_delivered: u64,
    pub packets_sent: u64,
    pub packets_lost: u64,
    pub queue_drops: u64,
    pub retransmissions: u64,
    pub timeouts: u64,
    /// Delivered bits over the whole run duration.
    pub throughput_bps: f64,
    /// Delivered bits between the first and the last arrival.
    pub active_throughput_bps: f64,
    pub mean_delay: Option<Time>,
    pub p50_delay: Option<Time>,
    pub p95_delay: Option<Time>,
    pub p99_delay: Option<Time>,
    /// Lost packets (random loss and queue drops) over packets sent.
    pub loss_ratio: f64,
}

#[derive(Default)]
pub struct FlowStatsCollector {
    records: BTreeMap<FlowId, StatsRecord>,
}

impl FlowStatsCollector {
    fn record(&mut self, flow: FlowId, now: Time) -> &mut StatsRecord {
        let record = self.records.entry(flow).or_insert_with(|| StatsRecord::new(flow));
        record.last_update = now;
        record
    }

    /// Make `flow` appear in snapshots even if nothing happens to it.
    pub fn register(&mut self, flow: FlowId) {
        self.record(flow, Time::zero());
    }

    pub fn record_sent(&mut self, flow: FlowId, bytes: Bytes, now: Time) {
        let record = self.record(flow, now);
        record.bytes_sent += bytes;
        record.packets_sent += 1;
    }

    pub fn record_delivery(&mut self, flow: FlowId, delay: Time, bytes: Bytes, now: Time) {
        let record = self.record(flow, now);
        record.bytes_delivered += bytes;
        record.packets_delivered += 1;
        record.delay_samples.push(delay);
        record.first_rx.get_or_insert(now);
        record.last_rx = Some(now);
    }

    pub fn record_loss(&mut self, flow: FlowId, now: Time) {
        self.record(flow, now).packets_lost += 1;
    }

    pub fn record_queue_drop(&mut self, flow: FlowId, now: Time) {
        self.record(flow, now).queue_drops += 1;
    }

    pub fn record_retransmission(&mut self, flow: FlowId, now: Time) {
        self.record(flow, now).retransmissions += 1;
    }

    pub fn record_timeout(&mut self, flow: FlowId, now: Time) {
        self.record(flow, now).timeouts += 1;
    }

    pub fn get(&self, flow: FlowId) -> Option<&StatsRecord> {
        self.records.get(&flow)
    }

    pub fn snapshot(&self) -> BTreeMap<FlowId, StatsRecord> {
        self.records.clone()
    }

    pub fn summarize(&self, duration: Time) -> BTreeMap<FlowId, FlowSummary> {
        self.records
            .iter()
            .map(|(flow, record)| (*flow, record.summarize(duration)))
            .collect()
    }
}

fn bits_per_sec(bytes: Bytes, interval: Time) -> f64 {
    if interval.quanta() <= 0 {
        return 0.;
    }
    bytes as f64 * 8. / interval.as_secs_f64()
}

/// Nearest-rank percentile of sorted samples.
fn percentile(sorted: &[Time], p: f64) -> Option<Time> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p * sorted.len() as f64 / 100.).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

impl StatsRecord {
    pub fn new(flow: FlowId) -> Self {
        Self {
            flow,
            bytes_delivered: 0,
            packets_delivered: 0,
            bytes_sent: 0,
            packets_sent: 0,
            packets_lost: 0,
            queue_drops: 0,
            retransmissions: 0,
            timeouts: 0,
            delay_samples: Vec::new(),
            first_rx: None,
            last_rx: None,
            last_update: Time::zero(),
        }
    }

    pub fn summarize(&self, duration: Time) -> FlowSummary {
        let mut sorted = self.delay_samples.clone();
        sorted.sort_unstable();
        let mean_delay = if sorted.is_empty() {
            None
        } else {
            let total = sorted.iter().fold(Time::zero(), |acc, d| acc + *d);
            Some(total / sorted.len() as i128)
        };
        let active = match (self.first_rx, self.last_rx) {
            (Some(first), Some(last)) => last - first,
            _ => Time::zero(),
        };
        let dropped = self.packets_lost + self.queue_drops;
        FlowSummary {
            flow: self.flow,
            bytes_delivered: self.bytes_delivered,
            packets_delivered: self.packets_delivered,
            packets_sent: self.packets_sent,
            packets_lost: self.packets_lost,
            queue_drops: self.queue_drops,
            retransmissions: self.retransmissions,
            timeouts: self.timeouts,
            throughput_bps: bits_per_sec(self.bytes_delivered, duration),
            active_throughput_bps: bits_per_sec(self.bytes_delivered, active),
            mean_delay,
            p50_delay: percentile(&sorted, 50.),
            p95_delay: percentile(&sorted, 95.),
            p99_delay: percentile(&sorted, 99.),
            loss_ratio: if self.packets_sent == 0 { 0. } else { dropped as f64 / self.packets_sent as f64 },
        }
    }
}

impl fmt::Display for FlowSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let ms = |t: Option<Time>| t.map_or(f64::NAN, |t| t.as_millis_f64());
        write!(
            f,
            "{}: {} delivered, {:.3} Mbps, delay mean {:.1}ms p95 {:.1}ms, lost {} ({:.2}%), queue drops {}, rtx {}, rto {}",
            self.flow,
            ByteSize::b(self.bytes_delivered),
            self.throughput_bps / 1e6,
            ms(self.mean_delay),
            ms(self.p95_delay),
            self.packets_lost,
            self.loss_ratio * 100.,
            self.queue_drops,
            self.retransmissions,
            self.timeouts
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary() {
        let flow = FlowId(1);
        let mut stats = FlowStatsCollector::default();
        for i in 1..=100 {
            stats.record_sent(flow, 1000, Time::millis(i));
            stats.record_delivery(flow, Time::millis(i), 1000, Time::seconds(1) + Time::millis(i));
        }
        stats.record_sent(flow, 1000, Time::seconds(2));
        stats.record_loss(flow, Time::seconds(2));

        let summary = &stats.summarize(Time::seconds(10))[&flow];
        assert_eq!(summary.bytes_delivered, 100_000);
        assert_eq!(summary.throughput_bps, 80_000.);
        assert_eq!(summary.p50_delay, Some(Time::millis(50)));
        assert_eq!(summary.p95_delay, Some(Time::millis(95)));
        assert_eq!(summary.p99_delay, Some(Time::millis(99)));
        assert_eq!(summary.mean_delay, Some(Time::micros(50_500)));
        assert_eq!(summary.packets_lost, 1);
        assert!((summary.loss_ratio - 1. / 101.).abs() < 1e-12);
        // 99ms between first and last arrival
        assert!((summary.active_throughput_bps - 800_000. / 0.099).abs() < 1e-3);
    }

    #[test]
    fn registered_flows_appear_empty() {
        let mut stats = FlowStatsCollector::default();
        stats.register(FlowId(2));
        let snapshot = stats.snapshot();
        assert_eq!(snapshot[&FlowId(2)].flow, FlowId(2));
        assert_eq!(snapshot[&FlowId(2)].bytes_delivered, 0);
        let summary = &stats.summarize(Time::seconds(1))[&FlowId(2)];
        assert_eq!(summary.mean_delay, None);
        assert_eq!(summary.throughput_bps, 0.);
    }
}
