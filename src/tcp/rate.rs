//! Delivery rate estimation: each segment remembers how much had been
//! delivered when it was sent, and its acknowledgment yields the rate
//! observed over that interval.

use crate::sim::{Bw, Bytes, Time};

/// Delivery state captured when a segment is sent.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SendSnapshot {
    pub delivered: Bytes,
    pub delivered_time: Time,
    pub first_sent_time: Time,
    pub sent_time: Time,
}

/// One delivery rate measurement.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RateSample {
    /// Total bytes delivered when the measured segment was sent.
    pub prior_delivered: Bytes,
    /// Total bytes delivered now.
    pub delivered: Bytes,
    pub interval: Time,
    pub delivery_rate: Bw,
}

#[derive(Clone, Debug, Default)]
pub struct RateSampler {
    delivered: Bytes,
    delivered_time: Time,
    first_sent_time: Time,
}

impl RateSampler {
    pub fn delivered(&self) -> Bytes {
        self.delivered
    }

    /// Record a transmission. When nothing is in flight, a new measurement interval starts.
    pub fn on_send(&mut self, now: Time, bytes_in_flight: Bytes) -> SendSnapshot {
        if bytes_in_flight == 0 {
            self.first_sent_time = now;
            self.delivered_time = now;
        }
        SendSnapshot {
            delivered: self.delivered,
            delivered_time: self.delivered_time,
            first_sent_time: self.first_sent_time,
            sent_time: now,
        }
    }

    /// Account `bytes` newly delivered at `now`.
    pub fn on_delivered(&mut self, now: Time, bytes: Bytes) {
        self.delivered += bytes;
        self.delivered_time = now;
    }

    /// Build a sample from the most recently sent segment among those just delivered.
    /// The interval is the longer of the send and ack intervals, so that ACK
    /// compression cannot inflate the rate.
    pub fn sample(&mut self, now: Time, latest: &SendSnapshot) -> Option<RateSample> {
        self.first_sent_time = latest.sent_time;
        let send_elapsed = latest.sent_time - latest.first_sent_time;
        let ack_elapsed = now - latest.delivered_time;
        let interval = Time::max(send_elapsed, ack_elapsed);
        if interval.quanta() <= 0 {
            return None;
        }
        let bytes = self.delivered - latest.delivered;
        Some(RateSample {
            prior_delivered: latest.delivered,
            delivered: self.delivered,
            interval,
            delivery_rate: Bw::from_bytes_over(bytes, interval),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_rate() {
        let mut rate = RateSampler::default();
        // one 1250 byte segment per ms, each acked 100ms later: 10Mbps
        let mut sent = vec![];
        for i in 0..300 {
            let now = Time::millis(i);
            if i >= 100 {
                let snapshot: SendSnapshot = sent[(i - 100) as usize];
                rate.on_delivered(now, 1250);
                let sample = rate.sample(now, &snapshot);
                if i >= 200 {
                    let sample = sample.unwrap();
                    assert_eq!(sample.delivery_rate, Bw::from_mbits(10));
                }
            }
            let in_flight = if i == 0 { 0 } else { 1250 };
            sent.push(rate.on_send(now, in_flight));
        }
        assert_eq!(rate.delivered(), 200 * 1250);
    }
}
