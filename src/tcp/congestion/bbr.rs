//! Bandwidth and RTT probing congestion control, after BBR v1.
//!
//! The controller keeps a model of the path: the bottleneck bandwidth (max
//! delivery rate over the last rounds) and the propagation delay (min RTT over
//! the last seconds). It paces at a multiple of the bandwidth estimate and
//! caps the data in flight at a multiple of the bandwidth-delay product.
//! Losses do not change the model.

use rand::Rng;
use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::Serialize;
use tracing::debug;
use crate::sim::{Bw, Bytes, Time};
use super::filter::MaxFilter;
use super::{AckSample, Budget, CongestionController};

/// 2 / ln(2): the smallest gain that doubles the delivery rate every round.
const STARTUP_GAIN: f64 = 2.885;
const DRAIN_GAIN: f64 = 1. / STARTUP_GAIN;
const CWND_GAIN: f64 = 2.;
const PROBE_BW_GAINS: [f64; 8] = [1.25, 0.75, 1., 1., 1., 1., 1., 1.];
/// Index of the phase that drains the queue built while probing.
const PROBE_BW_DRAIN_PHASE: usize = 1;
/// Bandwidth samples are remembered for this many rounds.
const BW_WINDOW_ROUNDS: u64 = 10;
const MIN_RTT_WINDOW: Time = Time::seconds(10);
const PROBE_RTT_DURATION: Time = Time::millis(200);
/// Startup ends when the bandwidth grew by less than this factor...
const FULL_BW_GROWTH: f64 = 1.25;
/// ...for this many rounds in a row.
const FULL_BW_ROUNDS: u32 = 3;
const MIN_PIPE_SEGMENTS: Bytes = 4;
const INITIAL_WINDOW_SEGMENTS: Bytes = 10;
/// Extra room for delayed and aggregated acknowledgments, in segments.
const CWND_QUANTA_SEGMENTS: Bytes = 3;
/// Pacing reference before any RTT was measured.
const DEFAULT_RTT: Time = Time::millis(1);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
pub enum BbrMode {
    /// Exponential search for the bottleneck bandwidth.
    Startup,
    /// Empty the queue built during startup.
    Drain,
    /// Pace at the estimated bandwidth, periodically probing above it.
    ProbeBw,
    /// Shrink the window to measure the propagation delay again.
    ProbeRtt,
}

#[derive(Clone, Debug)]
pub struct Bbr {
    mss: Bytes,
    mode: BbrMode,
    rng: Xoshiro256PlusPlus,

    bw_filter: MaxFilter<Bw>,
    btl_bw: Bw,
    min_rtt: Option<Time>,
    min_rtt_stamp: Time,

    delivered: Bytes,
    round_count: u64,
    next_round_delivered: Bytes,
    round_start: bool,

    full_bw: Bw,
    full_bw_rounds: u32,
    filled_pipe: bool,

    cycle_index: usize,
    cycle_stamp: Time,

    probe_rtt_done: Option<Time>,
    probe_rtt_round_done: bool,
    prior_cwnd: Bytes,

    pacing_gain: f64,
    cwnd_gain: f64,
    pacing_rate: Bw,
    cwnd: Bytes,
}

impl Bbr {
    pub fn new(mss: Bytes, seed: u64) -> Self {
        let cwnd = INITIAL_WINDOW_SEGMENTS * mss;
        Self {
            mss,
            mode: BbrMode::Startup,
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            bw_filter: MaxFilter::new(BW_WINDOW_ROUNDS),
            btl_bw: Bw::ZERO,
            min_rtt: None,
            min_rtt_stamp: Time::zero(),
            delivered: 0,
            round_count: 0,
            next_round_delivered: 0,
            round_start: false,
            full_bw: Bw::ZERO,
            full_bw_rounds: 0,
            filled_pipe: false,
            cycle_index: 0,
            cycle_stamp: Time::zero(),
            probe_rtt_done: None,
            probe_rtt_round_done: false,
            prior_cwnd: 0,
            pacing_gain: STARTUP_GAIN,
            cwnd_gain: STARTUP_GAIN,
            pacing_rate: Bw::from_bytes_over(cwnd, DEFAULT_RTT).scale(STARTUP_GAIN),
            cwnd,
        }
    }

    pub fn mode(&self) -> BbrMode {
        self.mode
    }

    pub fn bandwidth_estimate(&self) -> Bw {
        self.btl_bw
    }

    pub fn min_rtt(&self) -> Option<Time> {
        self.min_rtt
    }

    pub fn pacing_gain(&self) -> f64 {
        self.pacing_gain
    }

    pub fn cwnd(&self) -> Bytes {
        self.cwnd
    }

    pub fn round_count(&self) -> u64 {
        self.round_count
    }

    fn min_pipe(&self) -> Bytes {
        MIN_PIPE_SEGMENTS * self.mss
    }

    /// Bandwidth-delay product scaled by `gain`, if the model has both terms.
    fn bdp(&self, gain: f64) -> Option<Bytes> {
        let min_rtt = self.min_rtt?;
        if self.btl_bw.is_zero() {
            return None;
        }
        Some((self.btl_bw.bytes_in(min_rtt) as f64 * gain) as Bytes)
    }

    fn set_mode(&mut self, mode: BbrMode, now: Time) {
        debug!(%now, from = ?self.mode, to = ?mode, btl_bw = %self.btl_bw, min_rtt = ?self.min_rtt, "bbr: mode change");
        self.mode = mode;
    }

    fn update_round(&mut self, ack: &AckSample) {
        self.delivered += ack.bytes_acked;
        self.round_start = false;
        if let Some(rate) = ack.rate {
            if rate.prior_delivered >= self.next_round_delivered {
                self.next_round_delivered = self.delivered;
                self.round_count += 1;
                self.round_start = true;
            }
        }
    }

    fn update_btl_bw(&mut self, ack: &AckSample) {
        let Some(rate) = ack.rate else {
            return;
        };
        self.bw_filter.update(self.round_count, rate.delivery_rate);
        match self.mode {
            // only grows while searching
            BbrMode::Startup => self.btl_bw = self.btl_bw.max(rate.delivery_rate),
            // held at the startup plateau
            BbrMode::Drain => {},
            BbrMode::ProbeBw | BbrMode::ProbeRtt => {
                self.btl_bw = self.bw_filter.get().unwrap_or(self.btl_bw);
            },
        }
    }

    fn enter_startup(&mut self, now: Time) {
        self.set_mode(BbrMode::Startup, now);
        self.pacing_gain = STARTUP_GAIN;
        self.cwnd_gain = STARTUP_GAIN;
    }

    fn enter_probe_bw(&mut self, now: Time) {
        self.set_mode(BbrMode::ProbeBw, now);
        self.cwnd_gain = CWND_GAIN;
        // random phase, but never the draining one
        let r = self.rng.random_range(0..PROBE_BW_GAINS.len() - 1);
        self.cycle_index = if r >= PROBE_BW_DRAIN_PHASE { r + 1 } else { r };
        self.cycle_stamp = now;
        self.pacing_gain = PROBE_BW_GAINS[self.cycle_index];
    }

    fn check_cycle_phase(&mut self, ack: &AckSample) {
        if self.mode != BbrMode::ProbeBw {
            return;
        }
        let Some(min_rtt) = self.min_rtt else {
            return;
        };
        let elapsed = ack.now - self.cycle_stamp;
        let full_length = elapsed > min_rtt;
        let advance = if self.pacing_gain > 1. {
            // probe until the extra data is in flight, for two round trips at most
            full_length && (self.bdp(self.pacing_gain).is_some_and(|t| ack.bytes_in_flight >= t) || elapsed > min_rtt * 2)
        } else if self.pacing_gain < 1. {
            full_length || self.bdp(1.).is_some_and(|t| ack.bytes_in_flight <= t)
        } else {
            full_length
        };
        if advance {
            self.cycle_index = (self.cycle_index + 1) % PROBE_BW_GAINS.len();
            self.cycle_stamp = ack.now;
            self.pacing_gain = PROBE_BW_GAINS[self.cycle_index];
        }
    }

    fn check_full_pipe(&mut self) {
        if self.filled_pipe || !self.round_start {
            return;
        }
        if self.btl_bw >= self.full_bw.scale(FULL_BW_GROWTH) && !self.btl_bw.is_zero() {
            self.full_bw = self.btl_bw;
            self.full_bw_rounds = 0;
            return;
        }
        self.full_bw_rounds += 1;
        if self.full_bw_rounds >= FULL_BW_ROUNDS {
            self.filled_pipe = true;
        }
    }

    fn check_drain(&mut self, ack: &AckSample) {
        if self.mode == BbrMode::Startup && self.filled_pipe {
            self.set_mode(BbrMode::Drain, ack.now);
            self.pacing_gain = DRAIN_GAIN;
            self.cwnd_gain = STARTUP_GAIN;
        }
        if self.mode == BbrMode::Drain && self.bdp(1.).is_some_and(|bdp| ack.bytes_in_flight <= bdp) {
            self.enter_probe_bw(ack.now);
        }
    }

    fn update_min_rtt(&mut self, ack: &AckSample) {
        let expired = ack.now > self.min_rtt_stamp + MIN_RTT_WINDOW;
        if let Some(rtt) = ack.rtt {
            if self.min_rtt.is_none_or(|m| rtt <= m) || expired {
                self.min_rtt = Some(rtt);
                self.min_rtt_stamp = ack.now;
            }
        }
        if expired && self.mode != BbrMode::ProbeRtt {
            self.set_mode(BbrMode::ProbeRtt, ack.now);
            self.pacing_gain = 1.;
            self.cwnd_gain = 1.;
            self.prior_cwnd = self.cwnd;
            self.probe_rtt_done = None;
        }
    }

    fn check_probe_rtt(&mut self, ack: &AckSample) {
        if self.mode != BbrMode::ProbeRtt {
            return;
        }
        match self.probe_rtt_done {
            None => {
                if ack.bytes_in_flight <= self.min_pipe() {
                    self.probe_rtt_done = Some(ack.now + PROBE_RTT_DURATION);
                    self.probe_rtt_round_done = false;
                    self.next_round_delivered = self.delivered;
                }
            },
            Some(done) => {
                if self.round_start {
                    self.probe_rtt_round_done = true;
                }
                if self.probe_rtt_round_done && ack.now >= done {
                    self.min_rtt_stamp = ack.now;
                    self.cwnd = self.cwnd.max(self.prior_cwnd);
                    if self.filled_pipe {
                        self.enter_probe_bw(ack.now);
                    } else {
                        self.enter_startup(ack.now);
                    }
                }
            },
        }
    }

    fn set_pacing_rate(&mut self, ack: &AckSample) {
        let rate = if self.btl_bw.is_zero() {
            let rtt = self.min_rtt.or(ack.rtt).unwrap_or(DEFAULT_RTT);
            Bw::from_bytes_over(self.cwnd, rtt).scale(self.pacing_gain)
        } else {
            self.btl_bw.scale(self.pacing_gain)
        };
        if self.filled_pipe || rate > self.pacing_rate {
            self.pacing_rate = rate;
        }
    }

    fn set_cwnd(&mut self, ack: &AckSample) {
        let initial = INITIAL_WINDOW_SEGMENTS * self.mss;
        let target = self
            .bdp(self.cwnd_gain)
            .map_or(initial, |bdp| bdp + CWND_QUANTA_SEGMENTS * self.mss);
        if self.filled_pipe {
            self.cwnd = (self.cwnd + ack.bytes_acked).min(target);
        } else if self.cwnd < target || self.delivered < initial {
            self.cwnd += ack.bytes_acked;
        }
        self.cwnd = self.cwnd.max(self.min_pipe());
        if self.mode == BbrMode::ProbeRtt {
            self.cwnd = self.cwnd.min(self.min_pipe());
        }
    }
}

impl CongestionController for Bbr {
    fn on_ack(&mut self, ack: &AckSample) -> Budget {
        self.update_round(ack);
        self.update_btl_bw(ack);
        self.check_cycle_phase(ack);
        self.check_full_pipe();
        self.check_drain(ack);
        self.update_min_rtt(ack);
        self.check_probe_rtt(ack);
        self.set_pacing_rate(ack);
        self.set_cwnd(ack);
        self.budget()
    }

    fn on_loss(&mut self, now: Time, bytes_in_flight: Bytes) -> Budget {
        debug!(%now, bytes_in_flight, mode = ?self.mode, "bbr: loss ignored by the model");
        self.budget()
    }

    fn budget(&self) -> Budget {
        Budget::Paced { rate: self.pacing_rate, window: self.cwnd }
    }

    fn in_slow_start(&self) -> bool {
        self.mode == BbrMode::Startup
    }

    fn name(&self) -> &'static str {
        "bbr"
    }
}
