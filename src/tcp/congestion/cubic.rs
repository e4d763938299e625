//! Loss-based congestion control with cubic window growth (RFC 8312).
//!
//! After a loss the window is cut by `BETA`, then grows along
//! `W(t) = C * (t - K)^3 + W_last`: quickly while far below the window at
//! which the last loss happened, slowly around it, and faster again once past it.

use tracing::debug;
use crate::sim::{Bytes, Time};
use super::{AckSample, Budget, CongestionController};

/// Multiplicative decrease factor.
pub const BETA: f64 = 0.7;
/// Cubic scaling constant, in segments per second cubed.
const C: f64 = 0.4;
const INITIAL_WINDOW_SEGMENTS: Bytes = 10;
const MIN_WINDOW_SEGMENTS: Bytes = 2;

#[derive(Clone, Debug)]
pub struct Cubic {
    mss: Bytes,
    cwnd: Bytes,
    ssthresh: Bytes,
    /// Window when the last loss happened.
    last_loss_window: Bytes,
    /// Start of the current growth period.
    epoch: Option<Time>,
    /// Time to reach `last_loss_window` from the start of the epoch, in seconds.
    k: f64,
    /// Plateau of the curve, in segments.
    origin: f64,
    /// Window of an equivalent Reno flow, to stay at least as aggressive as Reno.
    reno_window: f64,
    min_rtt: Option<Time>,
}

impl Cubic {
    pub fn new(mss: Bytes) -> Self {
        Self {
            mss,
            cwnd: INITIAL_WINDOW_SEGMENTS * mss,
            ssthresh: Bytes::MAX,
            last_loss_window: 0,
            epoch: None,
            k: 0.,
            origin: 0.,
            reno_window: 0.,
            min_rtt: None,
        }
    }

    pub fn cwnd(&self) -> Bytes {
        self.cwnd
    }

    pub fn ssthresh(&self) -> Bytes {
        self.ssthresh
    }

    pub fn last_loss_window(&self) -> Bytes {
        self.last_loss_window
    }

    /// Window targeted by the cubic curve `t` seconds after the start of the epoch, in bytes.
    fn target(&self, t: f64) -> f64 {
        (C * (t - self.k).powi(3) + self.origin) * self.mss as f64
    }

    fn start_epoch(&mut self, now: Time) {
        self.epoch = Some(now);
        self.reno_window = self.cwnd as f64;
        self.origin = self.last_loss_window.max(self.cwnd) as f64 / self.mss as f64;
        self.k = if self.last_loss_window > self.cwnd {
            let gap = (self.last_loss_window - self.cwnd) as f64 / self.mss as f64;
            (gap / C).cbrt()
        } else {
            0.
        };
    }

    fn congestion_avoidance(&mut self, ack: &AckSample) {
        let epoch = match self.epoch {
            Some(epoch) => epoch,
            None => {
                self.start_epoch(ack.now);
                ack.now
            }
        };
        let cwnd = self.cwnd as f64;
        let acked = ack.bytes_acked as f64;
        let rtt = self.min_rtt.map_or(0., |t| t.as_secs_f64());

        // where the curve will be one round trip from now
        let t = (ack.now - epoch).as_secs_f64() + rtt;
        let target = self.target(t);
        let mut next = if target > cwnd {
            // never more than half the acknowledged bytes at once
            cwnd + ((target - cwnd) / cwnd * acked).min(acked / 2.)
        } else {
            // plateau around the last loss window
            cwnd + acked * self.mss as f64 / (100. * cwnd)
        };

        let alpha = 3. * (1. - BETA) / (1. + BETA);
        self.reno_window += alpha * self.mss as f64 * acked / self.reno_window.max(1.);
        if self.reno_window > next {
            next = self.reno_window;
        }
        self.cwnd = next as Bytes;
    }
}

impl CongestionController for Cubic {
    fn on_ack(&mut self, ack: &AckSample) -> Budget {
        if let Some(rtt) = ack.rtt {
            self.min_rtt = Some(self.min_rtt.map_or(rtt, |m| m.min(rtt)));
        }
        if ack.bytes_acked == 0 {
            return self.budget();
        }
        if self.cwnd < self.ssthresh {
            self.cwnd = (self.cwnd + ack.bytes_acked).min(self.ssthresh);
        } else {
            self.congestion_avoidance(ack);
        }
        self.budget()
    }

    fn on_loss(&mut self, now: Time, bytes_in_flight: Bytes) -> Budget {
        self.last_loss_window = self.cwnd;
        self.cwnd = ((self.cwnd as f64 * BETA) as Bytes).max(MIN_WINDOW_SEGMENTS * self.mss);
        self.ssthresh = self.cwnd;
        self.epoch = None;
        debug!(%now, last_loss_window = self.last_loss_window, cwnd = self.cwnd, bytes_in_flight, "cubic: window reduced");
        self.budget()
    }

    fn budget(&self) -> Budget {
        Budget::Window { cwnd: self.cwnd }
    }

    fn in_slow_start(&self) -> bool {
        self.cwnd < self.ssthresh
    }

    fn name(&self) -> &'static str {
        "cubic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSS: Bytes = 1000;

    fn ack(now: Time, bytes_acked: Bytes) -> AckSample {
        AckSample {
            now,
            bytes_acked,
            rtt: Some(Time::millis(100)),
            bytes_in_flight: 0,
            rate: None,
        }
    }

    /// Feed one full window of acknowledgments per round trip, `rounds` times.
    fn grow(cubic: &mut Cubic, start: Time, rounds: i128) -> Time {
        let mut now = start;
        for _ in 0..rounds {
            now += Time::millis(100);
            let segments = cubic.cwnd() / MSS;
            for _ in 0..segments {
                cubic.on_ack(&ack(now, MSS));
            }
        }
        now
    }

    #[test]
    fn slow_start_doubles() {
        let mut cubic = Cubic::new(MSS);
        assert_eq!(cubic.cwnd(), 10 * MSS);
        grow(&mut cubic, Time::zero(), 3);
        assert_eq!(cubic.cwnd(), 80 * MSS);
        assert!(cubic.in_slow_start());
    }

    #[test]
    fn loss_reduction_is_multiplicative() {
        let mut cubic = Cubic::new(MSS);
        grow(&mut cubic, Time::zero(), 4);
        let w = cubic.cwnd();
        cubic.on_loss(Time::seconds(1), w);
        assert_eq!(cubic.last_loss_window(), w);
        assert_eq!(cubic.cwnd(), (w as f64 * BETA) as Bytes);
        assert_eq!(cubic.ssthresh(), cubic.cwnd());
        assert!(!cubic.in_slow_start());
    }

    #[test]
    fn reduction_does_not_depend_on_history() {
        // two controllers reaching the same window through different paths
        let mut a = Cubic::new(MSS);
        grow(&mut a, Time::zero(), 4);
        let w = a.cwnd();
        a.on_loss(Time::seconds(1), w);
        let first = a.cwnd();

        let mut b = Cubic::new(MSS);
        grow(&mut b, Time::zero(), 5);
        b.on_loss(Time::seconds(1), 0);
        let now = grow(&mut b, Time::seconds(1), 1);
        // bring b back to exactly w
        b.cwnd = w;
        b.on_loss(now, w);
        assert_eq!(b.cwnd(), first);

        // and again at the same window
        a.cwnd = w;
        a.on_loss(Time::seconds(5), w);
        assert_eq!(a.cwnd(), first);
    }

    #[test]
    fn concave_then_convex_growth() {
        let mut cubic = Cubic::new(MSS);
        grow(&mut cubic, Time::zero(), 4);
        let w_max = cubic.cwnd();
        cubic.on_loss(Time::seconds(1), w_max);
        let reduced = cubic.cwnd();

        // record the window after each round trip
        let mut now = Time::seconds(1);
        let mut windows = vec![reduced];
        for _ in 0..100 {
            now = grow(&mut cubic, now, 1);
            windows.push(cubic.cwnd());
        }
        let increments: Vec<i64> = windows.windows(2).map(|w| w[1] as i64 - w[0] as i64).collect();

        // growth never stops
        assert!(increments.iter().all(|d| *d >= 0));
        // fast at first, slow near the previous maximum
        let near = windows.iter().position(|w| *w >= w_max * 95 / 100).unwrap();
        assert!(near > 1);
        assert!(increments[0] > increments[near]);
        // mild overshoot beyond the previous maximum, accelerating
        assert!(*windows.last().unwrap() > w_max);
        assert!(increments[99] > increments[near]);
    }
}
