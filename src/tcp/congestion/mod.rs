//! Congestion controllers.
//!
//! A controller turns acknowledgment and loss feedback into a sending budget.
//! The socket only sees the [`CongestionController`] trait and the [`Budget`]
//! it returns, never the concrete algorithm.

mod filter;
pub mod cubic;
pub mod bbr;

use std::fmt::Debug;
use serde::{Deserialize, Serialize};
use crate::sim::{Bw, Bytes, Time};
use super::rate::RateSample;

pub use cubic::Cubic;
pub use bbr::{Bbr, BbrMode};

/// How much a sender may put on the network.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Budget {
    /// At most `cwnd` bytes in flight.
    Window { cwnd: Bytes },
    /// Send at `rate`, with at most `window` bytes in flight.
    Paced { rate: Bw, window: Bytes },
}

impl Budget {
    /// Bytes that may be in flight.
    pub fn window(&self) -> Bytes {
        match *self {
            Budget::Window { cwnd } => cwnd,
            Budget::Paced { window, .. } => window,
        }
    }

    pub fn pacing_rate(&self) -> Option<Bw> {
        match *self {
            Budget::Window { .. } => None,
            Budget::Paced { rate, .. } => Some(rate),
        }
    }

    /// Same budget scaled by `gain`, keeping room for at least `floor` bytes in flight.
    pub fn scaled(&self, gain: f64, floor: Bytes) -> Budget {
        let window = |w: Bytes| ((w as f64 * gain) as Bytes).max(floor);
        match *self {
            Budget::Window { cwnd } => Budget::Window { cwnd: window(cwnd) },
            Budget::Paced { rate, window: w } => Budget::Paced { rate: rate.scale(gain), window: window(w) },
        }
    }
}

/// Feedback carried by one acknowledgment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AckSample {
    pub now: Time,
    /// Bytes newly acknowledged, cumulatively or selectively.
    pub bytes_acked: Bytes,
    pub rtt: Option<Time>,
    /// Bytes still in flight once this acknowledgment is processed.
    pub bytes_in_flight: Bytes,
    pub rate: Option<RateSample>,
}

pub trait CongestionController: Debug {
    /// Data was acknowledged.
    fn on_ack(&mut self, ack: &AckSample) -> Budget;

    /// A loss episode started. Called once per episode.
    fn on_loss(&mut self, now: Time, bytes_in_flight: Bytes) -> Budget;

    fn budget(&self) -> Budget;

    /// Whether the controller is still searching for the path capacity.
    fn in_slow_start(&self) -> bool;

    fn name(&self) -> &'static str;
}

/// Available congestion control algorithms.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variant {
    /// Loss-based, with cubic window growth.
    Cubic,
    /// Bandwidth and RTT probing, paced.
    Bbr,
}

impl Variant {
    /// `seed` only matters to controllers with randomized behavior.
    pub fn build(&self, mss: Bytes, seed: u64) -> Box<dyn CongestionController> {
        match self {
            Variant::Cubic => Box::new(Cubic::new(mss)),
            Variant::Bbr => Box::new(Bbr::new(mss, seed)),
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Variant::Cubic => write!(f, "cubic"),
            Variant::Bbr => write!(f, "bbr"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_budget() {
        let window = Budget::Window { cwnd: 10_000 };
        assert_eq!(window.scaled(0.5, 536), Budget::Window { cwnd: 5_000 });
        assert_eq!(window.scaled(0.01, 536), Budget::Window { cwnd: 536 });
        let paced = Budget::Paced { rate: Bw::from_mbits(10), window: 10_000 };
        assert_eq!(paced.scaled(0.5, 536), Budget::Paced { rate: Bw::from_mbits(5), window: 5_000 });
        assert_eq!(paced.pacing_rate(), Some(Bw::from_mbits(10)));
        assert_eq!(window.pacing_rate(), None);
    }

    #[test]
    fn variants_are_interchangeable() {
        for variant in [Variant::Cubic, Variant::Bbr] {
            let mut cc = variant.build(536, 1);
            assert!(cc.in_slow_start());
            assert!(cc.budget().window() >= 4 * 536);
            cc.on_loss(Time::seconds(1), 5360);
            assert!(cc.budget().window() >= 2 * 536);
        }
    }
}
