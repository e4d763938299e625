//! Packet loss models.
//!
//! Loss is decided per packet, whatever its size.

use rand::Rng;
use serde::{Deserialize, Serialize};
use crate::error::ConfigError;

/// Loss model as it appears in a configuration.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum LossConfig {
    /// Every packet is lost independently with `probability`.
    Bernoulli { probability: f64 },
    /// Gilbert-Elliott Markov chain with 2 states and 4 parameters.
    GilbertElliott {
        /// Average length of bad state, in packets.
        bad_len: f64,
        /// Average length of good state, in packets.
        good_len: f64,
        /// Probability to lose a packet in bad state.
        bad_loss: f64,
        /// Probability to lose a packet in good state.
        good_loss: f64,
    },
}

impl LossConfig {
    pub const NONE: LossConfig = LossConfig::Bernoulli { probability: 0. };

    pub fn bernoulli(probability: f64) -> Self {
        LossConfig::Bernoulli { probability }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let probability = |p: f64| {
            if (0. ..=1.).contains(&p) { Ok(()) } else { Err(ConfigError::InvalidLossProbability(p)) }
        };
        match *self {
            LossConfig::Bernoulli { probability: p } => probability(p),
            LossConfig::GilbertElliott { bad_len, good_len, bad_loss, good_loss } => {
                for len in [bad_len, good_len] {
                    // NaN fails the comparison as well
                    if !(len >= 1.) {
                        return Err(ConfigError::InvalidBurstModel(len));
                    }
                }
                probability(bad_loss)?;
                probability(good_loss)
            }
        }
    }

    /// Long-run fraction of lost packets.
    pub fn mean_loss(&self) -> f64 {
        match *self {
            LossConfig::Bernoulli { probability } => probability,
            LossConfig::GilbertElliott { bad_len, good_len, bad_loss, good_loss } => {
                (bad_len * bad_loss + good_len * good_loss) / (bad_len + good_len)
            }
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum State {
    Good,
    Bad
}

/// Per-link loss process. Holds the chain state; randomness comes from the caller.
#[derive(Clone, Debug)]
pub struct LossModel {
    config: LossConfig,
    state: State
}

impl LossModel {
    pub fn new(config: LossConfig) -> Self {
        Self {
            config,
            state: State::Good
        }
    }

    pub fn config(&self) -> &LossConfig {
        &self.config
    }

    /// Decide the fate of one packet, then advance the chain.
    /// Returns true when the packet is lost.
    pub fn should_drop<R: Rng>(&mut self, rng: &mut R) -> bool {
        match self.config {
            LossConfig::Bernoulli { probability } => rng.random::<f64>() < probability,
            LossConfig::GilbertElliott { bad_len, good_len, bad_loss, good_loss } => {
                let lost;
                match self.state {
                    State::Good => {
                        lost = rng.random::<f64>() < good_loss;
                        if rng.random::<f64>() < 1. / good_len {
                            self.state = State::Bad;
                        }
                    },
                    State::Bad => {
                        lost = rng.random::<f64>() < bad_loss;
                        if rng.random::<f64>() < 1. / bad_len {
                            self.state = State::Good;
                        }
                    },
                }
                lost
            }
        }
    }
}
