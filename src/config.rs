//! Scenario configuration.
//!
//! Every field has a default, so a JSON file only needs to list what differs
//! from the reference scenario: a CUBIC and a BBR flow sharing a 10 Mbps, 50 ms
//! bottleneck that loses 5% of the packets, for 30 seconds.

use std::path::Path;
use serde::{Deserialize, Serialize};
use crate::error::{ConfigError, Result};
use crate::loss::LossConfig;
use crate::net::LinkState;
use crate::sim::{Bw, Bytes, Time};
use crate::tcp::{SocketConfig, Variant};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seeds every random draw of the run.
    pub seed: u64,
    /// Run length, in seconds.
    pub duration: f64,
    /// Bandwidth of every link, in bits per second.
    pub bandwidth: u64,
    /// Propagation delay of every link, in seconds.
    pub delay: f64,
    /// Applied to packets crossing the bottleneck toward the receiver.
    pub loss: LossConfig,
    /// Transmit queue capacity of every link, in packets.
    pub queue_limit: usize,
    pub tcp: SocketConfig,
    pub flows: Vec<FlowConfig>,
}

/// One sender and its traffic source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub variant: Variant,
    /// Seconds.
    pub start: f64,
    /// Seconds.
    pub stop: f64,
    /// Application data rate while on, in bits per second.
    pub data_rate: u64,
    /// Bytes per application write.
    pub packet_size: Bytes,
    /// Seconds.
    pub on_time: f64,
    /// Seconds. Zero keeps the source on.
    pub off_time: f64,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            variant: Variant::Cubic,
            start: 1.,
            stop: 30.,
            data_rate: 10_000_000,
            packet_size: 512,
            on_time: 1.,
            off_time: 0.,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 1,
            duration: 30.,
            bandwidth: 10_000_000,
            delay: 0.05,
            loss: LossConfig::bernoulli(0.05),
            queue_limit: 100,
            tcp: SocketConfig::default(),
            flows: vec![
                FlowConfig { variant: Variant::Cubic, ..Default::default() },
                FlowConfig { variant: Variant::Bbr, ..Default::default() },
            ],
        }
    }
}

fn is_time(s: f64) -> bool {
    s.is_finite() && s >= 0.
}

impl Config {
    /// Parse and validate a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(self.duration.is_finite() && self.duration > 0.) {
            return Err(ConfigError::InvalidDuration(self.duration));
        }
        if !is_time(self.delay) {
            return Err(ConfigError::InvalidDelay(self.delay));
        }
        self.link_state(self.loss).validate()?;
        if self.tcp.mss == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }
        if self.tcp.send_buffer < self.tcp.mss {
            return Err(ConfigError::SendBufferTooSmall);
        }
        for rto in [self.tcp.initial_rto, self.tcp.min_rto, self.tcp.max_rto] {
            if !(rto.is_finite() && rto > 0.) {
                return Err(ConfigError::InvalidDelay(rto));
            }
        }
        if self.tcp.min_rto > self.tcp.max_rto {
            return Err(ConfigError::InvalidDelay(self.tcp.min_rto));
        }
        if self.flows.is_empty() {
            return Err(ConfigError::NoFlows);
        }
        for (i, flow) in self.flows.iter().enumerate() {
            let window_ok = is_time(flow.start) && flow.stop.is_finite() && flow.start < flow.stop && flow.stop <= self.duration;
            if !window_ok {
                return Err(ConfigError::InvalidFlowWindow { flow: i, start: flow.start, stop: flow.stop });
            }
            if flow.data_rate == 0 {
                return Err(ConfigError::ZeroDataRate { flow: i });
            }
            if flow.packet_size == 0 {
                return Err(ConfigError::ZeroSegmentSize);
            }
            if !(flow.on_time.is_finite() && flow.on_time > 0.) {
                return Err(ConfigError::InvalidDuration(flow.on_time));
            }
            if !is_time(flow.off_time) {
                return Err(ConfigError::InvalidDuration(flow.off_time));
            }
        }
        Ok(())
    }

    pub fn duration(&self) -> Time {
        Time::from_secs_f64(self.duration)
    }

    /// A link with the configured bandwidth, delay and queue, losing packets per `loss`.
    pub fn link_state(&self, loss: LossConfig) -> LinkState {
        LinkState {
            bandwidth: Bw::from_bits(self.bandwidth),
            delay: Time::from_secs_f64(self.delay),
            loss,
            queue_limit: self.queue_limit,
        }
    }

    /// Nodes: one sender per flow, then the router, then the receiver.
    pub fn node_count(&self) -> usize {
        self.flows.len() + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_scenario() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.node_count(), 4);
        assert_eq!(config.duration(), Time::seconds(30));
        let link = config.link_state(LossConfig::NONE);
        assert_eq!(link.bandwidth, Bw::from_mbits(10));
        assert_eq!(link.delay, Time::millis(50));
    }

    #[test]
    fn partial_json() {
        let config = Config::from_json(r#"{
            "seed": 7,
            "loss": { "model": "bernoulli", "probability": 0.01 },
            "flows": [ { "variant": "bbr", "start": 0.5 } ]
        }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.loss, LossConfig::bernoulli(0.01));
        assert_eq!(config.flows.len(), 1);
        assert_eq!(config.flows[0].variant, Variant::Bbr);
        assert_eq!(config.flows[0].stop, 30.);
        assert_eq!(config.tcp.mss, 536);
    }

    #[test]
    fn rejects_invalid() {
        let check = |f: fn(&mut Config), expected: ConfigError| {
            let mut config = Config::default();
            f(&mut config);
            assert_eq!(config.validate(), Err(expected));
        };
        check(|c| c.bandwidth = 0, ConfigError::ZeroBandwidth);
        check(|c| c.delay = -1., ConfigError::InvalidDelay(-1.));
        check(|c| c.loss = LossConfig::bernoulli(1.5), ConfigError::InvalidLossProbability(1.5));
        check(|c| c.duration = 0., ConfigError::InvalidDuration(0.));
        check(|c| c.flows.clear(), ConfigError::NoFlows);
        check(|c| c.flows[1].stop = 31., ConfigError::InvalidFlowWindow { flow: 1, start: 1., stop: 31. });
        check(|c| c.flows[0].data_rate = 0, ConfigError::ZeroDataRate { flow: 0 });
        check(|c| c.tcp.mss = 0, ConfigError::ZeroSegmentSize);
        check(|c| c.queue_limit = 0, ConfigError::ZeroQueueLimit);
        check(|c| c.tcp.send_buffer = 100, ConfigError::SendBufferTooSmall);

        assert!(matches!(Config::from_json("{ \"duration\": -3 }"), Err(crate::Error::InvalidConfiguration(_))));
        assert!(matches!(Config::from_json("{ \"duration\": "), Err(crate::Error::ConfigParse(_))));
    }
}
