use thiserror::Error;
use crate::sim::Time;

/// A rejected configuration. Always reported before any event is scheduled.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("bandwidth must be positive")]
    ZeroBandwidth,
    #[error("invalid propagation delay (must be finite and >= 0): {0}")]
    InvalidDelay(f64),
    #[error("invalid loss probability (must be in [0, 1]): {0}")]
    InvalidLossProbability(f64),
    #[error("invalid simulation duration (must be finite and > 0): {0}")]
    InvalidDuration(f64),
    #[error("no flows configured")]
    NoFlows,
    #[error("flow {flow}: invalid active window [{start}, {stop})")]
    InvalidFlowWindow { flow: usize, start: f64, stop: f64 },
    #[error("flow {flow}: application data rate must be positive")]
    ZeroDataRate { flow: usize },
    #[error("segment and write sizes must be positive")]
    ZeroSegmentSize,
    #[error("queue limit must be at least one packet")]
    ZeroQueueLimit,
    #[error("send buffer must hold at least one segment")]
    SendBufferTooSmall,
    #[error("invalid Gilbert-Elliott parameter: {0}")]
    InvalidBurstModel(f64),
    #[error("no route from node {from} to node {to}")]
    NoRoute { from: usize, to: usize },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),
    #[error("cannot schedule an event {delay} in the past")]
    NegativeDelay { delay: Time },
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("report export error: {0}")]
    Export(serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
