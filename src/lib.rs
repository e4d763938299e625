//! Packet-level discrete-event simulation of TCP congestion control.
//!
//! Senders share a bottleneck link toward a single receiver. Each sender runs
//! either a loss-based controller ([`tcp::congestion::Cubic`]) or a bandwidth
//! and RTT probing one ([`tcp::congestion::Bbr`]); a run reports per-flow
//! throughput, delay and loss.

pub mod sim;
pub mod error;
pub mod loss;
pub mod net;
pub mod context;
pub mod stats;
pub mod tcp;
pub mod app;
pub mod config;
pub mod simulation;

pub use config::{Config, FlowConfig};
pub use error::{ConfigError, Error, Result};
pub use simulation::{FlowReport, Report, Simulation};
