//! TCP endpoints: the sending socket with its estimators and congestion
//! controllers, and the receiving sink.

pub mod rtt;
pub mod rate;
pub mod congestion;
pub mod socket;
pub mod receiver;

pub use congestion::{Budget, CongestionController, Variant};
pub use socket::{SocketConfig, SocketState, TransportSocket};
pub use receiver::Sink;
