//! Packet-level network: packets, links, the lossy channel and static forwarding.

pub mod packet;
pub mod link;
pub mod channel;
pub mod graph;

pub type NodeId = usize;

pub use packet::{FlowId, Packet, PacketKind, HEADER_BYTES};
pub use link::{Link, LinkState};
pub use channel::{DropReason, Transmission};
pub use graph::NetworkGraph;
