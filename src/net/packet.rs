use serde::Serialize;
use crate::sim::{Bytes, Time};
use super::NodeId;

/// Identifies a flow. Flows are numbered from 1, in configuration order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct FlowId(pub u32);

impl std::fmt::Display for FlowId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "flow{}", self.0)
    }
}

/// Size of the IP and TCP headers carried by every packet.
pub const HEADER_BYTES: Bytes = 40;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketKind {
    Data {
        /// Payload length, without headers.
        payload: Bytes,
        retransmit: bool,
    },
    Ack {
        /// Next sequence number expected by the receiver.
        cumulative: u64,
        /// Sequence number of the data segment that triggered this ACK.
        sacked: u64,
        /// Send timestamp of that segment.
        echo: Time,
    },
}

/// A packet in transit. Built once by its sender and moved hop by hop, never shared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub id: u64,
    pub flow: FlowId,
    pub src: NodeId,
    pub dst: NodeId,
    /// Size on the wire, headers included.
    pub size: Bytes,
    pub sent_at: Time,
    pub seq: u64,
    pub kind: PacketKind,
}

impl Packet {
    pub fn is_ack(&self) -> bool {
        matches!(self.kind, PacketKind::Ack { .. })
    }
}
