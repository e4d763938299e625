use bit_set::BitSet;
use tracing::trace;
use crate::context::SimulationContext;
use crate::error::Result;
use crate::net::{FlowId, NetworkGraph, NodeId, Packet, PacketKind, HEADER_BYTES};

/// Receiving end of a flow: acknowledges every data segment.
#[derive(Debug)]
pub struct Sink {
    flow: FlowId,
    node: NodeId,
    /// 1: segment received at least once.
    received: BitSet,
    /// Next segment expected in order.
    cumulative: u64,
}

impl Sink {
    pub fn new(flow: FlowId, node: NodeId) -> Self {
        Self {
            flow,
            node,
            received: BitSet::new(),
            cumulative: 0,
        }
    }

    pub fn cumulative(&self) -> u64 {
        self.cumulative
    }

    /// A data packet of this flow arrived: record it and answer with an ACK
    /// carrying the cumulative acknowledgment and the segment's own number.
    pub fn on_data(&mut self, ctx: &mut SimulationContext, net: &mut NetworkGraph, packet: Packet) -> Result<()> {
        if packet.is_ack() {
            return Ok(());
        }
        let now = ctx.now();
        ctx.stats.record_delivery(self.flow, now - packet.sent_at, packet.size, now);

        self.received.insert(packet.seq as usize);
        while self.received.contains(self.cumulative as usize) {
            self.cumulative += 1;
        }
        trace!(flow = %self.flow, seq = packet.seq, cumulative = self.cumulative, "received");

        let ack = Packet {
            id: ctx.next_packet_id(),
            flow: self.flow,
            src: self.node,
            dst: packet.src,
            size: HEADER_BYTES,
            sent_at: now,
            seq: packet.seq,
            kind: PacketKind::Ack {
                cumulative: self.cumulative,
                sacked: packet.seq,
                echo: packet.sent_at,
            },
        };
        net.send(ctx, self.node, ack)?;
        Ok(())
    }
}
