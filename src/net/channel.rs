use tracing::trace;
use crate::context::{Event, SimulationContext};
use crate::error::Result;
use crate::sim::EventHandle;
use super::{Link, Packet};

/// Why a packet never reached the other end of a link.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The transmit queue was full.
    QueueFull,
    /// Lost by the link's loss model.
    Lost,
    /// Nowhere to forward it.
    NoRoute,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transmission {
    /// Arrival at the far end is scheduled.
    Scheduled(EventHandle),
    Dropped(DropReason),
}

/// Put `packet` on `link`.
///
/// The packet waits behind the link backlog, is serialized at the link bandwidth
/// and then propagates. The loss model is consulted once the packet left the
/// transmitter, so a lost packet still consumed link capacity. Drops of data
/// packets are recorded against their flow.
pub fn transmit(ctx: &mut SimulationContext, link: &mut Link, packet: Packet) -> Result<Transmission> {
    let now = ctx.now();
    let Some(done) = link.enqueue(packet.size, now) else {
        trace!(flow = %packet.flow, seq = packet.seq, from = link.from, to = link.to, "queue full");
        if !packet.is_ack() {
            ctx.stats.record_queue_drop(packet.flow, now);
        }
        return Ok(Transmission::Dropped(DropReason::QueueFull));
    };

    if link.loss_mut().should_drop(&mut ctx.rng) {
        trace!(flow = %packet.flow, seq = packet.seq, from = link.from, to = link.to, "lost");
        if !packet.is_ack() {
            ctx.stats.record_loss(packet.flow, now);
        }
        return Ok(Transmission::Dropped(DropReason::Lost));
    }

    let arrival = done + link.state().delay;
    let handle = ctx.queue.schedule_at(arrival, Event::PacketArrival { node: link.to, packet })?;
    Ok(Transmission::Scheduled(handle))
}
