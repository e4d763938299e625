use rand_xoshiro::rand_core::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use crate::net::{FlowId, NodeId, Packet};
use crate::sim::{EventQueue, Time};
use crate::stats::FlowStatsCollector;

/// Everything that can happen during a run.
#[derive(Debug)]
pub enum Event {
    /// The traffic source of `flow` switches between its on and off periods.
    AppToggle { flow: FlowId },
    /// The traffic source of `flow` writes its next chunk.
    AppSend { flow: FlowId },
    /// `packet` finished crossing a link and reached `node`.
    PacketArrival { node: NodeId, packet: Packet },
    /// No acknowledgment arrived in time for `flow`.
    RetransmitTimeout { flow: FlowId },
    /// The pacing delay of `flow` elapsed.
    PaceRelease { flow: FlowId },
}

/// State shared by all the components of one run.
/// Created when the run starts and dropped with it, so runs never leak into each other.
pub struct SimulationContext {
    pub queue: EventQueue<Event>,
    pub rng: Xoshiro256PlusPlus,
    pub stats: FlowStatsCollector,
    next_packet_id: u64
}

impl SimulationContext {
    pub fn new(seed: u64) -> Self {
        Self {
            queue: EventQueue::new(),
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            stats: FlowStatsCollector::default(),
            next_packet_id: 0
        }
    }

    pub fn now(&self) -> Time {
        self.queue.now()
    }

    pub fn next_packet_id(&mut self) -> u64 {
        self.next_packet_id += 1;
        self.next_packet_id
    }
}
