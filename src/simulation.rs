//! One run of a scenario: builds the dumbbell, then dispatches events to the
//! sources, sockets and sinks until the configured duration.

use std::collections::BTreeMap;
use serde::Serialize;
use tracing::{info, trace};
use crate::app::OnOffSource;
use crate::config::Config;
use crate::context::{Event, SimulationContext};
use crate::error::Result;
use crate::loss::LossConfig;
use crate::net::{FlowId, NetworkGraph, NodeId};
use crate::sim::{Bw, Time};
use crate::stats::{FlowSummary, StatsRecord};
use crate::tcp::{Sink, TransportSocket, Variant};

/// Both ends of a flow.
#[derive(Debug)]
struct Endpoints {
    variant: Variant,
    source: OnOffSource,
    socket: TransportSocket,
    sink: Sink,
}

/// Outcome of a run.
#[derive(Clone, Debug, Serialize)]
pub struct Report {
    pub seed: u64,
    pub duration: Time,
    pub flows: BTreeMap<FlowId, FlowReport>,
}

#[derive(Clone, Debug, Serialize)]
pub struct FlowReport {
    pub variant: Variant,
    pub summary: FlowSummary,
}

pub struct Simulation {
    config: Config,
    ctx: SimulationContext,
    net: NetworkGraph,
    flows: BTreeMap<FlowId, Endpoints>,
}

impl Simulation {
    /// Validate `config` and build the network. Nothing is scheduled unless
    /// the whole configuration is valid.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        // senders 0..n, router n, receiver n + 1
        let senders = config.flows.len();
        let router: NodeId = senders;
        let receiver: NodeId = senders + 1;
        let mut net = NetworkGraph::new(config.node_count());
        let lossless = config.link_state(LossConfig::NONE);
        for sender in 0..senders {
            net.connect(sender, router, lossless, lossless)?;
        }
        net.connect(router, receiver, config.link_state(config.loss), lossless)?;

        let mut flows = BTreeMap::new();
        for (sender, flow_config) in config.flows.iter().enumerate() {
            net.check_route(sender, receiver)?;
            net.check_route(receiver, sender)?;
            let flow = FlowId(sender as u32 + 1);
            let cc = flow_config.variant.build(config.tcp.mss, config.seed.wrapping_add(flow.0 as u64));
            let source = OnOffSource::new(
                flow,
                Bw::from_bits(flow_config.data_rate),
                flow_config.packet_size,
                Time::from_secs_f64(flow_config.on_time),
                Time::from_secs_f64(flow_config.off_time),
                Time::from_secs_f64(flow_config.start),
                Time::from_secs_f64(flow_config.stop),
            );
            flows.insert(flow, Endpoints {
                variant: flow_config.variant,
                source,
                socket: TransportSocket::new(flow, sender, receiver, config.tcp, cc),
                sink: Sink::new(flow, receiver),
            });
        }

        let mut ctx = SimulationContext::new(config.seed);
        for (flow, endpoints) in flows.iter_mut() {
            ctx.stats.register(*flow);
            endpoints.source.start(&mut ctx)?;
        }

        Ok(Self {
            config,
            ctx,
            net,
            flows,
        })
    }

    pub fn now(&self) -> Time {
        self.ctx.now()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn socket(&self, flow: FlowId) -> Option<&TransportSocket> {
        self.flows.get(&flow).map(|e| &e.socket)
    }

    /// Statistics collected so far.
    pub fn snapshot(&self) -> BTreeMap<FlowId, StatsRecord> {
        self.ctx.stats.snapshot()
    }

    /// Process every event up to `stop` included. The clock then reads `stop`.
    pub fn run_until(&mut self, stop: Time) -> Result<()> {
        while let Some((when, event)) = self.ctx.queue.pop_until(stop) {
            trace!(%when, ?event, "dispatch");
            self.dispatch(event)?;
        }
        Ok(())
    }

    /// Run for the configured duration and report.
    pub fn run(mut self) -> Result<Report> {
        info!(seed = self.config.seed, duration = %self.config.duration(), flows = self.flows.len(), "simulation started");
        self.run_until(self.config.duration())?;
        info!(now = %self.now(), pending = self.ctx.queue.pending(), "simulation stopped");
        Ok(self.report())
    }

    pub fn report(&self) -> Report {
        let duration = self.config.duration();
        let mut summaries = self.ctx.stats.summarize(duration);
        let flows = self
            .flows
            .iter()
            .filter_map(|(flow, endpoints)| {
                let summary = summaries.remove(flow)?;
                Some((*flow, FlowReport { variant: endpoints.variant, summary }))
            })
            .collect();
        Report {
            seed: self.config.seed,
            duration,
            flows,
        }
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        let Simulation { ctx, net, flows, .. } = self;
        match event {
            Event::AppToggle { flow } => {
                if let Some(e) = flows.get_mut(&flow) {
                    e.source.on_toggle(ctx)?;
                }
            },
            Event::AppSend { flow } => {
                if let Some(e) = flows.get_mut(&flow) {
                    e.source.on_send(ctx, &mut e.socket)?;
                    e.socket.try_send(ctx, net)?;
                }
            },
            Event::PacketArrival { node, packet } => {
                if node != packet.dst {
                    net.send(ctx, node, packet)?;
                    return Ok(());
                }
                if let Some(e) = flows.get_mut(&packet.flow) {
                    if packet.is_ack() {
                        e.socket.on_ack_received(ctx, net, &packet)?;
                    } else {
                        e.sink.on_data(ctx, net, packet)?;
                    }
                }
            },
            Event::RetransmitTimeout { flow } => {
                if let Some(e) = flows.get_mut(&flow) {
                    e.socket.on_retransmit_timeout(ctx, net)?;
                }
            },
            Event::PaceRelease { flow } => {
                if let Some(e) = flows.get_mut(&flow) {
                    e.socket.on_pace_release(ctx, net)?;
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FlowConfig;
    use crate::sim::Bytes;
    use crate::tcp::SocketState;

    fn single_flow(variant: Variant, loss: f64) -> Config {
        Config {
            duration: 5.,
            loss: LossConfig::bernoulli(loss),
            flows: vec![FlowConfig { variant, start: 0.5, stop: 5., ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn clock_stops_at_boundary() {
        let mut sim = Simulation::new(single_flow(Variant::Cubic, 0.)).unwrap();
        sim.run_until(Time::seconds(2)).unwrap();
        assert_eq!(sim.now(), Time::seconds(2));
        let delivered = sim.snapshot()[&FlowId(1)].bytes_delivered;
        assert!(delivered > 0);
        sim.run_until(Time::seconds(3)).unwrap();
        assert!(sim.snapshot()[&FlowId(1)].bytes_delivered > delivered);
    }

    #[test]
    fn nothing_before_start() {
        let mut sim = Simulation::new(single_flow(Variant::Bbr, 0.)).unwrap();
        sim.run_until(Time::millis(499)).unwrap();
        let record = &sim.snapshot()[&FlowId(1)];
        assert_eq!(record.packets_sent, 0);
        assert_eq!(sim.socket(FlowId(1)).unwrap().state(), SocketState::SlowStart);
    }

    #[test]
    fn sends_stay_within_the_window() {
        let config = Config::default();
        let mss = config.tcp.mss;
        let mut sim = Simulation::new(config).unwrap();
        let mut sends = 0;
        while let Some((_, event)) = sim.ctx.queue.pop_until(Time::seconds(12)) {
            let before: Vec<(Bytes, u64)> = sim
                .flows
                .iter()
                .map(|(flow, e)| (e.socket.bytes_in_flight(), sim.ctx.stats.get(*flow).map_or(0, |r| r.packets_sent)))
                .collect();
            sim.dispatch(event).unwrap();
            for ((flow, e), (in_flight, sent)) in sim.flows.iter().zip(before) {
                if sim.ctx.stats.get(*flow).map_or(0, |r| r.packets_sent) == sent {
                    continue;
                }
                sends += 1;
                // gated sends stay within the window; a fast retransmit adds one segment
                let window = e.socket.effective_budget().window();
                let after = e.socket.bytes_in_flight();
                assert!(
                    after <= window.max(mss).max(in_flight + mss),
                    "{flow} at {}: {after} in flight, window {window}, {in_flight} before",
                    sim.now()
                );
            }
        }
        assert!(sends > 1000);
    }

    #[test]
    fn lossless_flow_fills_the_pipe() {
        for variant in [Variant::Cubic, Variant::Bbr] {
            let report = Simulation::new(single_flow(variant, 0.)).unwrap().run().unwrap();
            let summary = &report.flows[&FlowId(1)].summary;
            assert_eq!(summary.packets_lost, 0);
            // bounded by the send buffer: 128KiB per 200ms round trip
            assert!(summary.active_throughput_bps > 2e6, "{variant}: {}", summary.active_throughput_bps);
            assert!(summary.active_throughput_bps <= 10e6, "{variant}");
            assert_eq!(report.flows[&FlowId(1)].variant, variant);
        }
    }
}
