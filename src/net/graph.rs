use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;
use crate::context::SimulationContext;
use crate::error::{ConfigError, Result};
use super::channel::{self, DropReason, Transmission};
use super::{Link, LinkState, NodeId, Packet};

/// Nodes connected by directed links, with static shortest-path forwarding.
#[derive(Debug, Default)]
pub struct NetworkGraph {
    node_count: usize,
    links: BTreeMap<(NodeId, NodeId), Link>,
    /// `next_hop[(at, dst)]` is where a packet at `at` heading to `dst` goes next.
    next_hop: BTreeMap<(NodeId, NodeId), NodeId>,
}

impl NetworkGraph {
    pub fn new(node_count: usize) -> Self {
        Self {
            node_count,
            ..Default::default()
        }
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    /// Connect `a` and `b` with one link per direction.
    pub fn connect(&mut self, a: NodeId, b: NodeId, forward: LinkState, backward: LinkState) -> Result<()> {
        forward.validate()?;
        backward.validate()?;
        self.links.insert((a, b), Link::new(a, b, forward));
        self.links.insert((b, a), Link::new(b, a, backward));
        self.build_routes();
        Ok(())
    }

    pub fn link(&self, from: NodeId, to: NodeId) -> Option<&Link> {
        self.links.get(&(from, to))
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.values()
    }

    /// Breadth-first search from every node. Neighbours are visited in id
    /// order, so equal-length paths are always resolved the same way.
    fn build_routes(&mut self) {
        let mut adjacency: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for (from, to) in self.links.keys() {
            adjacency.entry(*from).or_default().insert(*to);
        }

        self.next_hop.clear();
        for src in 0..self.node_count {
            // first hop taken to reach each node from `src`
            let mut first: BTreeMap<NodeId, NodeId> = BTreeMap::new();
            let mut pending = VecDeque::new();
            pending.push_back(src);
            while let Some(at) = pending.pop_front() {
                for next in adjacency.get(&at).into_iter().flatten() {
                    if *next == src || first.contains_key(next) {
                        continue;
                    }
                    let hop = if at == src { *next } else { first[&at] };
                    first.insert(*next, hop);
                    pending.push_back(*next);
                }
            }
            for (dst, hop) in first {
                self.next_hop.insert((src, dst), hop);
            }
        }
    }

    pub fn next_hop(&self, at: NodeId, dst: NodeId) -> Option<NodeId> {
        self.next_hop.get(&(at, dst)).copied()
    }

    /// Fail unless `dst` is reachable from `src`.
    pub fn check_route(&self, src: NodeId, dst: NodeId) -> std::result::Result<(), ConfigError> {
        match self.next_hop(src, dst) {
            Some(_) => Ok(()),
            None => Err(ConfigError::NoRoute { from: src, to: dst }),
        }
    }

    /// Forward `packet`, currently at node `at`, one hop toward its destination.
    pub fn send(&mut self, ctx: &mut SimulationContext, at: NodeId, packet: Packet) -> Result<Transmission> {
        let link = self.next_hop(at, packet.dst).and_then(|hop| self.links.get_mut(&(at, hop)));
        match link {
            Some(link) => channel::transmit(ctx, link, packet),
            None => {
                debug!(flow = %packet.flow, at, dst = packet.dst, "no route");
                Ok(Transmission::Dropped(DropReason::NoRoute))
            }
        }
    }
}
