// LATAS: Latency, Jitter, and Port-Utilization Bounds for Time-Sensitive Networks
// Copyright (C) 2024-2025 The LATAS developers
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Forwarding paths through the topology graph and their shape helpers.

use petgraph::algo::astar;
use petgraph::graph::NodeIndex;

use crate::topology::Topology;

/// The shortest forwarding path of one stream.
///
/// By construction the sequence alternates between forwarding nodes and
/// ports: `talker, talker-port, rx-port, switch, tx-port, rx-port, ...,
/// listener-port, listener`. A port is a receive (rx) port iff its
/// predecessor on the path is also a port, and a transmit (tx) port iff its
/// successor is.
#[derive(Debug, Clone)]
pub struct StreamPath {
    nodes: Vec<NodeIndex>,
}

impl StreamPath {
    /// Compute the shortest path between two forwarding nodes. Ties between
    /// equal-length paths are broken deterministically by graph insertion
    /// order.
    pub fn shortest(topology: &Topology, sender: &str, receiver: &str) -> Option<Self> {
        let from = topology.node_index(sender)?;
        let to = topology.node_index(receiver)?;
        let (_, nodes) = astar(&topology.graph, from, |n| n == to, |_| 1u32, |_| 0u32)?;
        Some(Self { nodes })
    }

    pub fn nodes(&self) -> &[NodeIndex] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, index: NodeIndex) -> bool {
        self.nodes.contains(&index)
    }

    /// Whether the element at `index` receives frames of this stream, i.e.,
    /// both it and its predecessor are ports (the predecessor is the peer tx
    /// port across the link).
    pub fn is_rx_port(&self, topology: &Topology, index: usize) -> bool {
        index > 0
            && topology.graph[self.nodes[index]].is_port()
            && topology.graph[self.nodes[index - 1]].is_port()
    }

    /// Whether the element at `index` transmits frames of this stream, i.e.,
    /// both it and its successor are ports.
    pub fn is_tx_port(&self, topology: &Topology, index: usize) -> bool {
        index + 1 < self.nodes.len()
            && topology.graph[self.nodes[index]].is_port()
            && topology.graph[self.nodes[index + 1]].is_port()
    }

    /// Position of the forwarding node that the element at `index` belongs to
    /// (the element itself for forwarding nodes, the owning node for ports).
    fn forwarding_position(&self, topology: &Topology, index: usize) -> Option<usize> {
        let owner = match &topology.graph[self.nodes[index]] {
            crate::topology::GraphNode::Forwarding(_) => self.nodes[index],
            crate::topology::GraphNode::Port(_) => topology.port_owner(self.nodes[index]),
        };
        self.nodes.iter().position(|&n| n == owner)
    }

    /// The forwarding node preceding the one that the element at `index`
    /// belongs to. The `tx-port, rx-port, node` stride puts it three hops
    /// before the owning node.
    pub fn ancestor_forwarding_node(&self, topology: &Topology, index: usize) -> Option<NodeIndex> {
        let position = self.forwarding_position(topology, index)?;
        (position >= 3).then(|| self.nodes[position - 3])
    }

    /// The tx port preceding the forwarding node that the element at `index`
    /// belongs to, two hops before the owning node.
    pub fn ancestor_tx_port(&self, topology: &Topology, index: usize) -> Option<NodeIndex> {
        let position = self.forwarding_position(topology, index)?;
        (position >= 2).then(|| self.nodes[position - 2])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::Stream;
    use crate::topology::{ForwardingNode, Link, Port, Topology};

    /// talker -- switch 1 -- switch 2 -- listener, one stream end to end.
    fn chain() -> Topology {
        let mut topology = Topology::new("chain", "");
        topology.add_node(ForwardingNode::new("talker"));
        let t1 = topology.add_port(Port::new("talker", "1"));
        topology.add_node(ForwardingNode::new("switch 1"));
        let s1_1 = topology.add_port(Port::new("switch 1", "1"));
        let s1_2 = topology.add_port(Port::new("switch 1", "2"));
        topology.add_node(ForwardingNode::new("switch 2"));
        let s2_1 = topology.add_port(Port::new("switch 2", "1"));
        let s2_2 = topology.add_port(Port::new("switch 2", "2"));
        topology.add_node(ForwardingNode::new("listener"));
        let l1 = topology.add_port(Port::new("listener", "1"));

        topology.add_link(t1, s1_2, Link::default());
        topology.add_link(s1_1, s2_2, Link::default());
        topology.add_link(s2_1, l1, Link::default());

        topology.add_stream(Stream {
            name: "Stream 1".to_string(),
            cycle_time: 1_000_000.0,
            offset: 0.0,
            transmission_window: 0.0,
            frame_size: 500,
            sender: "talker".to_string(),
            receiver: "listener".to_string(),
            priority: 6,
        });
        topology
    }

    #[test]
    fn test_path_alternates() {
        let topology = chain();
        let path = StreamPath::shortest(&topology, "talker", "listener").unwrap();
        assert_eq!(path.len(), 10);

        let kinds: Vec<bool> = path
            .nodes()
            .iter()
            .map(|&n| topology.graph[n].is_forwarding())
            .collect();
        assert_eq!(
            kinds,
            vec![true, false, false, true, false, false, true, false, false, true]
        );
    }

    #[test]
    fn test_rx_tx_classification() {
        let topology = chain();
        let path = StreamPath::shortest(&topology, "talker", "listener").unwrap();

        let rx: Vec<usize> = (0..path.len())
            .filter(|&i| path.is_rx_port(&topology, i))
            .collect();
        let tx: Vec<usize> = (0..path.len())
            .filter(|&i| path.is_tx_port(&topology, i))
            .collect();
        assert_eq!(rx, vec![2, 5, 8]);
        assert_eq!(tx, vec![1, 4, 7]);
    }

    #[test]
    fn test_ancestors() {
        let topology = chain();
        let path = StreamPath::shortest(&topology, "talker", "listener").unwrap();
        let nodes = path.nodes().to_vec();

        // the talker port has no ancestor
        assert_eq!(path.ancestor_forwarding_node(&topology, 1), None);
        assert_eq!(path.ancestor_tx_port(&topology, 1), None);

        // switch 1's tx port (index 4) descends from the talker
        assert_eq!(path.ancestor_forwarding_node(&topology, 4), Some(nodes[0]));
        assert_eq!(path.ancestor_tx_port(&topology, 4), Some(nodes[1]));

        // switch 2's tx port (index 7) descends from switch 1
        assert_eq!(path.ancestor_forwarding_node(&topology, 7), Some(nodes[3]));
        assert_eq!(path.ancestor_tx_port(&topology, 7), Some(nodes[4]));
    }

    #[test]
    fn test_no_path() {
        let mut topology = chain();
        topology.add_node(ForwardingNode::new("island"));
        assert!(StreamPath::shortest(&topology, "talker", "island").is_none());
        assert!(StreamPath::shortest(&topology, "talker", "missing").is_none());
    }
}
