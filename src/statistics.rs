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
//! Per-port and per-stream analysis results, and the exported JSON model.

use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};

use crate::path::StreamPath;
use crate::topology::{GraphNode, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Rx,
    Tx,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Rx => "rx",
            Direction::Tx => "tx",
        }
    }
}

/// Delay bounds attributed to one point on a stream's path.
///
/// `best_case` and `worst_case` are *cumulative* bounds in nanoseconds from
/// the talker up to and including this element. The resource utilization is
/// only valid for tx ports.
#[derive(Debug, Clone)]
pub struct PortStatistics {
    /// Graph vertex this entry belongs to.
    pub index: NodeIndex,
    pub node: String,
    /// Port name; `None` for the processing entry of a forwarding node.
    pub port: Option<String>,
    pub direction: Direction,
    pub best_case: f64,
    pub worst_case: f64,
    pub resource_utilization: f64,
}

/// All statistics collected for one stream along its path.
#[derive(Debug, Clone)]
pub struct StreamStatistics {
    pub stream: String,
    /// One entry per forwarding node (rx, the processing share) and per tx
    /// port on the path; endpoints and rx ports are excluded.
    pub delays_per_port: Vec<PortStatistics>,
    /// Hop-wise multiplication factors, aligned with the path elements.
    pub multiplications: Vec<f64>,
}

impl StreamStatistics {
    pub fn new(stream: &str, path: &StreamPath, topology: &Topology) -> Self {
        let mut delays_per_port = Vec::new();
        for (i, &index) in path.nodes().iter().enumerate() {
            if i == 0 || i == path.len() - 1 || path.is_rx_port(topology, i) {
                continue;
            }
            let (node, port, direction) = match &topology.graph[index] {
                GraphNode::Forwarding(node) => (node.name.clone(), None, Direction::Rx),
                GraphNode::Port(port) => {
                    (port.node.clone(), Some(port.name.clone()), Direction::Tx)
                }
            };
            delays_per_port.push(PortStatistics {
                index,
                node,
                port,
                direction,
                best_case: 0.0,
                worst_case: 0.0,
                resource_utilization: 0.0,
            });
        }
        Self {
            stream: stream.to_string(),
            delays_per_port,
            multiplications: Vec::new(),
        }
    }

    pub fn clear_delays(&mut self) {
        for statistics in &mut self.delays_per_port {
            statistics.best_case = 0.0;
            statistics.worst_case = 0.0;
        }
    }

    pub fn clear_resource_utilization(&mut self) {
        for statistics in &mut self.delays_per_port {
            statistics.resource_utilization = 0.0;
        }
    }

    pub fn get(&self, index: NodeIndex) -> Option<&PortStatistics> {
        self.delays_per_port.iter().find(|s| s.index == index)
    }

    pub fn get_mut(&mut self, index: NodeIndex) -> Option<&mut PortStatistics> {
        self.delays_per_port.iter_mut().find(|s| s.index == index)
    }

    /// Cumulative best-case delay of the whole path in nanoseconds.
    pub fn summarized_best_case(&self) -> f64 {
        self.delays_per_port.last().map(|s| s.best_case).unwrap_or(0.0)
    }

    /// Cumulative worst-case delay of the whole path in nanoseconds.
    pub fn summarized_worst_case(&self) -> f64 {
        self.delays_per_port.last().map(|s| s.worst_case).unwrap_or(0.0)
    }
}

/// Exported results document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsJson {
    pub topology_name: String,
    pub streams: Vec<StreamResultsJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResultsJson {
    pub name: String,
    pub summarized_best_case_delay: f64,
    pub summarized_worst_case_delay: f64,
    pub delays_per_port: Vec<PortDelayJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDelayJson {
    pub node: String,
    pub port: Option<String>,
    pub direction: String,
    pub best_case_delay: f64,
    pub worst_case_delay: f64,
    /// Only present on tx ports, rounded to 4 decimal places.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_utilization: Option<f64>,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stream::Stream;
    use crate::topology::{ForwardingNode, Link, Port};

    fn single_switch() -> (Topology, StreamPath) {
        let mut topology = Topology::new("t", "");
        topology.add_node(ForwardingNode::new("talker"));
        let t1 = topology.add_port(Port::new("talker", "1"));
        topology.add_node(ForwardingNode::new("switch 1"));
        let s1_1 = topology.add_port(Port::new("switch 1", "1"));
        let s1_2 = topology.add_port(Port::new("switch 1", "2"));
        topology.add_node(ForwardingNode::new("listener"));
        let l1 = topology.add_port(Port::new("listener", "1"));
        topology.add_link(t1, s1_2, Link::default());
        topology.add_link(s1_1, l1, Link::default());
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
        let path = StreamPath::shortest(&topology, "talker", "listener").unwrap();
        (topology, path)
    }

    #[test]
    fn test_entries_exclude_endpoints_and_rx_ports() {
        let (topology, path) = single_switch();
        let statistics = StreamStatistics::new("Stream 1", &path, &topology);

        let labels: Vec<(String, Option<String>, Direction)> = statistics
            .delays_per_port
            .iter()
            .map(|s| (s.node.clone(), s.port.clone(), s.direction))
            .collect();
        assert_eq!(
            labels,
            vec![
                ("talker".to_string(), Some("1".to_string()), Direction::Tx),
                ("switch 1".to_string(), None, Direction::Rx),
                ("switch 1".to_string(), Some("1".to_string()), Direction::Tx),
            ]
        );
    }

    #[test]
    fn test_summarized_is_last_entry() {
        let (topology, path) = single_switch();
        let mut statistics = StreamStatistics::new("Stream 1", &path, &topology);
        for (i, entry) in statistics.delays_per_port.iter_mut().enumerate() {
            entry.best_case = (i as f64 + 1.0) * 100.0;
            entry.worst_case = (i as f64 + 1.0) * 200.0;
        }
        assert_eq!(statistics.summarized_best_case(), 300.0);
        assert_eq!(statistics.summarized_worst_case(), 600.0);

        statistics.clear_delays();
        assert_eq!(statistics.summarized_best_case(), 0.0);
        assert_eq!(statistics.summarized_worst_case(), 0.0);
    }
}
