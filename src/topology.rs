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
//! The static network topology: forwarding nodes, ports, and links.
//!
//! Forwarding nodes and their ports are both graph vertices. A node and each
//! of its ports are connected by an edge tagged as internal; links between
//! ports of different nodes carry the physical link attributes. Shortest
//! paths consequently alternate `node, port, port, node, port, port, ...`.

use std::{collections::HashMap, fs, path::Path};

use petgraph::graph::{NodeIndex, UnGraph};
use serde::{Deserialize, Serialize};

use crate::stream::{Stream, StreamJson};

/// PCP priority as carried in the VLAN tag (0..=7).
pub type Priority = u8;

/// All eight PCP priorities, the default set controlled by a gate.
pub const ALL_PRIORITIES: [Priority; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

// Defaults applied while parsing, in nanoseconds or Mbit/s.
pub const DEFAULT_PROCESSING_DELAY: u64 = 1050;
pub const DEFAULT_PROCESSING_JITTER: u64 = 50;
pub const DEFAULT_SYNC_JITTER: u64 = 30;
pub const DEFAULT_GCL_CYCLE: u64 = 1_000_000;
pub const DEFAULT_GCL_OPEN: u64 = 10_000;
pub const DEFAULT_GCL_OFFSET: u64 = 1_000;
pub const DEFAULT_LINK_SPEED: u64 = 1000;
pub const DEFAULT_MAX_FRAME_SIZE: u64 = 1522;

/// Any failure while reading, parsing, or validating a topology.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("error opening topology file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error parsing topology JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("node {node}, given as {role} of stream {stream}, does not exist")]
    UnknownStreamEndpoint {
        stream: String,
        role: &'static str,
        node: String,
    },
    #[error("invalid priority {priority} given in stream {stream}")]
    InvalidStreamPriority { stream: String, priority: i64 },
    #[error("invalid priority {priority} on port {port} of node {node}")]
    InvalidPortPriority {
        node: String,
        port: String,
        priority: i64,
    },
    #[error("port {port} of node {node}, referenced by an edge, does not exist")]
    UnknownEdgeEndpoint { node: String, port: String },
    #[error("gate cycle must be positive on port {port} of node {node}")]
    InvalidGateCycle { node: String, port: String },
}

/// A switch or end station that forwards frames between its ports.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardingNode {
    pub name: String,
    /// Processing delay in nanoseconds.
    pub processing_delay: f64,
    /// Symmetric processing jitter in nanoseconds.
    pub processing_jitter: f64,
    /// Time-synchronization domain. Two nodes are synchronized iff both
    /// declare the same domain; a node without a domain never matches.
    pub sync_domain: Option<String>,
    /// Time-synchronization jitter in nanoseconds.
    pub sync_jitter: f64,
}

impl ForwardingNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processing_delay: DEFAULT_PROCESSING_DELAY as f64,
            processing_jitter: DEFAULT_PROCESSING_JITTER as f64,
            sync_domain: None,
            sync_jitter: DEFAULT_SYNC_JITTER as f64,
        }
    }
}

/// An egress/ingress port owned by exactly one forwarding node.
///
/// The gate (GCL) attributes are stored regardless of the `gcl` flag; the
/// defaults apply where a port declares no schedule of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct Port {
    /// Name of the owning forwarding node.
    pub node: String,
    pub name: String,
    /// Whether a gate schedule is active on this port.
    pub gcl: bool,
    /// Gate cycle time in nanoseconds.
    pub gcl_cycle: f64,
    /// Duration for which the gate is open, in nanoseconds.
    pub gcl_open: f64,
    /// Point of time during a cycle when the gate opens, in nanoseconds.
    pub gcl_offset: f64,
    /// Priorities controlled by the gate.
    pub gcl_priorities: Vec<Priority>,
    /// Express priorities that can preempt other frames.
    pub express_priorities: Vec<Priority>,
    /// Whether frame preemption is enabled on this port.
    pub frame_preemption: bool,
}

impl Port {
    pub fn new(node: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            name: name.into(),
            gcl: false,
            gcl_cycle: DEFAULT_GCL_CYCLE as f64,
            gcl_open: DEFAULT_GCL_OPEN as f64,
            gcl_offset: DEFAULT_GCL_OFFSET as f64,
            gcl_priorities: ALL_PRIORITIES.to_vec(),
            express_priorities: Vec::new(),
            frame_preemption: false,
        }
    }
}

/// A vertex of the topology graph.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphNode {
    Forwarding(ForwardingNode),
    Port(Port),
}

impl GraphNode {
    pub fn is_forwarding(&self) -> bool {
        matches!(self, GraphNode::Forwarding(_))
    }

    pub fn is_port(&self) -> bool {
        matches!(self, GraphNode::Port(_))
    }
}

/// A link between two ports, or the internal connection of a port to its node.
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Internal node-to-port edges carry no delay.
    pub internal: bool,
    /// Link speed in Mbit/s.
    pub link_speed: f64,
    /// Maximum transmittable frame size in bytes.
    pub max_frame_size: f64,
    /// Propagation delay in nanoseconds.
    pub propagation_delay: f64,
    /// Transmission jitter in nanoseconds.
    pub transmission_jitter: f64,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            internal: false,
            link_speed: DEFAULT_LINK_SPEED as f64,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE as f64,
            propagation_delay: 0.0,
            transmission_jitter: 0.0,
        }
    }
}

impl Link {
    fn internal() -> Self {
        Self {
            internal: true,
            ..Default::default()
        }
    }
}

/// The analyzed network: a graph of forwarding nodes and ports, plus the
/// streams declared on it. The topology exclusively owns all nodes, ports,
/// and links; the analyzer borrows it read-only.
#[derive(Debug, Clone)]
pub struct Topology {
    pub name: String,
    pub description: String,
    pub graph: UnGraph<GraphNode, Link>,
    pub streams: Vec<Stream>,
    node_indices: HashMap<String, NodeIndex>,
    port_indices: HashMap<(String, String), NodeIndex>,
}

impl Topology {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            graph: UnGraph::new_undirected(),
            streams: Vec::new(),
            node_indices: HashMap::new(),
            port_indices: HashMap::new(),
        }
    }

    /// Add a forwarding node to the topology.
    pub fn add_node(&mut self, node: ForwardingNode) -> NodeIndex {
        let name = node.name.clone();
        let index = self.graph.add_node(GraphNode::Forwarding(node));
        self.node_indices.insert(name, index);
        index
    }

    /// Add a port and connect it to its owning forwarding node.
    ///
    /// The owning node must have been added before; violating this is a
    /// programming error.
    pub fn add_port(&mut self, port: Port) -> NodeIndex {
        let owner = *self
            .node_indices
            .get(&port.node)
            .unwrap_or_else(|| panic!("owner node {} of port {} missing", port.node, port.name));
        let key = (port.node.clone(), port.name.clone());
        let index = self.graph.add_node(GraphNode::Port(port));
        self.port_indices.insert(key, index);
        self.graph.add_edge(owner, index, Link::internal());
        index
    }

    /// Add a physical link between two ports.
    pub fn add_link(&mut self, port_a: NodeIndex, port_b: NodeIndex, link: Link) {
        self.graph.add_edge(port_a, port_b, link);
    }

    pub fn add_stream(&mut self, stream: Stream) {
        self.streams.push(stream);
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.node_indices.get(name).copied()
    }

    pub fn port_index(&self, node: &str, port: &str) -> Option<NodeIndex> {
        self.port_indices
            .get(&(node.to_string(), port.to_string()))
            .copied()
    }

    /// The forwarding node stored at `index`. Panics on a port vertex.
    pub fn forwarding_node(&self, index: NodeIndex) -> &ForwardingNode {
        match &self.graph[index] {
            GraphNode::Forwarding(node) => node,
            GraphNode::Port(port) => {
                panic!("expected forwarding node, got port {}-{}", port.node, port.name)
            }
        }
    }

    pub fn port(&self, index: NodeIndex) -> Option<&Port> {
        match &self.graph[index] {
            GraphNode::Port(port) => Some(port),
            GraphNode::Forwarding(_) => None,
        }
    }

    /// The forwarding node owning the port at `index`.
    pub fn port_owner(&self, index: NodeIndex) -> NodeIndex {
        let port = self.port(index).expect("port_owner called on a forwarding node");
        *self
            .node_indices
            .get(&port.node)
            .expect("port owner must exist in the topology")
    }

    /// The link stored between two adjacent graph vertices.
    pub fn link_between(&self, a: NodeIndex, b: NodeIndex) -> Option<&Link> {
        self.graph
            .find_edge(a, b)
            .and_then(|edge| self.graph.edge_weight(edge))
    }

    /// Whether the two forwarding nodes share a common time reference, i.e.,
    /// both declare the same non-empty sync domain.
    pub fn are_synchronized(&self, a: NodeIndex, b: NodeIndex) -> bool {
        match (&self.graph[a], &self.graph[b]) {
            (GraphNode::Forwarding(a), GraphNode::Forwarding(b)) => match (&a.sync_domain, &b.sync_domain)
            {
                (Some(da), Some(db)) => da == db,
                _ => false,
            },
            _ => false,
        }
    }

    /// Read and parse a topology from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TopologyError> {
        let raw = fs::read_to_string(path)?;
        let json: TopologyJson = serde_json::from_str(&raw)?;
        Self::from_json(&json)
    }

    /// Build a validated topology from its JSON representation.
    pub fn from_json(json: &TopologyJson) -> Result<Self, TopologyError> {
        let mut topology = Topology::new(&json.name, json.description.clone().unwrap_or_default());

        for node in &json.nodes {
            topology.add_node(ForwardingNode::from_json(node));
            for port in &node.ports {
                topology.add_port(Port::from_json(port, &node.name)?);
            }
        }

        for edge in &json.edges {
            let (node_a, port_a) = &edge.port1;
            let (node_b, port_b) = &edge.port2;
            let a = topology.port_index(node_a, port_a).ok_or_else(|| {
                TopologyError::UnknownEdgeEndpoint {
                    node: node_a.clone(),
                    port: port_a.clone(),
                }
            })?;
            let b = topology.port_index(node_b, port_b).ok_or_else(|| {
                TopologyError::UnknownEdgeEndpoint {
                    node: node_b.clone(),
                    port: port_b.clone(),
                }
            })?;
            topology.add_link(
                a,
                b,
                Link {
                    internal: false,
                    link_speed: edge.link_speed as f64,
                    max_frame_size: edge.max_frame_size as f64,
                    propagation_delay: edge.propagation_delay as f64,
                    transmission_jitter: edge.transmission_jitter as f64,
                },
            );
        }

        let node_names: Vec<&str> = json.nodes.iter().map(|n| n.name.as_str()).collect();
        for stream in &json.streams {
            topology.add_stream(Stream::from_json(stream, &node_names)?);
        }

        Ok(topology)
    }

    /// Serialize the topology back into its JSON representation. All optional
    /// fields are emitted with their resolved values, so serializing, parsing,
    /// and serializing again yields an identical document.
    pub fn to_json(&self) -> TopologyJson {
        let mut nodes = Vec::new();
        for index in self.graph.node_indices() {
            let GraphNode::Forwarding(node) = &self.graph[index] else {
                continue;
            };
            let ports = self
                .graph
                .node_indices()
                .filter_map(|i| self.port(i))
                .filter(|p| p.node == node.name)
                .map(|p| PortJson {
                    name: p.name.clone(),
                    express_priorities: p.express_priorities.iter().map(|&p| p as i64).collect(),
                    frame_preemption: p.frame_preemption,
                    gcl: p.gcl,
                    gcl_cycle: p.gcl_cycle as u64,
                    gcl_open: p.gcl_open as u64,
                    gcl_offset: p.gcl_offset as u64,
                    gcl_priorities: p.gcl_priorities.iter().map(|&p| p as i64).collect(),
                })
                .collect();
            nodes.push(NodeJson {
                name: node.name.clone(),
                processing_delay: node.processing_delay as u64,
                processing_jitter: node.processing_jitter as u64,
                sync_domain: node.sync_domain.clone(),
                sync_jitter: node.sync_jitter as u64,
                ports,
            });
        }

        let mut edges = Vec::new();
        for edge in self.graph.edge_indices() {
            let link = &self.graph[edge];
            if link.internal {
                continue;
            }
            let (a, b) = self.graph.edge_endpoints(edge).expect("edge must have endpoints");
            let (Some(port_a), Some(port_b)) = (self.port(a), self.port(b)) else {
                continue;
            };
            edges.push(EdgeJson {
                port1: (port_a.node.clone(), port_a.name.clone()),
                port2: (port_b.node.clone(), port_b.name.clone()),
                link_speed: link.link_speed as u64,
                max_frame_size: link.max_frame_size as u64,
                propagation_delay: link.propagation_delay as u64,
                transmission_jitter: link.transmission_jitter as u64,
            });
        }

        TopologyJson {
            name: self.name.clone(),
            description: (!self.description.is_empty()).then(|| self.description.clone()),
            nodes,
            edges,
            streams: self.streams.iter().map(Stream::to_json).collect(),
        }
    }
}

impl ForwardingNode {
    fn from_json(json: &NodeJson) -> Self {
        // an empty sync domain means no domain at all
        let sync_domain = json.sync_domain.clone().filter(|d| !d.is_empty());
        Self {
            name: json.name.clone(),
            processing_delay: json.processing_delay as f64,
            processing_jitter: json.processing_jitter as f64,
            sync_domain,
            sync_jitter: json.sync_jitter as f64,
        }
    }
}

impl Port {
    fn from_json(json: &PortJson, node_name: &str) -> Result<Self, TopologyError> {
        let priorities = |raw: &[i64]| -> Result<Vec<Priority>, TopologyError> {
            raw.iter()
                .map(|&p| {
                    (0..=7).contains(&p).then_some(p as Priority).ok_or(
                        TopologyError::InvalidPortPriority {
                            node: node_name.to_string(),
                            port: json.name.clone(),
                            priority: p,
                        },
                    )
                })
                .collect()
        };

        if json.gcl_cycle == 0 {
            return Err(TopologyError::InvalidGateCycle {
                node: node_name.to_string(),
                port: json.name.clone(),
            });
        }

        Ok(Port {
            node: node_name.to_string(),
            name: json.name.clone(),
            gcl: json.gcl,
            gcl_cycle: json.gcl_cycle as f64,
            gcl_open: json.gcl_open as f64,
            gcl_offset: json.gcl_offset as f64,
            gcl_priorities: priorities(&json.gcl_priorities)?,
            express_priorities: priorities(&json.express_priorities)?,
            frame_preemption: json.frame_preemption,
        })
    }
}

/// JSON representation of a topology file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopologyJson {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub nodes: Vec<NodeJson>,
    pub edges: Vec<EdgeJson>,
    pub streams: Vec<StreamJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeJson {
    pub name: String,
    #[serde(default = "default_processing_delay")]
    pub processing_delay: u64,
    #[serde(default = "default_processing_jitter")]
    pub processing_jitter: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_domain: Option<String>,
    #[serde(default = "default_sync_jitter")]
    pub sync_jitter: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<PortJson>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortJson {
    pub name: String,
    #[serde(default)]
    pub express_priorities: Vec<i64>,
    #[serde(default)]
    pub frame_preemption: bool,
    #[serde(default)]
    pub gcl: bool,
    #[serde(default = "default_gcl_cycle")]
    pub gcl_cycle: u64,
    #[serde(default = "default_gcl_open")]
    pub gcl_open: u64,
    #[serde(default = "default_gcl_offset")]
    pub gcl_offset: u64,
    #[serde(default = "default_gcl_priorities")]
    pub gcl_priorities: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeJson {
    /// `[node, port]` pair identifying the first endpoint.
    pub port1: (String, String),
    /// `[node, port]` pair identifying the second endpoint.
    pub port2: (String, String),
    #[serde(default = "default_link_speed")]
    pub link_speed: u64,
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: u64,
    #[serde(default)]
    pub propagation_delay: u64,
    #[serde(default)]
    pub transmission_jitter: u64,
}

fn default_processing_delay() -> u64 {
    DEFAULT_PROCESSING_DELAY
}
fn default_processing_jitter() -> u64 {
    DEFAULT_PROCESSING_JITTER
}
fn default_sync_jitter() -> u64 {
    DEFAULT_SYNC_JITTER
}
fn default_gcl_cycle() -> u64 {
    DEFAULT_GCL_CYCLE
}
fn default_gcl_open() -> u64 {
    DEFAULT_GCL_OPEN
}
fn default_gcl_offset() -> u64 {
    DEFAULT_GCL_OFFSET
}
fn default_gcl_priorities() -> Vec<i64> {
    ALL_PRIORITIES.iter().map(|&p| p as i64).collect()
}
fn default_link_speed() -> u64 {
    DEFAULT_LINK_SPEED
}
fn default_max_frame_size() -> u64 {
    DEFAULT_MAX_FRAME_SIZE
}
