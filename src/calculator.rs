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
//! The analyzer: per-path delay propagation, bandwidth reinflation, and
//! egress-port utilization estimation.
//!
//! For every stream, the propagator walks the shortest path and threads a
//! transmission window together with cumulative best- and worst-case delays
//! through five delay components (processing, propagation, transmission,
//! interference, blocking), dispatching per egress port on the scheduling
//! regime: time-aware shaping synchronized or unsynchronized with the
//! upstream domain, or strict priority / frame preemption. Computed arrival
//! jitter then inflates the effective per-port frame budget, and the
//! propagator is rerun until the interference picture is stable; the final
//! pass feeds the utilization estimate.

use std::collections::HashMap;
use std::path::Path;

use petgraph::graph::NodeIndex;

use crate::path::StreamPath;
use crate::statistics::{Direction, PortDelayJson, ResultsJson, StreamResultsJson, StreamStatistics};
use crate::stream::Stream;
use crate::topology::{GraphNode, Priority, Topology, ALL_PRIORITIES};
use crate::util::transmission_duration;

/// L1 overhead per frame: preamble, SFD, and inter-frame gap.
const L1_OVERHEAD_BYTES: f64 = 20.0;
/// Largest non-preemptible fragment of a preempted frame (without overhead).
const EXPRESS_BLOCKING_BYTES: f64 = 123.0;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("no forwarding path from {sender} to {receiver} for stream {stream}")]
    NoPath {
        stream: String,
        sender: String,
        receiver: String,
    },
}

/// Phase of the transmission window relative to the upstream gate cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
enum WindowPhase {
    /// Both window endpoints are known.
    Defined { start: f64, end: f64 },
    /// No definite phase exists; only an upper bound on the window end is
    /// known. Set when an unsynchronized strict-priority or preemption hop
    /// severs the phase relation, and kept until a gate re-shapes the window.
    Undefined { upper: f64 },
}

impl WindowPhase {
    fn is_defined(self) -> bool {
        matches!(self, WindowPhase::Defined { .. })
    }

    /// Window endpoints as used by the regime formulas. An undefined window
    /// reads as `(-1, upper)`.
    fn bounds(self) -> (f64, f64) {
        match self {
            WindowPhase::Defined { start, end } => (start, end),
            WindowPhase::Undefined { upper } => (-1.0, upper),
        }
    }

    fn shifted(self, d_start: f64, d_end: f64) -> Self {
        match self {
            WindowPhase::Defined { start, end } => WindowPhase::Defined {
                start: start + d_start,
                end: end + d_end,
            },
            WindowPhase::Undefined { upper } => WindowPhase::Undefined {
                upper: upper + d_end,
            },
        }
    }
}

/// Best-case state after one path element.
#[derive(Debug, Clone, Copy)]
struct BestHop {
    window: WindowPhase,
    cumulative_start: f64,
    cumulative_end: f64,
}

/// Worst-case state after one path element. `cycle` carries the effective
/// gate cycle of the previous shaping domain downstream.
#[derive(Debug, Clone, Copy)]
struct WorstHop {
    window: WindowPhase,
    cumulative_start: f64,
    cumulative_end: f64,
    cycle: f64,
}

fn wrap(time: f64, cycle: f64) -> f64 {
    time.rem_euclid(cycle)
}

/// The analyzer for one topology. Owns the per-stream paths, the bandwidth
/// table, and the collected statistics; borrows the topology read-only.
pub struct Calculator<'a> {
    topology: &'a Topology,
    paths: HashMap<String, StreamPath>,
    /// Effective frame budget in bytes per stream and port graph node.
    /// Absent entries default to the stream's declared frame size.
    bandwidth: HashMap<String, HashMap<NodeIndex, u64>>,
    pub statistics: HashMap<String, StreamStatistics>,
}

impl<'a> Calculator<'a> {
    pub fn new(topology: &'a Topology) -> Result<Self, AnalysisError> {
        let mut paths = HashMap::new();
        let mut statistics = HashMap::new();
        for stream in &topology.streams {
            let path = StreamPath::shortest(topology, &stream.sender, &stream.receiver)
                .ok_or_else(|| AnalysisError::NoPath {
                    stream: stream.name.clone(),
                    sender: stream.sender.clone(),
                    receiver: stream.receiver.clone(),
                })?;
            statistics.insert(
                stream.name.clone(),
                StreamStatistics::new(&stream.name, &path, topology),
            );
            paths.insert(stream.name.clone(), path);
        }
        Ok(Self {
            topology,
            paths,
            bandwidth: HashMap::new(),
            statistics,
        })
    }

    /// Run the full analysis: propagate delays, reinflate the bandwidth from
    /// the arrival jitter, propagate again (twice suffices for the supported
    /// topologies), then estimate the egress-port occupancies. Returns the
    /// maximum occupancy over all visited tx ports, if any.
    pub fn analyze(&mut self) -> Option<f64> {
        self.calculate_delays();
        self.recalculate_bandwidth();
        self.calculate_delays();
        self.recalculate_bandwidth();
        self.calculate_delays();
        self.calculate_resource_utilization()
    }

    /// All streams whose path crosses the given port, except the observed one.
    pub fn crossing_streams(&self, observed: &str, port: NodeIndex) -> Vec<&'a Stream> {
        self.topology
            .streams
            .iter()
            .filter(|stream| stream.name != observed && self.paths[&stream.name].contains(port))
            .collect()
    }

    /// All streams that can contend with the observed stream for transmission
    /// on the given port, according to the express-priority rule.
    pub fn interfering_streams(&self, observed: &Stream, port: NodeIndex) -> Vec<&'a Stream> {
        let express = &self
            .topology
            .port(port)
            .expect("interference is evaluated on ports")
            .express_priorities;
        let crossing = self.crossing_streams(&observed.name, port);

        if express.contains(&observed.priority) {
            crossing
                .into_iter()
                .filter(|s| s.priority >= observed.priority && express.contains(&s.priority))
                .collect()
        } else {
            crossing
                .into_iter()
                .filter(|s| express.contains(&s.priority) || s.priority >= observed.priority)
                .collect()
        }
    }

    /// Effective frame budget of the stream at a port graph node, in bytes.
    pub fn bandwidth(&self, stream: &Stream, node: Option<NodeIndex>) -> u64 {
        node.and_then(|index| self.bandwidth.get(&stream.name)?.get(&index).copied())
            .unwrap_or(stream.frame_size)
    }

    /// Record a new frame budget; only ever increases an existing entry.
    pub fn set_bandwidth(&mut self, stream: &Stream, node: NodeIndex, bandwidth: u64) {
        if self.bandwidth(stream, Some(node)) < bandwidth {
            self.bandwidth
                .entry(stream.name.clone())
                .or_default()
                .insert(node, bandwidth);
        }
    }

    /// Transmission duration of the stream's frame including L1 overhead, at
    /// its effective budget on the given port node.
    fn stream_transmission_duration(
        &self,
        stream: &Stream,
        link_speed: f64,
        node: Option<NodeIndex>,
    ) -> f64 {
        transmission_duration(self.bandwidth(stream, node) as f64 + L1_OVERHEAD_BYTES, link_speed)
    }

    /// Propagate best- and worst-case delays for every stream.
    pub fn calculate_delays(&mut self) {
        let topology = self.topology;
        for stream in &topology.streams {
            self.calculate_delays_for_stream(stream);
        }
    }

    /// Walk the path of one stream and fill in its per-port statistics.
    /// Returns the summarized (best, worst) bounds in nanoseconds.
    pub fn calculate_delays_for_stream(&mut self, stream: &Stream) -> (f64, f64) {
        let topology = self.topology;
        let path = self.paths[&stream.name].clone();
        let sender = topology.node_index(&stream.sender);
        let receiver = topology.node_index(&stream.receiver);

        let initial_window = WindowPhase::Defined {
            start: stream.offset,
            end: stream.offset + stream.transmission_window,
        };
        let mut best = vec![BestHop {
            window: initial_window,
            cumulative_start: 0.0,
            cumulative_end: 0.0,
        }];
        let mut worst = vec![WorstHop {
            window: initial_window,
            cumulative_start: 0.0,
            cumulative_end: 0.0,
            cycle: stream.cycle_time,
        }];
        let mut multiplications = Vec::with_capacity(path.len());
        let mut cumulative_bounds: Vec<(NodeIndex, f64, f64)> = Vec::new();

        for (i, &index) in path.nodes().iter().enumerate() {
            if path.is_rx_port(topology, i) {
                multiplications.push(1.0);
                continue;
            }

            let prev_best = *best.last().expect("trace starts non-empty");
            let prev_worst = *worst.last().expect("trace starts non-empty");

            match &topology.graph[index] {
                GraphNode::Forwarding(node) => {
                    let d_proc_bc = node.processing_delay - node.processing_jitter;
                    let d_proc_wc = node.processing_delay + node.processing_jitter;
                    multiplications.push(1.0);
                    best.push(BestHop {
                        window: prev_best.window.shifted(d_proc_bc, d_proc_bc),
                        cumulative_start: prev_best.cumulative_start + d_proc_bc,
                        cumulative_end: prev_best.cumulative_end + d_proc_bc,
                    });
                    worst.push(WorstHop {
                        window: prev_worst.window.shifted(d_proc_wc, d_proc_wc),
                        cumulative_start: prev_worst.cumulative_start + d_proc_wc,
                        cumulative_end: prev_worst.cumulative_end + d_proc_wc,
                        cycle: prev_worst.cycle,
                    });
                }
                GraphNode::Port(port) => {
                    let owner_index = topology.port_owner(index);
                    let owner = topology.forwarding_node(owner_index);
                    let next = *path
                        .nodes()
                        .get(i + 1)
                        .expect("tx port without a succeeding path element");
                    let link = topology
                        .link_between(index, next)
                        .expect("tx port without an egress link");
                    let synchronized = path
                        .ancestor_forwarding_node(topology, i)
                        .map(|ancestor| topology.are_synchronized(owner_index, ancestor))
                        .unwrap_or(true);
                    let is_talker = Some(owner_index) == sender;

                    // transmission delay of the stream's own frame
                    let d_prop = link.propagation_delay;
                    let d_trans = self.stream_transmission_duration(stream, link.link_speed, Some(index));
                    let d_trans_bc = d_trans - link.transmission_jitter + d_prop;
                    let d_trans_wc = d_trans + link.transmission_jitter + d_prop;

                    // interference delay: same-or-higher priority wins, then
                    // preemption and gate eligibility narrow the set further
                    let mut interfering = self.interfering_streams(stream, index);
                    interfering.retain(|s| s.priority >= stream.priority);
                    if port.frame_preemption && !port.express_priorities.is_empty() {
                        interfering.retain(|s| port.express_priorities.contains(&s.priority));
                    }
                    if port.gcl && !port.gcl_priorities.is_empty() {
                        interfering.retain(|s| port.gcl_priorities.contains(&s.priority));
                    }
                    let mut d_interference: f64 = if is_talker {
                        0.0
                    } else {
                        interfering
                            .iter()
                            .map(|s| {
                                self.stream_transmission_duration(s, link.link_speed, Some(index))
                                    + link.transmission_jitter
                            })
                            .sum()
                    };
                    // multiple upstream cycles may fold into one downstream window
                    d_interference *= (prev_worst.cycle / stream.cycle_time).ceil();

                    // blocking delay by a non-preemptible frame in transit
                    let express: &[Priority] = if port.frame_preemption {
                        &port.express_priorities
                    } else {
                        &[]
                    };
                    let gcl_priorities: &[Priority] = if port.gcl {
                        &port.gcl_priorities
                    } else {
                        &ALL_PRIORITIES
                    };
                    let mut blocking_bytes = if express.contains(&stream.priority) {
                        EXPRESS_BLOCKING_BYTES + L1_OVERHEAD_BYTES
                    } else {
                        link.max_frame_size + L1_OVERHEAD_BYTES
                    };
                    if !gcl_priorities.iter().any(|&p| p < stream.priority) {
                        blocking_bytes = 0.0;
                    }
                    let d_blck = if is_talker {
                        0.0
                    } else {
                        transmission_duration(blocking_bytes, link.link_speed)
                    };

                    // dwell time, including the cost of crossing into a
                    // slower upstream cycle
                    let d_dwell =
                        d_trans_wc + d_blck + (prev_worst.cycle - port.gcl_cycle).max(0.0);

                    multiplications.push(if port.gcl {
                        port.gcl_cycle / prev_worst.cycle.max(1.0)
                    } else {
                        1.0
                    });

                    let interfering_count = (interfering.len() as f64).max(1.0);

                    if port.gcl {
                        if synchronized && prev_best.window.is_defined() {
                            // gate synchronized with the upstream domain
                            let gc = port.gcl_cycle;
                            let go = port.gcl_offset;
                            let gw = port.gcl_open;
                            let sync_jitter = owner.sync_jitter;

                            // best case: how far ahead of the gate open do the
                            // window endpoints arrive, and does a transmission
                            // still fit before the gate closes?
                            let (bs, be) = prev_best.window.bounds();
                            let early_1 = go - wrap(bs, gc);
                            let early_2 = go - be;
                            let remaining_2 = (go + gw) - wrap(be, gc);
                            let (d_gate_1, d_gate_2, correction_2) = if early_1 >= 0.0 {
                                if early_2 >= 0.0 {
                                    (early_1, early_2, 0.0)
                                } else if remaining_2 >= d_trans_bc {
                                    (early_1, 0.0, 0.0)
                                } else {
                                    (early_1, 0.0, -remaining_2)
                                }
                            } else {
                                // already inside the open window, or the gate
                                // is missed entirely; no best-case gate wait
                                (0.0, 0.0, 0.0)
                            };
                            let d_forward_1 = d_gate_1 + d_trans_bc - sync_jitter;
                            let d_forward_2 = d_gate_2 + d_trans_bc - sync_jitter;
                            best.push(BestHop {
                                window: WindowPhase::Defined {
                                    start: bs + d_forward_1,
                                    end: be + d_forward_2 + correction_2,
                                },
                                cumulative_start: prev_best.cumulative_start + d_forward_1,
                                cumulative_end: prev_best.cumulative_end + d_forward_2,
                            });

                            // worst case: does the backlog still fit before the
                            // gate closes, or does the frame roll into the next
                            // cycle?
                            let (ws, we) = prev_worst.window.bounds();
                            let late_1 = (go + gw) - wrap(ws, gc);
                            let late_2 = (go + gw) - wrap(we, gc);
                            let early_1 = go - wrap(ws, gc);
                            let early_2 = go - wrap(we, gc);
                            let cycle_shift = (gc - prev_worst.cycle).max(0.0);
                            let backlog = d_trans + d_blck + d_interference;
                            let (d_gate_1, d_gate_2) = if late_1 < backlog && late_2 < backlog {
                                (
                                    gc - wrap(ws, gc) + gw,
                                    gc - wrap(we, gc) + gw,
                                )
                            } else if late_2 < backlog {
                                (
                                    0.0,
                                    (gc - gw)
                                        + d_trans
                                        + d_interference / interfering_count
                                        + cycle_shift,
                                )
                            } else if early_2 >= 0.0 {
                                (early_1, early_2)
                            } else if early_1 >= 0.0 {
                                (early_1, 0.0)
                            } else {
                                (0.0, 0.0)
                            };
                            let d_forward_1 = d_gate_1
                                + d_trans
                                + d_blck
                                + d_interference
                                + sync_jitter
                                + cycle_shift;
                            let d_forward_2 = d_gate_2
                                + d_trans
                                + d_blck
                                + d_interference
                                + sync_jitter
                                + cycle_shift;
                            worst.push(WorstHop {
                                window: WindowPhase::Defined {
                                    start: ws + d_forward_1,
                                    end: we + d_forward_2,
                                },
                                cumulative_start: prev_worst.cumulative_start + d_forward_1,
                                cumulative_end: prev_worst.cumulative_end + d_forward_2,
                                cycle: gc,
                            });
                        } else {
                            // gate with arbitrary phase towards the upstream:
                            // the frame can land anywhere within one cycle
                            let gate_open = port.gcl_offset;
                            let gate_close = port.gcl_offset + port.gcl_open;
                            let (bs, be) = prev_best.window.bounds();
                            let exceeding = (be - bs) - port.gcl_open;
                            let shaped = WindowPhase::Defined {
                                start: gate_open,
                                end: gate_close,
                            };
                            if exceeding > 0.0 {
                                // the upstream window does not fit into one
                                // gate opening; the tail spills into the bound
                                best.push(BestHop {
                                    window: shaped,
                                    cumulative_start: prev_best.cumulative_start + d_trans_bc,
                                    cumulative_end: prev_best.cumulative_end + d_trans_bc + exceeding,
                                });
                            } else {
                                best.push(BestHop {
                                    window: shaped,
                                    cumulative_start: prev_best.cumulative_start + d_trans_bc,
                                    cumulative_end: prev_best.cumulative_end + d_trans_bc,
                                });
                            }

                            let d_gate = (port.gcl_cycle - port.gcl_open)
                                + d_trans
                                + d_interference / interfering_count;
                            let d_forward = d_gate + d_dwell;
                            worst.push(WorstHop {
                                window: shaped,
                                cumulative_start: prev_worst.cumulative_start + d_forward,
                                cumulative_end: prev_worst.cumulative_end + d_forward,
                                cycle: port.gcl_cycle,
                            });
                        }
                    } else if synchronized && prev_best.window.is_defined() {
                        // strict priority or preemption within one domain
                        best.push(BestHop {
                            window: prev_best.window.shifted(d_trans_bc, d_trans_bc),
                            cumulative_start: prev_best.cumulative_start + d_trans_bc,
                            cumulative_end: prev_best.cumulative_end + d_trans_bc,
                        });
                        let d_forward = d_dwell + d_interference;
                        worst.push(WorstHop {
                            window: prev_worst.window.shifted(d_forward, d_forward),
                            cumulative_start: prev_worst.cumulative_start + d_forward,
                            cumulative_end: prev_worst.cumulative_end + d_forward,
                            cycle: prev_worst.cycle,
                        });
                    } else {
                        // unsynchronized strict priority or preemption: the
                        // hop imposes no phase on the window, only an upper
                        // bound survives
                        let upper = prev_worst.cycle - 3.0 * d_trans_wc;
                        best.push(BestHop {
                            window: WindowPhase::Undefined { upper },
                            cumulative_start: prev_best.cumulative_start + d_trans_bc,
                            cumulative_end: prev_best.cumulative_end + d_trans_bc,
                        });
                        let d_forward = d_dwell + d_interference;
                        worst.push(WorstHop {
                            window: WindowPhase::Undefined { upper },
                            cumulative_start: prev_worst.cumulative_start + d_forward,
                            cumulative_end: prev_worst.cumulative_end + d_forward,
                            cycle: prev_worst.cycle,
                        });
                    }
                }
            }

            // a window whose end moved before its beginning collapses to size 0
            let last_best = best.last_mut().expect("trace is non-empty");
            if let WindowPhase::Defined { start, end } = last_best.window {
                if end < start {
                    last_best.window = WindowPhase::Defined { start, end: start };
                }
            }

            // the endpoints themselves contribute no delay
            let element_owner = match &topology.graph[index] {
                GraphNode::Forwarding(_) => index,
                GraphNode::Port(_) => topology.port_owner(index),
            };
            if Some(element_owner) == sender || Some(element_owner) == receiver {
                let n = best.len();
                best[n - 1].cumulative_start = best[n - 2].cumulative_start;
                best[n - 1].cumulative_end = best[n - 2].cumulative_end;
                let n = worst.len();
                worst[n - 1].cumulative_start = worst[n - 2].cumulative_start;
                worst[n - 1].cumulative_end = worst[n - 2].cumulative_end;
            }

            let last_best = *best.last().expect("trace is non-empty");
            let last_worst = *worst.last().expect("trace is non-empty");
            cumulative_bounds.push((
                index,
                last_best.cumulative_start.min(last_best.cumulative_end),
                last_worst.cumulative_start.max(last_worst.cumulative_end),
            ));
        }

        let statistics = self
            .statistics
            .get_mut(&stream.name)
            .expect("statistics exist for every stream");
        statistics.clear_delays();
        for (index, best_case, worst_case) in cumulative_bounds {
            if let Some(entry) = statistics.get_mut(index) {
                entry.best_case = best_case;
                entry.worst_case = worst_case;
            }
        }
        statistics.multiplications = multiplications;

        let final_best = best[best.len() - 2];
        let final_worst = worst[worst.len() - 2];
        let summarized_best = final_best.cumulative_start.min(final_best.cumulative_end);
        let summarized_worst = final_worst.cumulative_start.max(final_worst.cumulative_end);
        log::debug!(
            "stream {}: best {summarized_best} ns, worst {summarized_worst} ns",
            stream.name
        );
        (summarized_best, summarized_worst)
    }

    /// Recompute the effective frame budgets of every stream from the arrival
    /// windows of the last propagation pass.
    pub fn recalculate_bandwidth(&mut self) {
        let topology = self.topology;
        for stream in &topology.streams {
            self.recalculate_bandwidth_for_stream(stream);
        }
    }

    fn recalculate_bandwidth_for_stream(&mut self, stream: &Stream) {
        log::debug!("recalculating bandwidth for stream {}", stream.name);
        let topology = self.topology;
        let path = self.paths[&stream.name].clone();

        for (i, &index) in path.nodes().iter().enumerate() {
            if i == 0 || i == path.len() - 1 {
                continue;
            }
            if topology.graph[index].is_forwarding() || path.is_rx_port(topology, i) {
                continue;
            }

            let ancestor_port = path.ancestor_tx_port(topology, i);
            if ancestor_port.is_none() && i != 1 {
                continue;
            }

            // arrival window at this node's egress
            let Some(entry) = self.statistics[&stream.name].get(index) else {
                continue;
            };
            let d_arriv = entry.worst_case - entry.best_case;

            // gate cycles of the upstream and this shaping domain; at the
            // first hop the stream's own cycle takes the upstream role
            let cycle_b = topology.port(index).expect("tx ports are ports").gcl_cycle;
            let cycle_a = ancestor_port
                .map(|a| topology.port(a).expect("ancestor is a port").gcl_cycle)
                .unwrap_or(stream.cycle_time);

            let factor_arrival = (d_arriv / cycle_b).ceil();
            let factor_cycle = (cycle_b / cycle_a).ceil();
            let new_bandwidth =
                (self.bandwidth(stream, ancestor_port) as f64 * factor_arrival * factor_cycle)
                    as u64;
            self.set_bandwidth(stream, index, new_bandwidth);
        }
        log::debug!(
            "new bandwidth for stream {}: {:?}",
            stream.name,
            self.bandwidth.get(&stream.name)
        );
    }

    /// Estimate the occupancy of every tx port on every stream's path.
    /// Returns the maximum occupancy encountered, if any tx port was visited.
    pub fn calculate_resource_utilization(&mut self) -> Option<f64> {
        let topology = self.topology;
        let mut maximum: Option<f64> = None;
        for stream in &topology.streams {
            for occupancy in self.resource_utilization_for_stream(stream) {
                maximum = Some(maximum.map_or(occupancy, |m| m.max(occupancy)));
            }
        }
        maximum
    }

    fn resource_utilization_for_stream(&mut self, stream: &Stream) -> Vec<f64> {
        log::debug!("calculating resource utilization for stream {}", stream.name);
        let topology = self.topology;
        let path = self.paths[&stream.name].clone();
        let multiplications = self.statistics[&stream.name].multiplications.clone();

        let mut factor: f64 = 1.0;
        let mut occupancies = Vec::new();
        let mut updates = Vec::new();
        for (i, &index) in path.nodes().iter().enumerate() {
            if !path.is_tx_port(topology, i) {
                continue;
            }
            let port = topology.port(index).expect("tx ports are ports");
            let link = topology
                .link_between(index, path.nodes()[i + 1])
                .expect("tx port without an egress link");

            let interference: f64 = self
                .interfering_streams(stream, index)
                .iter()
                .map(|s| {
                    self.stream_transmission_duration(s, link.link_speed, Some(index))
                        + link.transmission_jitter
                })
                .sum();

            factor *= multiplications.get(i).copied().unwrap_or(1.0).max(1.0);

            let window = if port.gcl {
                port.gcl_open
            } else {
                stream.cycle_time
            };
            let occupancy = (interference
                + self.stream_transmission_duration(stream, link.link_speed, Some(index)) * factor)
                / window;
            occupancies.push(occupancy);
            updates.push((index, occupancy));
        }

        let statistics = self
            .statistics
            .get_mut(&stream.name)
            .expect("statistics exist for every stream");
        statistics.clear_resource_utilization();
        for (index, occupancy) in updates {
            if let Some(entry) = statistics.get_mut(index) {
                entry.resource_utilization = occupancy;
            }
        }
        occupancies
    }

    /// The exported results document.
    pub fn results(&self) -> ResultsJson {
        let round4 = |x: f64| (x * 10_000.0).round() / 10_000.0;
        ResultsJson {
            topology_name: self.topology.name.clone(),
            streams: self
                .topology
                .streams
                .iter()
                .map(|stream| {
                    let statistics = &self.statistics[&stream.name];
                    StreamResultsJson {
                        name: stream.name.clone(),
                        summarized_best_case_delay: statistics.summarized_best_case(),
                        summarized_worst_case_delay: statistics.summarized_worst_case(),
                        delays_per_port: statistics
                            .delays_per_port
                            .iter()
                            .map(|entry| PortDelayJson {
                                node: entry.node.clone(),
                                port: entry.port.clone(),
                                direction: entry.direction.as_str().to_string(),
                                best_case_delay: entry.best_case,
                                worst_case_delay: entry.worst_case,
                                resource_utilization: (entry.direction == Direction::Tx)
                                    .then(|| round4(entry.resource_utilization)),
                            })
                            .collect(),
                    }
                })
                .collect(),
        }
    }

    /// Write the results document to a file. Logs and returns `false` on
    /// failure instead of aborting, so a finished analysis is still reported.
    pub fn export_json(&self, path: impl AsRef<Path>) -> bool {
        let rendered = match serde_json::to_string_pretty(&self.results()) {
            Ok(rendered) => rendered,
            Err(e) => {
                log::error!("error serializing results: {e}");
                return false;
            }
        };
        if let Err(e) = std::fs::write(path.as_ref(), rendered) {
            log::error!("error writing result to file: {e}");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::topology::{ForwardingNode, Link, Port};

    fn stream(name: &str, sender: &str, receiver: &str, priority: Priority) -> Stream {
        Stream {
            name: name.to_string(),
            cycle_time: 1_000_000.0,
            offset: 0.0,
            transmission_window: 0.0,
            frame_size: 500,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            priority,
        }
    }

    /// talker -- switch 1 -- switch 2 -- listener on 1 Gbit/s links, one
    /// stream end to end. `configure` can rewrite the switch tx ports.
    fn two_switch_topology(priority: Priority, configure: impl Fn(&mut Port)) -> Topology {
        let mut topology = Topology::new("two switches", "");
        topology.add_node(ForwardingNode::new("talker"));
        let t1 = topology.add_port(Port::new("talker", "1"));
        topology.add_node(ForwardingNode::new("switch 1"));
        let mut port = Port::new("switch 1", "1");
        configure(&mut port);
        let s1_1 = topology.add_port(port);
        let s1_2 = topology.add_port(Port::new("switch 1", "2"));
        topology.add_node(ForwardingNode::new("switch 2"));
        let mut port = Port::new("switch 2", "1");
        configure(&mut port);
        let s2_1 = topology.add_port(port);
        let s2_2 = topology.add_port(Port::new("switch 2", "2"));
        topology.add_node(ForwardingNode::new("listener"));
        let l1 = topology.add_port(Port::new("listener", "1"));

        topology.add_link(t1, s1_2, Link::default());
        topology.add_link(s1_1, s2_2, Link::default());
        topology.add_link(s2_1, l1, Link::default());
        topology.add_stream(stream("Stream 1", "talker", "listener", priority));
        topology
    }

    /// talker -- switch 1 -- listener with a gate on the switch tx port.
    fn gated_switch_topology(
        talker_domain: Option<&str>,
        switch_domain: Option<&str>,
        gate: impl Fn(&mut Port),
        stream_offset: f64,
    ) -> Topology {
        let mut topology = Topology::new("gated switch", "");
        topology.add_node(ForwardingNode {
            sync_domain: talker_domain.map(String::from),
            ..ForwardingNode::new("talker")
        });
        let t1 = topology.add_port(Port::new("talker", "1"));
        topology.add_node(ForwardingNode {
            sync_domain: switch_domain.map(String::from),
            ..ForwardingNode::new("switch 1")
        });
        let mut port = Port {
            gcl: true,
            gcl_cycle: 100_000.0,
            gcl_open: 55_000.0,
            gcl_offset: 10_000.0,
            gcl_priorities: vec![7],
            ..Port::new("switch 1", "1")
        };
        gate(&mut port);
        let s1_1 = topology.add_port(port);
        let s1_2 = topology.add_port(Port::new("switch 1", "2"));
        topology.add_node(ForwardingNode::new("listener"));
        let l1 = topology.add_port(Port::new("listener", "1"));

        topology.add_link(t1, s1_2, Link::default());
        topology.add_link(s1_1, l1, Link::default());
        topology.add_stream(Stream {
            cycle_time: 100_000.0,
            offset: stream_offset,
            ..stream("Stream 1", "talker", "listener", 7)
        });
        topology
    }

    fn assert_best_leq_worst(calculator: &Calculator) {
        for statistics in calculator.statistics.values() {
            for entry in &statistics.delays_per_port {
                assert!(
                    entry.best_case <= entry.worst_case,
                    "{}-{:?}: best {} > worst {}",
                    entry.node,
                    entry.port,
                    entry.best_case,
                    entry.worst_case
                );
            }
        }
    }

    #[test]
    fn test_strict_priority_chain() {
        let topology = two_switch_topology(6, |_| {});
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();

        let statistics = &calculator.statistics["Stream 1"];
        // per switch: processing 1050 +/- 50, transmission of 520 bytes at
        // 1 Gbit/s = 4160 ns, blocking by a 1542-byte frame = 12336 ns
        assert_eq!(statistics.summarized_best_case(), 10_320.0);
        assert_eq!(statistics.summarized_worst_case(), 35_192.0);

        let per_port: Vec<(f64, f64)> = statistics
            .delays_per_port
            .iter()
            .map(|e| (e.best_case, e.worst_case))
            .collect();
        assert_eq!(
            per_port,
            vec![
                (0.0, 0.0),           // talker port contributes nothing
                (1_000.0, 1_100.0),   // switch 1 processing
                (5_160.0, 17_596.0),  // switch 1 egress
                (6_160.0, 18_696.0),  // switch 2 processing
                (10_320.0, 35_192.0), // switch 2 egress
            ]
        );
        assert_best_leq_worst(&calculator);
    }

    #[test]
    fn test_express_preemption_blocking() {
        let topology = two_switch_topology(7, |port| {
            port.frame_preemption = true;
            port.express_priorities = vec![7];
        });
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();

        let statistics = &calculator.statistics["Stream 1"];
        // blocking shrinks to the 143-byte fragment: 1144 ns per switch
        assert_eq!(statistics.summarized_best_case(), 10_320.0);
        assert_eq!(statistics.summarized_worst_case(), 12_808.0);
        assert_best_leq_worst(&calculator);
    }

    #[test]
    fn test_synchronized_gate_in_window() {
        let topology = gated_switch_topology(Some("1"), Some("1"), |_| {}, 20_000.0);
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();

        let statistics = &calculator.statistics["Stream 1"];
        // the window arrives inside the open gate: no gate wait at all, only
        // transmission and the sync jitter of the switch
        assert_eq!(statistics.summarized_best_case(), 5_130.0);
        assert_eq!(statistics.summarized_worst_case(), 5_290.0);
        assert_best_leq_worst(&calculator);
    }

    #[test]
    fn test_synchronized_gate_missed() {
        let topology = gated_switch_topology(Some("1"), Some("1"), |_| {}, 60_000.0);
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();

        let statistics = &calculator.statistics["Stream 1"];
        // the worst case reaches the egress port at 66360 ns, after the gate
        // has closed, and waits for the next opening:
        // 100000 - 66360 + 55000 = 88640 ns of gate delay
        assert_eq!(statistics.summarized_best_case(), 5_130.0);
        assert_eq!(statistics.summarized_worst_case(), 93_930.0);
        assert_best_leq_worst(&calculator);
    }

    #[test]
    fn test_unsynchronized_gate() {
        let topology = gated_switch_topology(
            None,
            Some("1"),
            |port| {
                port.gcl_open = 30_000.0;
            },
            0.0,
        );
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();

        let statistics = &calculator.statistics["Stream 1"];
        // best case only pays the transmission; worst case waits out the
        // closed share of an entire cycle: (100000 - 30000) + 4160 + 4160
        assert_eq!(statistics.summarized_best_case(), 5_160.0);
        assert_eq!(statistics.summarized_worst_case(), 79_420.0);
        assert_best_leq_worst(&calculator);
    }

    /// talker (no sync domain) -- switch 1 -- switch 2 -- listener, with an
    /// unsynchronized gate on switch 1 and a fast narrow gate on switch 2.
    fn reinflation_topology() -> Topology {
        let mut topology = Topology::new("reinflation", "");
        topology.add_node(ForwardingNode::new("talker"));
        let t1 = topology.add_port(Port::new("talker", "1"));
        topology.add_node(ForwardingNode {
            sync_domain: Some("1".to_string()),
            ..ForwardingNode::new("switch 1")
        });
        let s1_1 = topology.add_port(Port {
            gcl: true,
            gcl_cycle: 1_000_000.0,
            gcl_open: 10_000.0,
            gcl_offset: 0.0,
            gcl_priorities: vec![7],
            ..Port::new("switch 1", "1")
        });
        let s1_2 = topology.add_port(Port::new("switch 1", "2"));
        topology.add_node(ForwardingNode {
            sync_domain: Some("1".to_string()),
            ..ForwardingNode::new("switch 2")
        });
        let s2_1 = topology.add_port(Port {
            gcl: true,
            gcl_cycle: 10_000.0,
            gcl_open: 5_000.0,
            gcl_offset: 0.0,
            gcl_priorities: vec![7],
            ..Port::new("switch 2", "1")
        });
        let s2_2 = topology.add_port(Port::new("switch 2", "2"));
        topology.add_node(ForwardingNode::new("listener"));
        let l1 = topology.add_port(Port::new("listener", "1"));

        topology.add_link(t1, s1_2, Link::default());
        topology.add_link(s1_1, s2_2, Link::default());
        topology.add_link(s2_1, l1, Link::default());
        topology.add_stream(Stream {
            cycle_time: 100_000.0,
            ..stream("Stream 1", "talker", "listener", 7)
        });
        topology
    }

    #[test]
    fn test_bandwidth_reinflation_raises_utilization() {
        let topology = reinflation_topology();
        let stream = topology.streams[0].clone();
        let s2_1 = topology.port_index("switch 2", "1").unwrap();

        // without reinflation, the budget everywhere is the declared size
        let mut single_pass = Calculator::new(&topology).unwrap();
        single_pass.calculate_delays();
        let utilization_single = single_pass.calculate_resource_utilization().unwrap();
        assert_eq!(single_pass.bandwidth(&stream, Some(s2_1)), 500);

        // the arrival window at switch 2 spans ~101 of its 10 us gate
        // cycles, so the effective budget multiplies accordingly
        let mut calculator = Calculator::new(&topology).unwrap();
        let utilization = calculator.analyze().unwrap();
        assert_eq!(calculator.bandwidth(&stream, Some(s2_1)), 50_500);
        assert!(utilization > utilization_single);
        assert_eq!(utilization, 808.32);
        assert_best_leq_worst(&calculator);
    }

    #[test]
    fn test_bandwidth_table_is_monotone() {
        let topology = two_switch_topology(6, |_| {});
        let stream = topology.streams[0].clone();
        let index = topology.port_index("switch 1", "1").unwrap();
        let mut calculator = Calculator::new(&topology).unwrap();

        assert_eq!(calculator.bandwidth(&stream, Some(index)), 500);
        calculator.set_bandwidth(&stream, index, 400);
        assert_eq!(calculator.bandwidth(&stream, Some(index)), 500);
        calculator.set_bandwidth(&stream, index, 1_000);
        assert_eq!(calculator.bandwidth(&stream, Some(index)), 1_000);
        calculator.set_bandwidth(&stream, index, 600);
        assert_eq!(calculator.bandwidth(&stream, Some(index)), 1_000);
    }

    /// Three stations talk to one listener through a single switch, so all
    /// streams cross the switch's single egress port.
    fn star_topology(express: Vec<Priority>) -> Topology {
        let mut topology = Topology::new("star", "");
        topology.add_node(ForwardingNode::new("switch"));
        let uplink = topology.add_port(Port {
            express_priorities: express,
            ..Port::new("switch", "1")
        });
        topology.add_node(ForwardingNode::new("listener"));
        let l1 = topology.add_port(Port::new("listener", "1"));
        topology.add_link(uplink, l1, Link::default());

        for (i, (name, priority)) in [("a", 5), ("b", 6), ("c", 4)].iter().enumerate() {
            topology.add_node(ForwardingNode::new(*name));
            let station = topology.add_port(Port::new(*name, "1"));
            let ingress = topology.add_port(Port::new("switch", (i + 2).to_string()));
            topology.add_link(station, ingress, Link::default());
            topology.add_stream(stream(name, name, "listener", *priority));
        }
        topology
    }

    fn interfering_names(calculator: &Calculator, topology: &Topology, observed: &str) -> Vec<String> {
        let port = topology.port_index("switch", "1").unwrap();
        let observed = topology.streams.iter().find(|s| s.name == observed).unwrap();
        calculator
            .interfering_streams(observed, port)
            .iter()
            .map(|s| s.name.clone())
            .collect()
    }

    #[test]
    fn test_interference_priority_rule() {
        // no express priorities: plain same-or-higher priority
        let topology = star_topology(vec![]);
        let calculator = Calculator::new(&topology).unwrap();
        assert_eq!(interfering_names(&calculator, &topology, "a"), vec!["b"]);
        assert_eq!(
            interfering_names(&calculator, &topology, "c"),
            vec!["a", "b"]
        );
        assert!(interfering_names(&calculator, &topology, "b").is_empty());
    }

    #[test]
    fn test_interference_express_rule() {
        let topology = star_topology(vec![4, 6]);
        let calculator = Calculator::new(&topology).unwrap();
        // a (5, not express) is interfered by express streams and higher ones
        assert_eq!(
            interfering_names(&calculator, &topology, "a"),
            vec!["b", "c"]
        );
        // b (6, express) only by same-or-higher express streams
        assert!(interfering_names(&calculator, &topology, "b").is_empty());
        // c (4, express) by higher express streams only
        assert_eq!(interfering_names(&calculator, &topology, "c"), vec!["b"]);
    }

    #[test]
    fn test_no_path_is_an_error() {
        let mut topology = two_switch_topology(6, |_| {});
        topology.add_node(ForwardingNode::new("island"));
        topology.add_stream(stream("Stream 2", "talker", "island", 6));
        assert!(matches!(
            Calculator::new(&topology),
            Err(AnalysisError::NoPath { stream, .. }) if stream == "Stream 2"
        ));
    }

    #[test]
    fn test_results_document() {
        let topology = two_switch_topology(6, |_| {});
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();

        let results = calculator.results();
        assert_eq!(results.topology_name, "two switches");
        assert_eq!(results.streams.len(), 1);
        let stream = &results.streams[0];
        assert_eq!(stream.summarized_best_case_delay, 10_320.0);
        assert_eq!(stream.summarized_worst_case_delay, 35_192.0);
        // utilization appears on tx ports only, rounded to 4 decimals
        for port in &stream.delays_per_port {
            match port.direction.as_str() {
                "tx" => {
                    let utilization = port.resource_utilization.unwrap();
                    assert_eq!(utilization, (utilization * 10_000.0).round() / 10_000.0);
                }
                _ => assert!(port.resource_utilization.is_none()),
            }
        }

        // the document survives a serde round trip
        let raw = serde_json::to_string_pretty(&results).unwrap();
        let reparsed: ResultsJson = serde_json::from_str(&raw).unwrap();
        assert_eq!(reparsed, results);
    }
}
