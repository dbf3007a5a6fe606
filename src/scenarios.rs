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
//! Measured evaluation cases and the benchmark topology they ran on.
//!
//! Each dataset case carries a configuration code that selects the port
//! setups of a fixed talker -> switch 1 -> switch 2 -> switch 3 -> listener
//! chain with three cross-traffic stations. [`build_scenario_topology`]
//! rebuilds the exact topology for a code so the model's predictions can be
//! compared against the hardware measurements.

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::stream::Stream;
use crate::topology::{ForwardingNode, Link, Port, Priority, Topology};

/// Base cycle of the benchmark chain: 100 µs.
const CYCLE: f64 = 100_000.0;

/// One measured case of the evaluation dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioCase {
    /// Short label of the measured setting, shown in the report table.
    pub setting: String,
    /// Configuration code selecting the port setups of the chain.
    pub code: String,
    /// Measured best-case latency in microseconds.
    pub measured_best: f64,
    /// Measured worst-case latency in microseconds.
    pub measured_worst: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("error opening dataset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("error decoding dataset file: {0}")]
    Decode(#[from] bincode::Error),
}

pub fn load_dataset(path: impl AsRef<Path>) -> Result<Vec<ScenarioCase>, DatasetError> {
    let raw = fs::read(path)?;
    Ok(bincode::deserialize(&raw)?)
}

pub fn save_dataset(path: impl AsRef<Path>, cases: &[ScenarioCase]) -> Result<(), DatasetError> {
    fs::write(path, bincode::serialize(cases)?)?;
    Ok(())
}

/// A port without a gate whose schedule attributes nevertheless span the
/// full benchmark cycle.
fn open_port(node: &str, name: &str) -> Port {
    Port {
        gcl_offset: 0.0,
        gcl_open: CYCLE,
        gcl_cycle: CYCLE,
        ..Port::new(node, name)
    }
}

fn gated_port(
    node: &str,
    name: &str,
    offset: f64,
    open: f64,
    cycle: f64,
    priorities: Vec<Priority>,
) -> Port {
    Port {
        gcl: true,
        gcl_offset: offset,
        gcl_open: open,
        gcl_cycle: cycle,
        gcl_priorities: priorities,
        ..Port::new(node, name)
    }
}

fn express_port(node: &str, name: &str) -> Port {
    Port {
        express_priorities: vec![7],
        frame_preemption: true,
        ..open_port(node, name)
    }
}

fn strict_port(node: &str, name: &str) -> Port {
    Port {
        gcl_priorities: vec![7, 6, 5, 4, 3, 2, 1, 0],
        ..open_port(node, name)
    }
}

/// Rebuild the benchmark chain for one configuration code.
pub fn build_scenario_topology(setting: &str, code: &str) -> Topology {
    let has = |tag: &str| code.contains(tag);

    let transmission_window = if has("w0") { 1_000.0 } else { 21_000.0 };
    let sync_talker = Some(if has("1-sTrue-") { "1" } else { "0" }.to_string());
    let sync_listener = Some(if has("2-sTrue-") { "1" } else { "2" }.to_string());

    let mut topology = Topology::new(setting, "");

    topology.add_node(ForwardingNode {
        sync_domain: sync_talker.clone(),
        processing_delay: 2_000.0,
        ..ForwardingNode::new("talker")
    });
    let t_1 = topology.add_port(open_port("talker", "1"));

    topology.add_node(ForwardingNode {
        sync_domain: sync_listener.clone(),
        ..ForwardingNode::new("listener")
    });
    let l_1 = topology.add_port(open_port("listener", "1"));

    topology.add_node(ForwardingNode {
        sync_domain: sync_talker,
        processing_delay: 1_000.0,
        processing_jitter: 80.0,
        ..ForwardingNode::new("switch 1")
    });
    let s1_1 = if has("c201") {
        topology.add_port(gated_port("switch 1", "1", 10_000.0, 55_000.0, CYCLE, vec![7]))
    } else if has("c211") {
        topology.add_port(gated_port("switch 1", "1", 30_000.0, 55_000.0, CYCLE, vec![7]))
    } else if has("c221") {
        topology.add_port(gated_port("switch 1", "1", 15_000.0, 20_000.0, CYCLE / 2.0, vec![7]))
    } else if has("c301") || has("c701") {
        topology.add_port(express_port("switch 1", "1"))
    } else {
        topology.add_port(strict_port("switch 1", "1"))
    };
    let s1_2 = topology.add_port(open_port("switch 1", "2"));
    let s1_3 = topology.add_port(open_port("switch 1", "3"));

    topology.add_node(ForwardingNode {
        sync_domain: Some("1".to_string()),
        processing_delay: 1_000.0,
        processing_jitter: 80.0,
        ..ForwardingNode::new("switch 2")
    });
    let s2_1 = if has("c202") {
        topology.add_port(gated_port("switch 2", "1", 5_000.0, 25_000.0, CYCLE, vec![7]))
    } else if has("c212") {
        topology.add_port(gated_port("switch 2", "1", 25_000.0, 55_000.0, CYCLE, vec![7]))
    } else if has("c222") {
        topology.add_port(gated_port("switch 2", "1", 25_000.0, 80_000.0, CYCLE * 2.0, vec![7]))
    } else if has("c232") {
        topology.add_port(gated_port("switch 2", "1", 25_000.0, 80_000.0, CYCLE * 3.0, vec![7]))
    } else if has("c242") {
        topology.add_port(gated_port("switch 2", "1", 5_000.0, 80_000.0, CYCLE, vec![7]))
    } else if has("c302") || has("c701") {
        topology.add_port(express_port("switch 2", "1"))
    } else {
        topology.add_port(strict_port("switch 2", "1"))
    };
    let s2_2 = topology.add_port(open_port("switch 2", "2"));
    let s2_3 = topology.add_port(open_port("switch 2", "3"));

    topology.add_node(ForwardingNode {
        sync_domain: sync_listener,
        processing_delay: 1_000.0,
        processing_jitter: 80.0,
        ..ForwardingNode::new("switch 3")
    });
    let s3_1 = if has("c203") {
        topology.add_port(gated_port("switch 3", "1", 80_000.0, 15_000.0, CYCLE, vec![7, 6, 5]))
    } else if has("c213") {
        topology.add_port(gated_port("switch 3", "1", 10_000.0, 45_000.0, CYCLE, vec![7, 6, 5]))
    } else if has("c223") {
        topology.add_port(gated_port("switch 3", "1", 10_000.0, 30_000.0, 75_000.0, vec![7, 6, 5]))
    } else if has("c233") {
        topology.add_port(gated_port("switch 3", "1", 10_000.0, 10_000.0, CYCLE * 2.0, vec![7]))
    } else if has("c243") {
        topology.add_port(gated_port("switch 3", "1", 80_000.0, 10_000.0, CYCLE, vec![7]))
    } else if has("c303") || has("c701") {
        topology.add_port(express_port("switch 3", "1"))
    } else {
        topology.add_port(strict_port("switch 3", "1"))
    };
    let s3_2 = topology.add_port(open_port("switch 3", "2"));
    let s3_3 = topology.add_port(open_port("switch 3", "3"));

    // cross-traffic stations
    for name in ["stream 2", "stream 3", "stream 4"] {
        topology.add_node(ForwardingNode::new(name));
        topology.add_port(open_port(name, "1"));
    }
    let str_2 = topology.port_index("stream 2", "1").unwrap();
    let str_3 = topology.port_index("stream 3", "1").unwrap();
    let str_4 = topology.port_index("stream 4", "1").unwrap();

    let downgraded = Link {
        link_speed: 100.0,
        max_frame_size: 300.0,
        ..Link::default()
    };
    topology.add_link(t_1, s1_2, Link::default());
    topology.add_link(
        s1_1,
        s2_2,
        if has("c501") || has("c701") {
            downgraded.clone()
        } else {
            Link::default()
        },
    );
    topology.add_link(
        s2_1,
        s3_2,
        if has("c502") || has("c702") {
            downgraded.clone()
        } else {
            Link::default()
        },
    );
    topology.add_link(
        s3_1,
        l_1,
        if has("c503") || has("c703") {
            downgraded
        } else {
            Link::default()
        },
    );
    topology.add_link(str_2, s1_3, Link::default());
    topology.add_link(str_3, s2_3, Link::default());
    topology.add_link(str_4, s3_3, Link::default());

    // cross traffic shrinks on a downgraded link
    let size_1 = if has("c501") || has("c701") { 500 } else { 1_000 };
    let size_2 = if has("c502") || has("c702") { 500 } else { 1_000 };
    let size_3 = if has("c503") || has("c703") { 500 } else { 1_000 };

    let cross = |name: &str, size: u64, sender: &str, receiver: &str| Stream {
        name: name.to_string(),
        cycle_time: CYCLE,
        offset: 0.0,
        transmission_window: 1.0,
        frame_size: size,
        sender: sender.to_string(),
        receiver: receiver.to_string(),
        priority: 7,
    };
    topology.add_stream(Stream {
        name: "Stream 1".to_string(),
        cycle_time: CYCLE,
        offset: 10_000.0,
        transmission_window,
        frame_size: 200,
        sender: "talker".to_string(),
        receiver: "listener".to_string(),
        priority: 7,
    });
    topology.add_stream(cross("Stream 2", size_1, "stream 2", "stream 3"));
    topology.add_stream(cross("Stream 3", size_2, "stream 3", "stream 4"));
    topology.add_stream(cross("Stream 4", size_3, "stream 4", "listener"));

    topology
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::calculator::Calculator;

    #[test]
    fn test_gated_configuration() {
        let topology = build_scenario_topology("c201", "c201-1-sTrue-w0");
        let port = topology
            .port(topology.port_index("switch 1", "1").unwrap())
            .unwrap();
        assert!(port.gcl);
        assert_eq!(port.gcl_offset, 10_000.0);
        assert_eq!(port.gcl_open, 55_000.0);
        assert_eq!(port.gcl_cycle, 100_000.0);
        assert_eq!(port.gcl_priorities, vec![7]);

        // talker and switch 1 are pulled into the common domain "1"
        let talker = topology.node_index("talker").unwrap();
        let switch_1 = topology.node_index("switch 1").unwrap();
        let switch_2 = topology.node_index("switch 2").unwrap();
        assert!(topology.are_synchronized(talker, switch_1));
        assert!(topology.are_synchronized(switch_1, switch_2));

        // w0 selects the narrow transmission window
        assert_eq!(topology.streams[0].transmission_window, 1_000.0);
    }

    #[test]
    fn test_unsynchronized_domains() {
        let topology = build_scenario_topology("c201", "c201-1-sFalse-w20");
        let talker = topology.node_index("talker").unwrap();
        let switch_1 = topology.node_index("switch 1").unwrap();
        let switch_2 = topology.node_index("switch 2").unwrap();
        // domain "0" is shared by talker and switch 1, but not by switch 2
        assert!(topology.are_synchronized(talker, switch_1));
        assert!(!topology.are_synchronized(switch_1, switch_2));
        assert_eq!(topology.streams[0].transmission_window, 21_000.0);
    }

    #[test]
    fn test_downgraded_link() {
        let topology = build_scenario_topology("c501", "c501-1-sTrue-w0");
        let link = topology
            .link_between(
                topology.port_index("switch 1", "1").unwrap(),
                topology.port_index("switch 2", "2").unwrap(),
            )
            .unwrap();
        assert_eq!(link.link_speed, 100.0);
        assert_eq!(link.max_frame_size, 300.0);
        // the cross stream on the slow link shrinks
        assert_eq!(topology.streams[1].frame_size, 500);
        assert_eq!(topology.streams[2].frame_size, 1_000);
    }

    #[test]
    fn test_preemption_everywhere() {
        let topology = build_scenario_topology("c701", "c701-1-sTrue-w0");
        for switch in ["switch 1", "switch 2", "switch 3"] {
            let port = topology.port(topology.port_index(switch, "1").unwrap()).unwrap();
            assert!(port.frame_preemption);
            assert_eq!(port.express_priorities, vec![7]);
        }
    }

    #[test]
    fn test_benchmark_chain_analyzes() {
        let topology = build_scenario_topology("c201", "c201-1-sTrue-w0");
        let mut calculator = Calculator::new(&topology).unwrap();
        calculator.analyze();
        let statistics = &calculator.statistics["Stream 1"];
        assert!(statistics.summarized_best_case() > 0.0);
        assert!(statistics.summarized_worst_case() >= statistics.summarized_best_case());
    }

    #[test]
    fn test_dataset_round_trip() {
        let cases = vec![
            ScenarioCase {
                setting: "c201".to_string(),
                code: "c201-1-sTrue-w0".to_string(),
                measured_best: 12.3,
                measured_worst: 81.7,
            },
            ScenarioCase {
                setting: "c101".to_string(),
                code: "c101-1-sFalse-w20".to_string(),
                measured_best: 9.0,
                measured_worst: 45.5,
            },
        ];
        let path = std::env::temp_dir().join("latas-dataset-test.bin");
        save_dataset(&path, &cases).unwrap();
        assert_eq!(load_dataset(&path).unwrap(), cases);
        let _ = std::fs::remove_file(&path);
    }
}
