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
//! Tabular stdout reports for the analysis results.

use clap::ValueEnum;
use itertools::Itertools;

use crate::calculator::Calculator;
use crate::statistics::Direction;
use crate::topology::Topology;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum Scenario {
    /// Cumulative best- and worst-case delay bounds per port.
    ArrivalWindow,
    /// Occupancy of every egress port.
    Congestion,
    /// Ports ordered by their worst-case contribution.
    InefficientTrans,
}

pub fn print_results(scenario: Scenario, topology: &Topology, calculator: &Calculator) {
    match scenario {
        Scenario::ArrivalWindow => arrival_window(topology, calculator),
        Scenario::Congestion => congestion(topology, calculator),
        Scenario::InefficientTrans => inefficient_transitions(topology, calculator),
    }
}

fn arrival_window(topology: &Topology, calculator: &Calculator) {
    println!();
    println!();
    println!("Arrival Window Calculation: (Topology {})", topology.name);
    for stream in &topology.streams {
        let statistics = &calculator.statistics[&stream.name];
        println!();
        println!("Stream: {}", stream.name);
        println!("----------------------------------------");
        println!("| {:<10} |  best-case | worst-case |", "port");
        println!("| {:<10} |       [ns] |       [ns] |", "");
        for entry in &statistics.delays_per_port {
            println!("----------------------------------------");
            println!(
                "| {:<10} | {:>10} | {:>10} |",
                format!("{}-{}", entry.node, entry.direction.as_str()),
                entry.best_case as i64,
                entry.worst_case as i64,
            );
        }
        println!("----------------------------------------");
    }
    println!();
    println!();
}

fn congestion(topology: &Topology, calculator: &Calculator) {
    println!();
    println!();
    println!("Congestion Identification: (Topology {})", topology.name);
    for stream in &topology.streams {
        let statistics = &calculator.statistics[&stream.name];
        println!();
        println!("Stream: {}", stream.name);
        println!("-----------------------------------");
        println!("|   {:<10} | {:>13} |", "port", "occupancy [%]");
        for entry in &statistics.delays_per_port {
            if entry.direction != Direction::Tx || entry.port.is_none() {
                // only tx ports are valid
                continue;
            }
            println!("-----------------------------------");
            println!(
                "|   {:<10} | {:>13} |",
                format!("{}-{}", entry.node, entry.direction.as_str()),
                (entry.resource_utilization * 100.0).round() as i64,
            );
        }
        println!("-----------------------------------");
    }
    println!();
    println!();
}

fn inefficient_transitions(topology: &Topology, calculator: &Calculator) {
    println!();
    println!();
    println!("Inefficient Transitions: (Topology {})", topology.name);
    for stream in &topology.streams {
        let statistics = &calculator.statistics[&stream.name];
        println!();
        println!("Stream: {}", stream.name);
        println!("-----------------------------------");
        println!("|   {:<10} | {:>12} |", "transition", "delay [ns]");
        for entry in statistics
            .delays_per_port
            .iter()
            .sorted_by(|a, b| b.worst_case.total_cmp(&a.worst_case))
        {
            println!("-----------------------------------");
            println!(
                "|   {:<10} | {:>12} |",
                format!("{}-{}", entry.node, entry.direction.as_str()),
                entry.worst_case as i64,
            );
        }
        println!("-----------------------------------");
    }
    println!();
    println!();
}
