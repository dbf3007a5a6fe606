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
//! Analyze a topology file and print one of the tabular reports.

use std::path::PathBuf;

use clap::Parser;

use latas::{
    calculator::Calculator,
    report::{self, Scenario},
    topology::Topology,
    util,
};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Report to print after the analysis
    #[arg(value_enum)]
    scenario: Scenario,
    /// Path to the topology JSON file
    topology: PathBuf,
    /// Optional path for the results JSON
    output: Option<PathBuf>,
}

fn main() {
    util::init_logging();
    let args = Args::parse();
    if let Err(e) = run(&args) {
        eprintln!("{e}");
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let topology = Topology::from_file(&args.topology)?;
    let mut calculator = Calculator::new(&topology)?;
    calculator.analyze();

    if let Some(output) = &args.output {
        if calculator.export_json(output) {
            println!("Successfully wrote calculation result to {}", output.display());
        }
    }

    report::print_results(args.scenario, &topology, &calculator);
    Ok(())
}
