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
//! Compare the model's predictions against a measured dataset.

use std::path::PathBuf;

use clap::Parser;

use latas::{calculator::Calculator, scenarios, statistics::Direction, util};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
struct Args {
    /// Path to the binary dataset with measured delay bounds
    dataset: PathBuf,
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
    let cases = scenarios::load_dataset(&args.dataset)?;

    let line = "-".repeat(99);
    println!("{line}");
    println!(
        "| {:>7} | {:>13} | {:>13} | {:>13} | {:>13} | {:>21} |",
        "Setting", "Pred. BC [us]", "Meas. BC [us]", "Meas. WC [us]", "Pred. WC [us]", "Pred. Utilization [%]"
    );
    println!("{line}");

    let mut errors = Vec::new();
    for case in &cases {
        let topology = scenarios::build_scenario_topology(&case.setting, &case.code);
        let mut calculator = Calculator::new(&topology)?;
        calculator.analyze();

        let statistics = &calculator.statistics["Stream 1"];
        let predicted_best = statistics.summarized_best_case() / 1_000.0;
        let predicted_worst = statistics.summarized_worst_case() / 1_000.0;
        let utilization = statistics
            .delays_per_port
            .iter()
            .filter(|p| p.direction == Direction::Tx && p.port.is_some())
            .map(|p| (p.resource_utilization * 100.0).round())
            .fold(0.0, f64::max);

        // a prediction is wrong if the measurement escapes the predicted
        // bounds while the model does not flag an overloaded port
        if (predicted_best > case.measured_best || predicted_worst < case.measured_worst)
            && utilization < 100.0
        {
            errors.push((case, predicted_best, predicted_worst, utilization));
        }

        println!(
            "| {:>7} | {:>13.2} | {:>13.2} | {:>13.2} | {:>13.2} | {:>21.2} |",
            case.setting,
            predicted_best,
            case.measured_best,
            case.measured_worst,
            predicted_worst,
            utilization,
        );
    }
    println!("{line}");
    println!();

    if errors.is_empty() {
        println!("Success! All measurements are within the predictions!");
    } else {
        println!(
            "Not all predictions align with the measurements. Found {} error(s):",
            errors.len()
        );
        for (case, best, worst, utilization) in errors {
            println!(
                "  {} ({}): predicted [{best:.2}, {worst:.2}] us, measured [{:.2}, {:.2}] us, utilization {utilization:.0} %",
                case.setting, case.code, case.measured_best, case.measured_worst,
            );
        }
    }
    Ok(())
}
