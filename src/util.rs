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
//! Utility module collection of functions

/// Initialize the logger for the binaries. Safe to call more than once.
pub fn init_logging() {
    let _ = pretty_env_logger::try_init();
}

/// Transmission duration of `framesize` bytes on a link with `link_speed` Mbit/s.
///
/// The frame size must already include the L1 overhead (preamble, SFD, IFG).
/// Returns the duration in nanoseconds.
pub fn transmission_duration(framesize: f64, link_speed: f64) -> f64 {
    framesize / (link_speed / 8.0 * 1_000_000.0) * 1_000_000_000.0
}
