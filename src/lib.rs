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
//! Library for computing best- and worst-case per-hop latency bounds,
//! end-to-end jitter, and egress-port utilization for time-sensitive streams
//! on switched networks whose ports employ strict priority scheduling, frame
//! preemption, or gate-controlled time-aware shaping.

pub mod calculator;
pub mod path;
pub mod report;
pub mod scenarios;
pub mod statistics;
pub mod stream;
pub mod topology;
pub mod util;

pub mod prelude {
    pub use super::{
        calculator::{AnalysisError, Calculator},
        path::StreamPath,
        statistics::{Direction, StreamStatistics},
        stream::Stream,
        topology::{Topology, TopologyError},
    };
}
