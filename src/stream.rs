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
//! Periodic time-sensitive streams and their JSON model.

use serde::{Deserialize, Serialize};

use crate::topology::{Priority, TopologyError};

/// A periodic stream between two forwarding nodes.
///
/// All times are in nanoseconds. The frame size is in bytes and covers the
/// user payload plus the Ethernet header, excluding the 20 bytes of L1
/// overhead surrounding every frame on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub name: String,
    /// Cycle time of the stream in nanoseconds.
    pub cycle_time: f64,
    /// Offset of the transmission within a cycle in nanoseconds.
    pub offset: f64,
    /// Size of the sender's allowed emission window in nanoseconds.
    pub transmission_window: f64,
    /// Frame size in bytes (without L1 overhead).
    pub frame_size: u64,
    /// Name of the sending forwarding node.
    pub sender: String,
    /// Name of the receiving forwarding node.
    pub receiver: String,
    /// PCP priority of the stream (0..=7).
    pub priority: Priority,
}

/// JSON representation of a [`Stream`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamJson {
    pub name: String,
    pub cycle_time: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub transmission_window: u64,
    pub frame_size: u64,
    pub sender: String,
    pub receiver: String,
    #[serde(default)]
    pub priority: i64,
}

impl Stream {
    /// Convert the JSON representation into a stream, validating the priority
    /// range and that both endpoints name existing forwarding nodes.
    pub fn from_json(json: &StreamJson, existing_nodes: &[&str]) -> Result<Stream, TopologyError> {
        if !existing_nodes.contains(&json.sender.as_str()) {
            return Err(TopologyError::UnknownStreamEndpoint {
                stream: json.name.clone(),
                role: "sender",
                node: json.sender.clone(),
            });
        }
        if !existing_nodes.contains(&json.receiver.as_str()) {
            return Err(TopologyError::UnknownStreamEndpoint {
                stream: json.name.clone(),
                role: "receiver",
                node: json.receiver.clone(),
            });
        }
        if !(0..=7).contains(&json.priority) {
            return Err(TopologyError::InvalidStreamPriority {
                stream: json.name.clone(),
                priority: json.priority,
            });
        }

        Ok(Stream {
            name: json.name.clone(),
            cycle_time: json.cycle_time as f64,
            offset: json.offset as f64,
            transmission_window: json.transmission_window as f64,
            frame_size: json.frame_size,
            sender: json.sender.clone(),
            receiver: json.receiver.clone(),
            priority: json.priority as Priority,
        })
    }

    pub fn to_json(&self) -> StreamJson {
        StreamJson {
            name: self.name.clone(),
            cycle_time: self.cycle_time as u64,
            offset: self.offset as u64,
            transmission_window: self.transmission_window as u64,
            frame_size: self.frame_size,
            sender: self.sender.clone(),
            receiver: self.receiver.clone(),
            priority: self.priority as i64,
        }
    }
}
